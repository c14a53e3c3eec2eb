//! Stack command table
//!
//! Each [`CommandSpec`] pairs a command name with the function that performs
//! the per-service work and an optional hook that runs once before any task
//! is built. The table is fixed and ordered; names are unique.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::execution::context::{HookContext, TaskContext, PLAN_EXTENSION};
use crate::types::{StackrunError, StackrunResult};

/// Performs the actual work for one service
pub type RunFn =
    Arc<dyn for<'a> Fn(&'a TaskContext) -> BoxFuture<'a, StackrunResult<()>> + Send + Sync>;

/// Runs once per invocation, before any task exists
pub type BeforeHookFn =
    Arc<dyn for<'a> Fn(&'a HookContext) -> BoxFuture<'a, StackrunResult<()>> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub before_hook: Option<BeforeHookFn>,
    pub run: RunFn,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("before_hook", &self.before_hook.is_some())
            .finish()
    }
}

/// The supported stack commands, in display order
pub fn command_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "preview",
            description: "Preview the changes an update would make, saving a plan per service",
            before_hook: Some(Arc::new(clear_staging_dir)),
            run: Arc::new(preview),
        },
        CommandSpec {
            name: "deploy",
            description: "Update each stack to match its program",
            before_hook: None,
            run: Arc::new(deploy),
        },
        CommandSpec {
            name: "refresh",
            description: "Refresh each stack's state from the real resources",
            before_hook: None,
            run: Arc::new(refresh),
        },
        CommandSpec {
            name: "cancel",
            description: "Cancel any in-progress update on each stack",
            before_hook: None,
            run: Arc::new(cancel),
        },
        CommandSpec {
            name: "destroy",
            description: "Destroy every resource in each stack",
            before_hook: None,
            run: Arc::new(destroy),
        },
    ]
}

/// Look a command up by name
pub fn find_spec(name: &str) -> StackrunResult<CommandSpec> {
    command_specs()
        .into_iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| {
            let known = command_specs()
                .iter()
                .map(|spec| spec.name)
                .collect::<Vec<_>>()
                .join(", ");
            StackrunError::Config(format!(
                "Unknown command '{}' (expected one of: {})",
                name, known
            ))
        })
}

/// Fail if two specs share a name
pub fn validate_specs(specs: &[CommandSpec]) -> StackrunResult<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name) {
            return Err(StackrunError::Config(format!(
                "Command '{}' is defined more than once",
                spec.name
            )));
        }
    }
    Ok(())
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Remove saved plans from the staging dir, creating it if needed.
///
/// Only `*.json` files directly inside the directory are deleted; the
/// directory itself and anything else in it are left alone.
fn clear_staging_dir(ctx: &HookContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move {
        debug!(command = %ctx.command, dir = %ctx.staging_dir.display(), "clearing staging directory");
        let hook_error = |e: std::io::Error| StackrunError::Hook {
            command: ctx.command.clone(),
            message: format!("{}: {}", ctx.staging_dir.display(), e),
        };

        tokio::fs::create_dir_all(&ctx.staging_dir)
            .await
            .map_err(hook_error)?;

        let mut entries = tokio::fs::read_dir(&ctx.staging_dir)
            .await
            .map_err(hook_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(hook_error)? {
            let path = entry.path();
            let is_plan = path.extension().is_some_and(|ext| ext == PLAN_EXTENSION);
            if is_plan && entry.file_type().await.map_err(hook_error)?.is_file() {
                tokio::fs::remove_file(&path).await.map_err(hook_error)?;
            }
        }
        Ok(())
    })
}

fn preview(ctx: &TaskContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move {
        let plan_path = ctx.plan_path().display().to_string();
        let mut preview_args = args(&["preview", "--save-plan"]);
        preview_args.push(plan_path);
        ctx.tool.invoke(ctx, &preview_args).await
    })
}

fn deploy(ctx: &TaskContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move {
        ctx.tool
            .invoke(ctx, &args(&["up", "--yes", "--skip-preview"]))
            .await
    })
}

fn refresh(ctx: &TaskContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move { ctx.tool.invoke(ctx, &args(&["refresh", "--yes"])).await })
}

fn cancel(ctx: &TaskContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move { ctx.tool.invoke(ctx, &args(&["cancel", "--yes"])).await })
}

fn destroy(ctx: &TaskContext) -> BoxFuture<'_, StackrunResult<()>> {
    Box::pin(async move { ctx.tool.invoke(ctx, &args(&["destroy", "--yes"])).await })
}
