//! External stack tool invocation
//!
//! [`StackTool`] is the boundary between the task machinery and the
//! infrastructure-as-code tool that actually acts on a stack. The
//! [`CliStackTool`] implementation shells out to the provider's command.

use std::process::ExitStatus;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::execution::context::TaskContext;
use crate::types::{StackrunError, StackrunResult};

/// Environment variable prefix for service variables
pub const VARIABLE_ENV_PREFIX: &str = "STACKRUN_VAR_";

#[async_trait]
pub trait StackTool: Send + Sync {
    /// Point the tool at the task's stack before anything else runs
    async fn select_stack(&self, ctx: &TaskContext) -> StackrunResult<()>;

    /// Run the tool with `args` against the task's stack
    async fn invoke(&self, ctx: &TaskContext, args: &[String]) -> StackrunResult<()>;
}

/// Runs the provider's command line tool in the module directory
#[derive(Debug, Default, Clone, Copy)]
pub struct CliStackTool;

impl CliStackTool {
    pub fn new() -> Self {
        Self
    }

    /// Build a command with the common setup for a task
    fn command(&self, ctx: &TaskContext) -> Command {
        let mut command = Command::new(ctx.provider.command());
        command.current_dir(&ctx.module_dir);

        if let Some(env) = &ctx.provider.env {
            command.envs(env);
        }

        command.env("STACKRUN_SERVICE", &ctx.service.name);
        command.env("STACKRUN_MODULE", &ctx.service.module);
        command.env("STACKRUN_VERSION", &ctx.service.version);
        for (name, value) in &ctx.service.variables {
            command.env(variable_env_name(name), value);
        }

        command.kill_on_drop(true);
        command
    }

    async fn status(&self, mut command: Command, what: &str) -> StackrunResult<ExitStatus> {
        debug!(command = ?command.as_std(), "spawning stack tool");
        command
            .status()
            .await
            .map_err(|e| StackrunError::Command(format!("Failed to execute {}: {}", what, e)))
    }
}

#[async_trait]
impl StackTool for CliStackTool {
    async fn select_stack(&self, ctx: &TaskContext) -> StackrunResult<()> {
        let mut command = self.command(ctx);
        command
            .args(["stack", "select", ctx.service.stack.as_str()])
            .arg("--non-interactive");

        let program = ctx.provider.command();
        let status = self
            .status(command, program)
            .await
            .map_err(|e| StackrunError::StackSelection {
                service: ctx.service.name.clone(),
                stack: ctx.service.stack.clone(),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(StackrunError::StackSelection {
                service: ctx.service.name.clone(),
                stack: ctx.service.stack.clone(),
                message: format!("'{}' exited with code {}", program, exit_code(status)),
            });
        }

        Ok(())
    }

    async fn invoke(&self, ctx: &TaskContext, args: &[String]) -> StackrunResult<()> {
        let program = ctx.provider.command();
        let mut command = self.command(ctx);
        command
            .args(args)
            .args(["--stack", ctx.service.stack.as_str()])
            .arg("--non-interactive");

        let what = format!("'{} {}'", program, args.join(" "));
        let status = self.status(command, &what).await?;

        if !status.success() {
            return Err(StackrunError::Command(format!(
                "{} failed with exit code {}",
                what,
                exit_code(status)
            )));
        }

        Ok(())
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// `region` -> `STACKRUN_VAR_REGION`
pub fn variable_env_name(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", VARIABLE_ENV_PREFIX, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_are_normalized() {
        assert_eq!(variable_env_name("region"), "STACKRUN_VAR_REGION");
        assert_eq!(variable_env_name("db-host.name"), "STACKRUN_VAR_DB_HOST_NAME");
    }
}
