//! Per-service execution context
//!
//! Every task owns a [`TaskContext`]: the target service, the directory its
//! module lives in, the provider configuration captured when the task was
//! built, and the tool used to act on the stack. Contexts are produced by a
//! [`ContextResolver`] and never shared between tasks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configs::workspace::{ProviderConfig, WorkspaceConfig};
use crate::execution::tool::StackTool;
use crate::graph::{DependencyGraph, Service};
use crate::types::{StackrunError, StackrunResult};

#[derive(Clone)]
pub struct TaskContext {
    pub service: Service,
    pub module_dir: PathBuf,
    pub provider: ProviderConfig,
    pub staging_dir: PathBuf,
    pub tool: Arc<dyn StackTool>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("service", &self.service.name)
            .field("stack", &self.service.stack)
            .field("module_dir", &self.module_dir)
            .field("provider", &self.provider.name)
            .finish()
    }
}

/// Extension of the plan files `preview` saves in the staging dir
pub const PLAN_EXTENSION: &str = "json";

impl TaskContext {
    /// Where `preview` saves the plan for this service
    pub fn plan_path(&self) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{}", self.service.name, PLAN_EXTENSION))
    }
}

/// Context handed to a command's before hook
#[derive(Debug, Clone)]
pub struct HookContext {
    pub command: String,
    pub staging_dir: PathBuf,
}

/// Resolves the execution context for one service
pub trait ContextResolver: Send + Sync {
    fn resolve(&self, graph: &DependencyGraph, service: &Service) -> StackrunResult<TaskContext>;
}

/// Resolves contexts from the workspace config and the module layout on disk
pub struct WorkspaceContextResolver {
    root: PathBuf,
    config: WorkspaceConfig,
    tool: Arc<dyn StackTool>,
}

impl WorkspaceContextResolver {
    pub fn new(root: impl Into<PathBuf>, config: WorkspaceConfig, tool: Arc<dyn StackTool>) -> Self {
        Self {
            root: root.into(),
            config,
            tool,
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        resolve_path(&self.root, Path::new(self.config.staging_dir()))
    }
}

impl ContextResolver for WorkspaceContextResolver {
    fn resolve(&self, graph: &DependencyGraph, service: &Service) -> StackrunResult<TaskContext> {
        let context_error = |message: String| StackrunError::Context {
            service: service.name.clone(),
            message,
        };

        let module = graph
            .module(&service.module)
            .ok_or_else(|| context_error(format!("module '{}' not found", service.module)))?;

        if service.stack.trim().is_empty() {
            return Err(context_error("stack name is empty".to_string()));
        }

        let module_dir = resolve_path(&self.root, &module.path);
        if !module_dir.is_dir() {
            return Err(context_error(format!(
                "module directory {} does not exist",
                module_dir.display()
            )));
        }

        // Services without a configured provider fall back to the defaults
        let provider = self
            .config
            .provider_for(&service.module_type)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::implicit(&service.module_type));

        Ok(TaskContext {
            service: service.clone(),
            module_dir,
            provider,
            staging_dir: self.staging_dir(),
            tool: Arc::clone(&self.tool),
        })
    }
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}
