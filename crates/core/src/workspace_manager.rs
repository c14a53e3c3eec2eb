//! High-level workspace management interface
//!
//! This module provides the [`WorkspaceManager`] which serves as the primary interface
//! for all workspace operations. It loads the workspace configuration, builds the
//! service graph from the module manifests on disk and runs stack commands.
//!
//! The graph is rebuilt from disk at the start of every command invocation, so a
//! long-lived manager always acts on the manifests as they are now.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stackrun_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> stackrun_core::types::StackrunResult<()> {
//! let manager = WorkspaceManager::new(WorkspaceManagerConfig {
//!     workspace_root: PathBuf::from("."),
//! }).await?;
//!
//! // List all services
//! let services = manager.list_services().await?;
//!
//! // Show what a deploy would run
//! let plan = manager.plan("deploy", None).await?;
//!
//! // Refresh one service and its dependencies
//! let result = manager.run_command("refresh", Some(&["api".to_string()])).await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::commands::{command_specs, find_spec, validate_specs};
use crate::configs::workspace::{parse_workspace_config, WorkspaceConfig};
use crate::discovery::discover_modules;
use crate::execution::context::{ContextResolver, WorkspaceContextResolver};
use crate::execution::factory::{make_command, CommandHandler, Invocation};
use crate::execution::tool::{CliStackTool, StackTool};
use crate::graph::{DependencyGraph, GraphSnapshot, GraphSource};
use crate::results::{
    CommandPlan, CommandResult, DependencyGraphResult, ServiceInfo, ServiceListResult,
};
use crate::types::{StackrunError, StackrunResult};

/// Location of the workspace configuration, relative to the root
pub const WORKSPACE_CONFIG_PATH: &str = ".stackrun/workspace.yml";

/// High-level workspace manager that encapsulates all workspace operations
pub struct WorkspaceManager {
    pub root: PathBuf,
    pub workspace_config: WorkspaceConfig,
    source: WorkspaceGraphSource,
    tool: Arc<dyn StackTool>,
}

/// Configuration for initializing a workspace manager
pub struct WorkspaceManagerConfig {
    pub workspace_root: PathBuf,
}

impl WorkspaceManager {
    /// Initialize a new workspace manager from the given workspace root
    pub async fn new(config: WorkspaceManagerConfig) -> StackrunResult<Self> {
        let workspace_config = Self::load_workspace_config(&config.workspace_root).await?;
        validate_specs(&command_specs())?;

        let source = WorkspaceGraphSource {
            root: config.workspace_root.clone(),
            includes: workspace_config.includes.clone().unwrap_or_default(),
            excludes: workspace_config.excludes.clone().unwrap_or_default(),
        };

        Ok(Self {
            root: config.workspace_root,
            workspace_config,
            source,
            tool: Arc::new(CliStackTool::new()),
        })
    }

    /// Replace the tool that acts on stacks
    pub fn with_tool(mut self, tool: Arc<dyn StackTool>) -> Self {
        self.tool = tool;
        self
    }

    /// Current service graph, read from disk
    pub async fn graph(&self) -> StackrunResult<GraphSnapshot> {
        self.source.snapshot().await
    }

    /// List all services in the workspace
    pub async fn list_services(&self) -> StackrunResult<ServiceListResult> {
        let graph = self.graph().await?;
        let services = graph
            .services(None)?
            .into_iter()
            .filter_map(|service| {
                graph
                    .module(&service.module)
                    .map(|module| ServiceInfo::new(service, module))
            })
            .collect();

        Ok(ServiceListResult {
            module_type: self.workspace_config.module_type().to_string(),
            services,
        })
    }

    /// Get dependency graph information
    pub async fn get_dependency_graph(&self) -> StackrunResult<DependencyGraphResult> {
        let graph = self.graph().await?;
        Ok(DependencyGraphResult {
            graph: graph.graph().clone(),
            cycles: graph.cycles().to_vec(),
        })
    }

    /// One handler per registered command, in table order
    pub fn commands(&self) -> Vec<CommandHandler> {
        command_specs()
            .into_iter()
            .map(|spec| make_command(spec, self.workspace_config.module_type()))
            .collect()
    }

    pub fn command(&self, name: &str) -> StackrunResult<CommandHandler> {
        Ok(make_command(
            find_spec(name)?,
            self.workspace_config.module_type(),
        ))
    }

    /// Execution order of `command` without running anything
    pub async fn plan(
        &self,
        command: &str,
        targets: Option<&[String]>,
    ) -> StackrunResult<CommandPlan> {
        let handler = self.command(command)?;
        handler.plan(self.invocation(targets)).await
    }

    /// Run `command` on `targets` (or every applicable service) and their dependencies
    pub async fn run_command(
        &self,
        command: &str,
        targets: Option<&[String]>,
    ) -> StackrunResult<CommandResult> {
        let handler = self.command(command)?;
        info!(command, module_type = handler.module_type(), "running command");
        handler.handle(self.invocation(targets)).await
    }

    fn invocation<'a>(&'a self, targets: Option<&'a [String]>) -> Invocation<'a> {
        let resolver = WorkspaceContextResolver::new(
            self.root.clone(),
            self.workspace_config.clone(),
            Arc::clone(&self.tool),
        );
        let staging_dir = resolver.staging_dir();

        Invocation {
            target_names: targets,
            graph: &self.source,
            resolver: Arc::new(resolver) as Arc<dyn ContextResolver>,
            staging_dir,
        }
    }

    async fn load_workspace_config(workspace_root: &Path) -> StackrunResult<WorkspaceConfig> {
        let workspace_config_path = workspace_root.join(WORKSPACE_CONFIG_PATH);
        let content = tokio::fs::read_to_string(&workspace_config_path)
            .await
            .map_err(|e| {
                StackrunError::Config(format!(
                    "Failed to read workspace config {}: {}",
                    workspace_config_path.display(),
                    e
                ))
            })?;

        parse_workspace_config(&content).map_err(|e| {
            StackrunError::Config(format!(
                "Failed to parse workspace config {}: {}",
                workspace_config_path.display(),
                e
            ))
        })
    }
}

/// Builds a fresh graph from the module manifests on every snapshot
struct WorkspaceGraphSource {
    root: PathBuf,
    includes: Vec<String>,
    excludes: Vec<String>,
}

#[async_trait]
impl GraphSource for WorkspaceGraphSource {
    async fn snapshot(&self) -> StackrunResult<GraphSnapshot> {
        let root = self.root.clone();
        let includes = self.includes.clone();
        let excludes = self.excludes.clone();

        let discovered =
            tokio::task::spawn_blocking(move || discover_modules(&root, &includes, &excludes))
                .await
                .map_err(|e| StackrunError::Graph(format!("Module discovery failed: {}", e)))??;

        debug!(
            modules = discovered.modules.len(),
            services = discovered.services.len(),
            "built workspace graph"
        );
        let graph = DependencyGraph::build(discovered.modules, discovered.services)?;
        Ok(Arc::new(graph))
    }
}
