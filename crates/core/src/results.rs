//! Result types for workspace operations
//!
//! This module contains the result types returned by command handlers and the
//! workspace manager, providing a centralized location for output structures.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::execution::engine::TaskOutcome;
use crate::execution::task::TaskKey;
use crate::graph::{Module, Service};
use crate::types::StackrunResult;

/// Information about a service and the module declaring it
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub module: String,
    pub module_type: String,
    pub stack: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub path: PathBuf,
}

impl ServiceInfo {
    pub fn new(service: &Service, module: &Module) -> Self {
        Self {
            name: service.name.clone(),
            module: service.module.clone(),
            module_type: service.module_type.clone(),
            stack: service.stack.clone(),
            version: service.version.clone(),
            dependencies: service.dependencies.clone(),
            path: module.path.clone(),
        }
    }
}

/// Result of listing services in the workspace
#[derive(Debug)]
pub struct ServiceListResult {
    /// Module type the stack commands apply to
    pub module_type: String,
    pub services: Vec<ServiceInfo>,
}

/// Result of getting the dependency graph
#[derive(Debug)]
pub struct DependencyGraphResult {
    pub graph: petgraph::Graph<String, ()>,
    pub cycles: Vec<Vec<String>>,
}

/// A targeted service whose task could not be built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedTarget {
    pub service: String,
    pub error: String,
}

/// Execution order for a command, computed without running anything
#[derive(Debug)]
pub struct CommandPlan {
    pub command: String,
    pub order: Vec<TaskKey>,
    pub unresolved: Vec<UnresolvedTarget>,
}

/// Aggregate outcome of one command invocation
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub outcomes: BTreeMap<String, TaskOutcome>,
    pub unresolved: Vec<UnresolvedTarget>,
}

impl CommandResult {
    /// True when every task succeeded and every target resolved
    pub fn is_success(&self) -> bool {
        self.unresolved.is_empty() && self.outcomes.values().all(TaskOutcome::is_success)
    }

    /// Services whose task failed or was skipped
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> StackrunResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::types::StackrunError::Engine(format!("Failed to serialize result: {}", e)))
    }
}
