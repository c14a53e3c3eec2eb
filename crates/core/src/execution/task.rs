//! The dependency-closure task
//!
//! A [`ServiceTask`] runs one command against one service. It does not carry
//! a dependency list; instead [`ServiceTask::resolve_dependencies`] asks the
//! graph snapshot for the service's direct dependencies of the same module
//! type and wraps each of them in a sibling task for the same command. The
//! engine calls it again on every task it receives, so the whole closure is
//! built one hop at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::commands::{CommandSpec, RunFn};
use crate::execution::context::{ContextResolver, TaskContext};
use crate::graph::{DependencyQuery, GraphSnapshot, Service};
use crate::report;
use crate::types::StackrunResult;

/// Identity used by the engine to merge duplicate tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub command: String,
    pub service: String,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.command, self.service)
    }
}

#[derive(Clone)]
pub struct ServiceTask {
    command: &'static str,
    command_description: &'static str,
    run: RunFn,
    module_type: String,
    graph: GraphSnapshot,
    resolver: Arc<dyn ContextResolver>,
    context: TaskContext,
    concurrency_limit: usize,
    force: bool,
    version: String,
}

impl fmt::Debug for ServiceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTask")
            .field("key", &self.key())
            .field("concurrency_limit", &self.concurrency_limit)
            .field("version", &self.version)
            .finish()
    }
}

impl ServiceTask {
    /// Build a task for the service in `context`.
    ///
    /// The concurrency limit is captured from the context's provider now and
    /// never re-read while the task runs.
    pub fn new(
        spec: &CommandSpec,
        module_type: impl Into<String>,
        graph: GraphSnapshot,
        resolver: Arc<dyn ContextResolver>,
        context: TaskContext,
    ) -> Self {
        Self {
            command: spec.name,
            command_description: spec.description,
            run: Arc::clone(&spec.run),
            module_type: module_type.into(),
            graph,
            resolver,
            concurrency_limit: context.provider.concurrency().max(1),
            force: false,
            version: context.service.version.clone(),
            context,
        }
    }

    /// Sibling task for `service`: same command and run function, own context
    pub fn for_dependency(&self, service: &Service) -> StackrunResult<Self> {
        let context = self.resolver.resolve(&self.graph, service)?;
        Ok(Self {
            command: self.command,
            command_description: self.command_description,
            run: Arc::clone(&self.run),
            module_type: self.module_type.clone(),
            graph: Arc::clone(&self.graph),
            resolver: Arc::clone(&self.resolver),
            concurrency_limit: context.provider.concurrency().max(1),
            force: false,
            version: service.version.clone(),
            context,
        })
    }

    /// Name of the target service
    pub fn identity(&self) -> &str {
        &self.context.service.name
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            command: self.command.to_string(),
            service: self.identity().to_string(),
        }
    }

    pub fn command(&self) -> &str {
        self.command
    }

    /// Display string, e.g. `refresh api`
    pub fn description(&self) -> String {
        format!("{} {}", self.command, self.identity())
    }

    pub fn command_description(&self) -> &str {
        self.command_description
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Tasks sharing a family share one concurrency ceiling
    pub fn concurrency_family(&self) -> &str {
        &self.context.provider.name
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// One task per direct dependency of the same module type.
    ///
    /// Only one hop is walked; the engine applies this again to each returned
    /// task. No cycle tracking happens here.
    pub fn resolve_dependencies(&self) -> StackrunResult<Vec<ServiceTask>> {
        let dependencies = self.graph.dependencies(&DependencyQuery {
            name: self.identity(),
            recursive: false,
            module_type: Some(self.module_type.as_str()),
        })?;

        debug!(
            task = %self.key(),
            dependencies = dependencies.deploy.len(),
            "resolved dependencies"
        );

        dependencies
            .deploy
            .iter()
            .map(|service| self.for_dependency(service))
            .collect()
    }

    /// Select the stack, run the command and report the outcome
    pub async fn process(&self) -> StackrunResult<()> {
        let started = Instant::now();
        report::task_started(self.command, self.identity());

        let result = self.execute().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => report::task_succeeded(self.command, self.identity(), elapsed),
            Err(e) => report::task_failed(self.command, self.identity(), elapsed, e),
        }

        result
    }

    async fn execute(&self) -> StackrunResult<()> {
        self.context.tool.select_stack(&self.context).await?;
        (self.run)(&self.context).await
    }
}
