//! Command handlers
//!
//! [`make_command`] turns a [`CommandSpec`] into a [`CommandHandler`]. Each
//! invocation takes one graph snapshot, runs the command's before hook, builds a
//! root task per targeted service and hands the batch to the engine.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::commands::CommandSpec;
use crate::execution::context::{ContextResolver, HookContext};
use crate::execution::engine::TaskEngine;
use crate::execution::task::ServiceTask;
use crate::graph::{DependencyGraph, GraphSnapshot, GraphSource, Service};
use crate::results::{CommandPlan, CommandResult, UnresolvedTarget};
use crate::types::{StackrunError, StackrunResult};

/// Inputs of one command invocation
pub struct Invocation<'a> {
    /// Services to target; `None` targets every service of the handler's module type
    pub target_names: Option<&'a [String]>,
    pub graph: &'a dyn GraphSource,
    pub resolver: Arc<dyn ContextResolver>,
    pub staging_dir: PathBuf,
}

pub struct CommandHandler {
    spec: CommandSpec,
    module_type: String,
    engine: TaskEngine,
}

/// Build the handler for `spec`, applying to services of `module_type`
pub fn make_command(spec: CommandSpec, module_type: impl Into<String>) -> CommandHandler {
    CommandHandler {
        spec,
        module_type: module_type.into(),
        engine: TaskEngine::new(),
    }
}

impl CommandHandler {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn description(&self) -> &'static str {
        self.spec.description
    }

    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    /// Run the command on the targeted services and their same-type dependencies
    pub async fn handle(&self, invocation: Invocation<'_>) -> StackrunResult<CommandResult> {
        let graph = invocation.graph.snapshot().await?;

        if let Some(hook) = &self.spec.before_hook {
            let hook_context = HookContext {
                command: self.spec.name.to_string(),
                staging_dir: invocation.staging_dir.clone(),
            };
            hook(&hook_context).await.map_err(|e| match e {
                StackrunError::Hook { .. } => e,
                other => StackrunError::Hook {
                    command: self.spec.name.to_string(),
                    message: other.to_string(),
                },
            })?;
        }

        let (roots, unresolved) =
            self.build_roots(&graph, invocation.target_names, &invocation.resolver)?;
        info!(
            command = self.spec.name,
            roots = roots.len(),
            unresolved = unresolved.len(),
            "submitting tasks"
        );

        let outcomes = self.engine.submit(roots).await?;

        Ok(CommandResult {
            command: self.spec.name.to_string(),
            outcomes,
            unresolved,
        })
    }

    /// Compute the execution order without running hooks or tasks
    pub async fn plan(&self, invocation: Invocation<'_>) -> StackrunResult<CommandPlan> {
        let graph = invocation.graph.snapshot().await?;
        let (roots, unresolved) =
            self.build_roots(&graph, invocation.target_names, &invocation.resolver)?;

        Ok(CommandPlan {
            command: self.spec.name.to_string(),
            order: self.engine.plan(roots)?,
            unresolved,
        })
    }

    /// Services the command applies to.
    ///
    /// Named services of another module type are dropped without an error.
    pub fn target_services<'g>(
        &self,
        graph: &'g DependencyGraph,
        target_names: Option<&[String]>,
    ) -> StackrunResult<Vec<&'g Service>> {
        let mut seen = HashSet::new();
        Ok(graph
            .services(target_names)?
            .into_iter()
            .filter(|service| service.module_type == self.module_type)
            .filter(|service| seen.insert(service.name.as_str()))
            .collect())
    }

    fn build_roots(
        &self,
        graph: &GraphSnapshot,
        target_names: Option<&[String]>,
        resolver: &Arc<dyn ContextResolver>,
    ) -> StackrunResult<(Vec<ServiceTask>, Vec<UnresolvedTarget>)> {
        let mut roots = Vec::new();
        let mut unresolved = Vec::new();

        for service in self.target_services(graph, target_names)? {
            match resolver.resolve(graph, service) {
                Ok(context) => roots.push(ServiceTask::new(
                    &self.spec,
                    self.module_type.as_str(),
                    Arc::clone(graph),
                    Arc::clone(resolver),
                    context,
                )),
                Err(e) => {
                    warn!(command = self.spec.name, service = %service.name, error = %e, "skipping service");
                    unresolved.push(UnresolvedTarget {
                        service: service.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok((roots, unresolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::BoxFuture;

    use crate::commands::find_spec;
    use crate::execution::engine::TaskOutcome;
    use crate::execution::testing::{test_resolver, RecordingTool};
    use crate::graph::test_graph;

    fn scenario_graph() -> GraphSnapshot {
        Arc::new(test_graph(&[
            ("a", "pulumi", &["b"]),
            ("b", "pulumi", &[]),
            ("z", "container", &[]),
        ]))
    }

    fn invocation<'a>(
        graph: &'a GraphSnapshot,
        tool: &Arc<RecordingTool>,
        targets: Option<&'a [String]>,
    ) -> Invocation<'a> {
        Invocation {
            target_names: targets,
            graph,
            resolver: test_resolver(tool, &[]),
            staging_dir: PathBuf::from("plans"),
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn refresh_runs_dependency_first() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let targets = names(&["a"]);
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let result = handler
            .handle(invocation(&graph, &tool, Some(&targets)))
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 2);
        assert!(result.is_success());
        assert!(tool.position("end b").unwrap() < tool.position("start a refresh --yes").unwrap());
    }

    #[tokio::test]
    async fn failing_dependency_skips_dependent() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        tool.fail_run_for("b");
        let targets = names(&["a"]);
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let result = handler
            .handle(invocation(&graph, &tool, Some(&targets)))
            .await
            .unwrap();

        assert!(matches!(result.outcomes["b"], TaskOutcome::Failed { .. }));
        assert_eq!(
            result.outcomes["a"],
            TaskOutcome::Skipped {
                dependency: "b".to_string()
            }
        );
        assert_eq!(result.failed(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn other_module_types_are_silently_dropped() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let targets = names(&["a", "z"]);
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let result = handler
            .handle(invocation(&graph, &tool, Some(&targets)))
            .await
            .unwrap();

        let services: Vec<_> = result.outcomes.keys().map(String::as_str).collect();
        assert_eq!(services, vec!["a", "b"]);
        assert!(result.unresolved.is_empty());
        assert_eq!(tool.runs_of("z"), 0);
    }

    #[tokio::test]
    async fn no_targets_covers_every_applicable_service_once() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let result = handler.handle(invocation(&graph, &tool, None)).await.unwrap();

        let services: Vec<_> = result.outcomes.keys().map(String::as_str).collect();
        assert_eq!(services, vec!["a", "b"]);
        assert_eq!(tool.runs_of("a"), 1);
        assert_eq!(tool.runs_of("b"), 1);
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let targets = names(&["missing"]);
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let err = handler
            .handle(invocation(&graph, &tool, Some(&targets)))
            .await
            .unwrap_err();
        assert!(matches!(err, StackrunError::Graph(_)));
    }

    #[tokio::test]
    async fn context_failure_only_drops_that_service() {
        let graph = Arc::new(test_graph(&[("a", "pulumi", &[]), ("c", "pulumi", &[])]));
        let tool = RecordingTool::new();
        let handler = make_command(find_spec("refresh").unwrap(), "pulumi");

        let result = handler
            .handle(Invocation {
                target_names: None,
                graph: &graph,
                resolver: test_resolver(&tool, &["a"]),
                staging_dir: PathBuf::from("plans"),
            })
            .await
            .unwrap();

        assert_eq!(result.unresolved.len(), 1);
        assert_eq!(result.unresolved[0].service, "a");
        assert!(result.outcomes["c"].is_success());
        assert!(!result.outcomes.contains_key("a"));
        assert!(!result.is_success());
    }

    fn failing_hook(_ctx: &HookContext) -> BoxFuture<'_, StackrunResult<()>> {
        Box::pin(async { Err(StackrunError::Io(std::io::Error::other("disk full"))) })
    }

    #[tokio::test]
    async fn failing_hook_stops_before_any_task() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let mut spec = find_spec("refresh").unwrap();
        spec.before_hook = Some(Arc::new(failing_hook));
        let handler = make_command(spec, "pulumi");

        let err = handler.handle(invocation(&graph, &tool, None)).await.unwrap_err();

        assert!(matches!(err, StackrunError::Hook { ref message, .. } if message.contains("disk full")));
        assert!(tool.calls().is_empty());
    }

    struct BrokenGraph;

    #[async_trait]
    impl GraphSource for BrokenGraph {
        async fn snapshot(&self) -> StackrunResult<GraphSnapshot> {
            Err(StackrunError::Graph("manifest unreadable".to_string()))
        }
    }

    #[tokio::test]
    async fn graph_failure_is_fatal_and_skips_hook() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging_dir = temp_dir.path().join("plans");
        let tool = RecordingTool::new();
        let handler = make_command(find_spec("preview").unwrap(), "pulumi");

        let err = handler
            .handle(Invocation {
                target_names: None,
                graph: &BrokenGraph,
                resolver: test_resolver(&tool, &[]),
                staging_dir: staging_dir.clone(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StackrunError::Graph(_)));
        assert!(!staging_dir.exists());
    }

    #[tokio::test]
    async fn preview_hook_prepares_staging_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging_dir = temp_dir.path().join("plans");
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let handler = make_command(find_spec("preview").unwrap(), "pulumi");

        let result = handler
            .handle(Invocation {
                target_names: None,
                graph: &graph,
                resolver: test_resolver(&tool, &[]),
                staging_dir: staging_dir.clone(),
            })
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(staging_dir.is_dir());
        assert!(tool
            .position("start b preview --save-plan plans/b.json")
            .is_some());
    }

    #[tokio::test]
    async fn plan_lists_closure_without_running() {
        let graph = scenario_graph();
        let tool = RecordingTool::new();
        let targets = names(&["a"]);
        let handler = make_command(find_spec("destroy").unwrap(), "pulumi");

        let plan = handler
            .plan(invocation(&graph, &tool, Some(&targets)))
            .await
            .unwrap();

        let order: Vec<_> = plan.order.iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["destroy.b", "destroy.a"]);
        assert!(tool.calls().is_empty());
    }
}
