//! Dependency-respecting, concurrency-limited task engine
//!
//! The engine takes a batch of root tasks, expands the full closure by
//! calling [`ServiceTask::resolve_dependencies`] on every task it sees,
//! merges tasks with the same [`TaskKey`], and then runs them bottom-up.
//! A task starts only once all of its dependencies have finished; tasks of
//! the same concurrency family share a semaphore sized by their limit.
//!
//! Dependents of a failed task are skipped. Tasks with no dependency on the
//! failure keep running.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::prelude::*;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::execution::task::{ServiceTask, TaskKey};
use crate::graph::describe_cycle;
use crate::report;
use crate::types::{StackrunError, StackrunResult};

/// Terminal state of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { elapsed_ms: u64 },
    Failed { error: String, elapsed_ms: u64 },
    /// Not attempted because a dependency did not succeed
    Skipped { dependency: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }

    fn failed(error: String, elapsed: Duration) -> Self {
        TaskOutcome::Failed {
            error,
            elapsed_ms: report::elapsed_millis(elapsed),
        }
    }
}

/// Fully expanded task closure, deduplicated by key
pub struct TaskGraph {
    tasks: Vec<ServiceTask>,
    /// Node weights index into `tasks`; edges point from a task to its dependencies
    graph: DiGraph<usize, ()>,
    /// Tasks whose dependencies could not be resolved
    resolution_errors: HashMap<NodeIndex, StackrunError>,
}

impl TaskGraph {
    /// Expand `roots` until every task's dependencies are part of the graph
    pub fn expand(roots: Vec<ServiceTask>) -> StackrunResult<Self> {
        let mut tasks: Vec<ServiceTask> = Vec::new();
        let mut graph = DiGraph::<usize, ()>::new();
        let mut index: HashMap<TaskKey, NodeIndex> = HashMap::new();
        let mut resolution_errors = HashMap::new();
        let mut queue = VecDeque::new();

        for root in roots {
            Self::insert(&mut tasks, &mut graph, &mut index, &mut queue, root);
        }

        while let Some(node) = queue.pop_front() {
            let resolved = tasks[graph[node]].resolve_dependencies();
            match resolved {
                Ok(dependencies) => {
                    for dependency in dependencies {
                        let dep_node =
                            Self::insert(&mut tasks, &mut graph, &mut index, &mut queue, dependency);
                        graph.update_edge(node, dep_node, ());
                    }
                }
                Err(e) => {
                    warn!(task = %tasks[graph[node]].key(), error = %e, "failed to resolve dependencies");
                    resolution_errors.insert(node, e);
                }
            }
        }

        let task_graph = Self {
            tasks,
            graph,
            resolution_errors,
        };
        task_graph.check_cycles()?;
        debug!(tasks = task_graph.tasks.len(), "expanded task graph");
        Ok(task_graph)
    }

    /// Add a task unless one with the same key is already present
    fn insert(
        tasks: &mut Vec<ServiceTask>,
        graph: &mut DiGraph<usize, ()>,
        index: &mut HashMap<TaskKey, NodeIndex>,
        queue: &mut VecDeque<NodeIndex>,
        task: ServiceTask,
    ) -> NodeIndex {
        let key = task.key();
        if let Some(&node) = index.get(&key) {
            return node;
        }
        let node = graph.add_node(tasks.len());
        tasks.push(task);
        index.insert(key, node);
        queue.push_back(node);
        node
    }

    fn check_cycles(&self) -> StackrunResult<()> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }

        let cycles: Vec<String> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .iter()
                    .map(|node| self.task(*node).identity().to_string())
                    .collect();
                names.sort();
                describe_cycle(&names)
            })
            .collect();

        Err(StackrunError::DependencyCycle(cycles.join("; ")))
    }

    fn task(&self, node: NodeIndex) -> &ServiceTask {
        &self.tasks[self.graph[node]]
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task keys with dependencies before dependents
    pub fn execution_order(&self) -> StackrunResult<Vec<TaskKey>> {
        let mut order = toposort(&self.graph, None).map_err(|cycle| {
            StackrunError::DependencyCycle(self.task(cycle.node_id()).identity().to_string())
        })?;
        // toposort lists dependents first because edges point at dependencies
        order.reverse();
        Ok(order.into_iter().map(|node| self.task(node).key()).collect())
    }
}

/// Runs task batches; one engine may serve many invocations
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskEngine;

impl TaskEngine {
    pub fn new() -> Self {
        Self
    }

    /// Expand the closure of `roots` without running anything
    pub fn plan(&self, roots: Vec<ServiceTask>) -> StackrunResult<Vec<TaskKey>> {
        TaskGraph::expand(roots)?.execution_order()
    }

    /// Expand and run the closure of `roots`, returning one outcome per service
    pub async fn submit(
        &self,
        roots: Vec<ServiceTask>,
    ) -> StackrunResult<BTreeMap<String, TaskOutcome>> {
        let task_graph = TaskGraph::expand(roots)?;
        self.run(&task_graph).await
    }

    async fn run(&self, task_graph: &TaskGraph) -> StackrunResult<BTreeMap<String, TaskOutcome>> {
        let graph = &task_graph.graph;
        let mut outcomes: HashMap<NodeIndex, TaskOutcome> = HashMap::new();
        let mut waiting_on: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|node| (node, graph.neighbors_directed(node, Outgoing).count()))
            .collect();
        let mut ready: VecDeque<NodeIndex> = waiting_on
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();
        let mut semaphores: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut running = FuturesUnordered::new();

        loop {
            while let Some(node) = ready.pop_front() {
                let task = task_graph.task(node);

                let failed_dependency = graph
                    .neighbors_directed(node, Outgoing)
                    .find(|dep| !outcomes.get(dep).is_some_and(TaskOutcome::is_success));
                if let Some(dep) = failed_dependency {
                    let dependency = task_graph.task(dep).identity().to_string();
                    report::task_skipped(task.command(), task.identity(), &dependency);
                    outcomes.insert(node, TaskOutcome::Skipped { dependency });
                    release_dependents(graph, node, &mut waiting_on, &mut ready);
                    continue;
                }

                if let Some(error) = task_graph.resolution_errors.get(&node) {
                    report::task_failed(task.command(), task.identity(), Duration::ZERO, error);
                    outcomes.insert(node, TaskOutcome::failed(error.to_string(), Duration::ZERO));
                    release_dependents(graph, node, &mut waiting_on, &mut ready);
                    continue;
                }

                let semaphore = Arc::clone(
                    semaphores
                        .entry(task.concurrency_family().to_string())
                        .or_insert_with(|| Arc::new(Semaphore::new(task.concurrency_limit()))),
                );

                running.push(async move {
                    let permit = semaphore.acquire_owned().await;
                    let started = Instant::now();
                    let result = match permit {
                        Ok(_permit) => {
                            debug!(task = %task.key(), limit = task.concurrency_limit(), "running task");
                            task.process().await.map_err(|e| e.to_string())
                        }
                        Err(_) => Err("semaphore closed unexpectedly".to_string()),
                    };
                    (node, result, started.elapsed())
                });
            }

            match running.next().await {
                Some((node, result, elapsed)) => {
                    let outcome = match result {
                        Ok(()) => TaskOutcome::Succeeded {
                            elapsed_ms: report::elapsed_millis(elapsed),
                        },
                        Err(error) => TaskOutcome::failed(error, elapsed),
                    };
                    outcomes.insert(node, outcome);
                    release_dependents(graph, node, &mut waiting_on, &mut ready);
                }
                None => break,
            }
        }

        let mut by_service = BTreeMap::new();
        for node in graph.node_indices() {
            let task = task_graph.task(node);
            let outcome = outcomes.remove(&node).ok_or_else(|| {
                StackrunError::Engine(format!("Task '{}' never reached a terminal state", task.key()))
            })?;
            by_service.insert(task.identity().to_string(), outcome);
        }

        Ok(by_service)
    }
}

/// Mark `node` finished for everything that depends on it
fn release_dependents(
    graph: &DiGraph<usize, ()>,
    node: NodeIndex,
    waiting_on: &mut HashMap<NodeIndex, usize>,
    ready: &mut VecDeque<NodeIndex>,
) {
    for dependent in graph.neighbors_directed(node, Incoming) {
        if let Some(count) = waiting_on.get_mut(&dependent) {
            *count -= 1;
            if *count == 0 {
                ready.push_back(dependent);
            }
        }
    }
}
