//! Service dependency graph
//!
//! The graph is built once from the discovered module manifests and then
//! shared read-only (as a [`GraphSnapshot`]) by every task derived from a
//! single command invocation. Edges point from a service to the services it
//! depends on, so dependencies are reached by following outgoing edges.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::algo::kosaraju_scc;
use petgraph::prelude::*;
use serde::Serialize;

use crate::types::{StackrunError, StackrunResult};

/// A group of services declared by one manifest and handled by one provider tool
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub name: String,
    pub module_type: String,
    pub path: PathBuf,
    pub description: Option<String>,
    pub services: Vec<String>,
}

/// A deployable unit tracked in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub module: String,
    pub module_type: String,
    pub stack: String,
    /// Fingerprint of the service definition, used for staleness decisions
    pub version: String,
    pub dependencies: Vec<String>,
    pub variables: BTreeMap<String, String>,
}

/// Parameters of a dependency lookup
#[derive(Debug, Clone, Copy)]
pub struct DependencyQuery<'a> {
    pub name: &'a str,
    /// Follow dependencies transitively instead of stopping after one hop
    pub recursive: bool,
    /// Only return services of this module type
    pub module_type: Option<&'a str>,
}

/// Result of a dependency lookup, sorted by service name
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    pub deploy: Vec<Service>,
}

#[derive(Debug)]
pub struct DependencyGraph {
    modules: Vec<Module>,
    services: BTreeMap<String, Service>,
    graph: DiGraph<String, ()>,
    node_indices: HashMap<String, NodeIndex>,
    cycles: Vec<Vec<String>>,
}

/// Read-only graph shared by all tasks of one command invocation
pub type GraphSnapshot = Arc<DependencyGraph>;

/// Supplies the graph snapshot a command invocation operates on
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn snapshot(&self) -> StackrunResult<GraphSnapshot>;
}

#[async_trait]
impl GraphSource for GraphSnapshot {
    async fn snapshot(&self) -> StackrunResult<GraphSnapshot> {
        Ok(Arc::clone(self))
    }
}

impl DependencyGraph {
    /// Build the graph, failing on duplicate module or service names and on
    /// unknown dependencies.
    ///
    /// Cycles do not fail the build; they are recorded and reported through
    /// [`DependencyGraph::cycles`].
    pub fn build(modules: Vec<Module>, services: Vec<Service>) -> StackrunResult<Self> {
        let mut graph = DiGraph::<String, ()>::new();
        let mut node_indices = HashMap::new();
        let mut by_name = BTreeMap::new();

        let mut module_names = HashSet::new();
        for module in &modules {
            if !module_names.insert(module.name.as_str()) {
                return Err(StackrunError::Graph(format!(
                    "Module '{}' is declared more than once (again in {})",
                    module.name,
                    module.path.display()
                )));
            }
        }

        for service in services {
            if by_name.contains_key(&service.name) {
                return Err(StackrunError::Graph(format!(
                    "Service '{}' is declared more than once",
                    service.name
                )));
            }
            if !modules.iter().any(|m| m.name == service.module) {
                return Err(StackrunError::Graph(format!(
                    "Service '{}' references unknown module '{}'",
                    service.name, service.module
                )));
            }
            let node_index = graph.add_node(service.name.clone());
            node_indices.insert(service.name.clone(), node_index);
            by_name.insert(service.name.clone(), service);
        }

        for service in by_name.values() {
            let from_node = node_indices[&service.name];
            for dep in &service.dependencies {
                if let Some(&to_node) = node_indices.get(dep) {
                    // Edge: service -> dependency (dependency comes first)
                    graph.update_edge(from_node, to_node, ());
                } else {
                    return Err(StackrunError::Graph(format!(
                        "Service '{}' depends on '{}' which was not found",
                        service.name, dep
                    )));
                }
            }
        }

        let cycles = find_cycles(&graph);

        Ok(Self {
            modules,
            services: by_name,
            graph,
            node_indices,
            cycles,
        })
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// All services sorted by name, or the named ones in the order given.
    ///
    /// Naming a service that does not exist is an error.
    pub fn services(&self, names: Option<&[String]>) -> StackrunResult<Vec<&Service>> {
        match names {
            None => Ok(self.services.values().collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    self.services.get(name).ok_or_else(|| {
                        StackrunError::Graph(format!("Service '{}' not found in workspace", name))
                    })
                })
                .collect(),
        }
    }

    /// Services the named service depends on
    pub fn dependencies(&self, query: &DependencyQuery<'_>) -> StackrunResult<Dependencies> {
        let &start = self.node_indices.get(query.name).ok_or_else(|| {
            StackrunError::Graph(format!("Service '{}' not found in workspace", query.name))
        })?;

        let mut reached = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = self.graph.neighbors(start).collect();
        while let Some(node_index) = queue.pop_front() {
            if !reached.insert(node_index) {
                continue;
            }
            if query.recursive {
                queue.extend(self.graph.neighbors(node_index));
            }
        }

        let mut deploy: Vec<Service> = reached
            .into_iter()
            .filter_map(|node| self.services.get(&self.graph[node]))
            .filter(|service| {
                query
                    .module_type
                    .map_or(true, |module_type| service.module_type == module_type)
            })
            .cloned()
            .collect();
        deploy.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Dependencies { deploy })
    }

    /// Dependency cycles, each sorted by name
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    pub fn graph(&self) -> &DiGraph<String, ()> {
        &self.graph
    }
}

/// Detect cycles using strongly connected components
fn find_cycles(graph: &DiGraph<String, ()>) -> Vec<Vec<String>> {
    let mut cycles: Vec<Vec<String>> = kosaraju_scc(graph)
        .into_iter()
        .filter_map(|component| {
            if component.len() > 1 {
                let mut cycle = component
                    .iter()
                    .map(|node| graph[*node].clone())
                    .collect::<Vec<_>>();
                cycle.sort();
                Some(cycle)
            } else {
                let node = component[0];
                if graph.contains_edge(node, node) {
                    Some(vec![graph[node].clone()])
                } else {
                    None
                }
            }
        })
        .collect();

    cycles.sort();
    cycles
}

/// Render a cycle as `a -> b -> a`
pub fn describe_cycle(cycle: &[String]) -> String {
    let mut path = cycle.to_vec();
    if let Some(first) = path.first().cloned() {
        path.push(first);
    }
    path.join(" -> ")
}

/// Graph builder for tests: one module per module type, services given as
/// `(name, module_type, dependencies)`.
#[cfg(test)]
pub(crate) fn test_graph(specs: &[(&str, &str, &[&str])]) -> DependencyGraph {
    let mut modules: Vec<Module> = Vec::new();
    let mut services = Vec::new();

    for (name, module_type, deps) in specs {
        let module_name = format!("{}-module", module_type);
        match modules.iter_mut().find(|m| m.name == module_name) {
            Some(module) => module.services.push(name.to_string()),
            None => modules.push(Module {
                name: module_name.clone(),
                module_type: module_type.to_string(),
                path: PathBuf::from(module_type),
                description: None,
                services: vec![name.to_string()],
            }),
        }
        services.push(Service {
            name: name.to_string(),
            module: module_name,
            module_type: module_type.to_string(),
            stack: format!("{}-dev", name),
            version: format!("v-{}", name),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            variables: BTreeMap::new(),
        });
    }

    DependencyGraph::build(modules, services).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(deps: &Dependencies) -> Vec<&str> {
        deps.deploy.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn direct_dependencies_are_one_hop_only() {
        let graph = test_graph(&[
            ("app", "pulumi", &["api"]),
            ("api", "pulumi", &["db"]),
            ("db", "pulumi", &[]),
        ]);

        let direct = graph
            .dependencies(&DependencyQuery {
                name: "app",
                recursive: false,
                module_type: None,
            })
            .unwrap();
        assert_eq!(names(&direct), vec!["api"]);

        let all = graph
            .dependencies(&DependencyQuery {
                name: "app",
                recursive: true,
                module_type: None,
            })
            .unwrap();
        assert_eq!(names(&all), vec!["api", "db"]);
    }

    #[test]
    fn module_type_filter_excludes_other_types() {
        let graph = test_graph(&[
            ("api", "pulumi", &["bucket", "network"]),
            ("network", "pulumi", &[]),
            ("bucket", "container", &[]),
        ]);

        let deps = graph
            .dependencies(&DependencyQuery {
                name: "api",
                recursive: false,
                module_type: Some("pulumi"),
            })
            .unwrap();
        assert_eq!(names(&deps), vec!["network"]);
    }

    #[test]
    fn unknown_dependency_fails_the_build() {
        let module = Module {
            name: "m".to_string(),
            module_type: "pulumi".to_string(),
            path: PathBuf::from("m"),
            description: None,
            services: vec!["a".to_string()],
        };
        let service = Service {
            name: "a".to_string(),
            module: "m".to_string(),
            module_type: "pulumi".to_string(),
            stack: "a".to_string(),
            version: "v-a".to_string(),
            dependencies: vec!["missing".to_string()],
            variables: BTreeMap::new(),
        };

        let err = DependencyGraph::build(vec![module], vec![service]).unwrap_err();
        assert!(err.to_string().contains("'missing' which was not found"));
    }

    #[test]
    fn duplicate_module_names_fail_the_build() {
        let module = |path: &str, service: &str| Module {
            name: "infra".to_string(),
            module_type: "pulumi".to_string(),
            path: PathBuf::from(path),
            description: None,
            services: vec![service.to_string()],
        };
        let service = |name: &str| Service {
            name: name.to_string(),
            module: "infra".to_string(),
            module_type: "pulumi".to_string(),
            stack: name.to_string(),
            version: format!("v-{}", name),
            dependencies: Vec::new(),
            variables: BTreeMap::new(),
        };

        let err = DependencyGraph::build(
            vec![module("a", "one"), module("b", "two")],
            vec![service("one"), service("two")],
        )
        .unwrap_err();
        assert!(matches!(err, StackrunError::Graph(ref msg) if msg.contains("Module 'infra'")));
    }

    #[test]
    fn cycles_are_recorded_not_rejected() {
        let graph = test_graph(&[("a", "pulumi", &["b"]), ("b", "pulumi", &["a"])]);

        assert_eq!(graph.cycles(), &[vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(describe_cycle(&graph.cycles()[0]), "a -> b -> a");

        // recursive walk still terminates, reaching the start again
        let deps = graph
            .dependencies(&DependencyQuery {
                name: "a",
                recursive: true,
                module_type: None,
            })
            .unwrap();
        assert_eq!(names(&deps), vec!["a", "b"]);
    }

    #[test]
    fn self_dependency_is_reported_one_hop() {
        let graph = test_graph(&[("one", "pulumi", &["one"])]);
        assert_eq!(graph.cycles(), &[vec!["one".to_string()]]);

        let deps = graph
            .dependencies(&DependencyQuery {
                name: "one",
                recursive: false,
                module_type: Some("pulumi"),
            })
            .unwrap();
        assert_eq!(names(&deps), vec!["one"]);
    }

    #[test]
    fn services_lookup_by_name() {
        let graph = test_graph(&[("a", "pulumi", &[]), ("b", "pulumi", &[])]);

        let all = graph.services(None).unwrap();
        assert_eq!(all.len(), 2);

        let picked = graph.services(Some(&["b".to_string()])).unwrap();
        assert_eq!(picked[0].name, "b");

        assert!(graph.services(Some(&["nope".to_string()])).is_err());
    }
}
