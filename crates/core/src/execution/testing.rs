//! In-memory tool and resolver used by the execution tests

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::configs::workspace::ProviderConfig;
use crate::execution::context::{ContextResolver, TaskContext};
use crate::execution::tool::StackTool;
use crate::graph::{DependencyGraph, Service};
use crate::types::{StackrunError, StackrunResult};

/// Records every call as a line like `select api-dev`, `start api refresh --yes`,
/// `end api` or `fail api`.
#[derive(Default)]
pub(crate) struct RecordingTool {
    calls: Mutex<Vec<String>>,
    fail_selection: Mutex<HashSet<String>>,
    fail_run: Mutex<HashSet<String>>,
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingTool {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub(crate) fn fail_selection_for(&self, service: &str) {
        self.fail_selection.lock().unwrap().insert(service.to_string());
    }

    pub(crate) fn fail_run_for(&self, service: &str) {
        self.fail_run.lock().unwrap().insert(service.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Index of the first recorded call equal to `call`
    pub(crate) fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Number of `start` calls recorded for `service`
    pub(crate) fn runs_of(&self, service: &str) -> usize {
        let prefix = format!("start {} ", service);
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StackTool for RecordingTool {
    async fn select_stack(&self, ctx: &TaskContext) -> StackrunResult<()> {
        self.record(format!("select {}", ctx.service.stack));
        if self.fail_selection.lock().unwrap().contains(&ctx.service.name) {
            return Err(StackrunError::StackSelection {
                service: ctx.service.name.clone(),
                stack: ctx.service.stack.clone(),
                message: "no remote state".to_string(),
            });
        }
        Ok(())
    }

    async fn invoke(&self, ctx: &TaskContext, args: &[String]) -> StackrunResult<()> {
        let name = &ctx.service.name;
        self.record(format!("start {} {}", name, args.join(" ")));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail_run.lock().unwrap().contains(name) {
            self.record(format!("fail {}", name));
            return Err(StackrunError::Command(format!("{} exited with code 1", name)));
        }
        self.record(format!("end {}", name));
        Ok(())
    }
}

/// Resolver that needs nothing on disk. Services listed in `failing` cannot
/// be resolved; all others get a `pulumi` provider limited to two tasks.
pub(crate) fn test_resolver(tool: &Arc<RecordingTool>, failing: &[&str]) -> Arc<dyn ContextResolver> {
    test_resolver_with_limit(tool, failing, 2)
}

pub(crate) fn test_resolver_with_limit(
    tool: &Arc<RecordingTool>,
    failing: &[&str],
    concurrency: usize,
) -> Arc<dyn ContextResolver> {
    Arc::new(TestResolver {
        tool: Arc::clone(tool),
        failing: failing.iter().map(|s| s.to_string()).collect(),
        concurrency,
    })
}

struct TestResolver {
    tool: Arc<RecordingTool>,
    failing: HashSet<String>,
    concurrency: usize,
}

impl ContextResolver for TestResolver {
    fn resolve(&self, graph: &DependencyGraph, service: &Service) -> StackrunResult<TaskContext> {
        if self.failing.contains(&service.name) {
            return Err(StackrunError::Context {
                service: service.name.clone(),
                message: "provider unavailable".to_string(),
            });
        }
        let module = graph.module(&service.module).ok_or_else(|| StackrunError::Context {
            service: service.name.clone(),
            message: "module missing".to_string(),
        })?;

        Ok(TaskContext {
            service: service.clone(),
            module_dir: module.path.clone(),
            provider: ProviderConfig {
                name: "pulumi".to_string(),
                module_type: "pulumi".to_string(),
                command: None,
                concurrency: Some(self.concurrency),
                env: None,
            },
            staging_dir: PathBuf::from("plans"),
            tool: Arc::clone(&self.tool) as Arc<dyn StackTool>,
        })
    }
}
