//! Task execution module
//!
//! This module turns command specs into service tasks and runs them: context
//! resolution, the stack tool seam, dependency-closure tasks, the task engine
//! and the per-command handlers that tie them together.

pub mod context;
pub mod engine;
pub mod factory;
pub mod task;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{ContextResolver, HookContext, TaskContext, WorkspaceContextResolver};
pub use engine::{TaskEngine, TaskOutcome};
pub use factory::{make_command, CommandHandler, Invocation};
pub use task::{ServiceTask, TaskKey};
pub use tool::{CliStackTool, StackTool};
