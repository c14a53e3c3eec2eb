//! Stackrun Core Library
//!
//! This is the core library for the Stackrun stack orchestration tool. It runs
//! infrastructure-as-code commands (preview, deploy, refresh, cancel, destroy)
//! across the services of a workspace, always handling a service's dependencies
//! of the same module type before the service itself.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`workspace_manager`] - High-level workspace management interface
//! - [`commands`] - The command table: names, run functions and before hooks
//! - [`execution`] - Service tasks, context resolution and the task engine
//! - [`graph`] - The service dependency graph and its snapshots
//! - [`discovery`] - Module manifest discovery
//! - [`configs`] - Configuration parsing for the workspace and modules
//! - [`report`] - Colored task status lines
//! - [`results`] - Result types for workspace operations
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! The primary entry point is the [`WorkspaceManager`] which provides a high-level
//! interface for all workspace operations:
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
//! let result = manager.run_command("deploy", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod configs;
pub mod discovery;
pub mod execution;
pub mod graph;
pub mod report;
pub mod results;
pub mod types;
pub mod workspace_manager;

// Re-export the main types for easier usage
pub use types::{StackrunError, StackrunResult};
pub use workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
