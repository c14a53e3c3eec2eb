//! Configuration parsing for the workspace and its module manifests

pub mod module;
pub mod workspace;
