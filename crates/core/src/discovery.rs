//! Module manifest discovery
//!
//! Walks the workspace breadth-first looking for `stackrun.yml` manifests and
//! turns each one into a [`Module`] plus its [`Service`]s.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::configs::module::{parse_module_config, ModuleConfig, MODULE_MANIFEST};
use crate::graph::{Module, Service};
use crate::types::{StackrunError, StackrunResult};

const DEFAULT_INCLUDE_GLOBS: &[&str] = &["**"];
const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/.stackrun/**",
];

/// Modules and services found in a workspace
#[derive(Debug, Default)]
pub struct Discovered {
    pub modules: Vec<Module>,
    pub services: Vec<Service>,
}

fn build_glob_set(patterns: &[String]) -> StackrunResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| StackrunError::Config(format!("Invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| StackrunError::Config(format!("Failed to build glob set: {}", e)))
}

/// Find every module manifest under `root`
pub fn discover_modules(
    root: &Path,
    includes: &[String],
    excludes: &[String],
) -> StackrunResult<Discovered> {
    // Use provided includes or default to include everything
    let includes = if includes.is_empty() {
        DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect()
    } else {
        includes.to_vec()
    };

    // Combine provided excludes with defaults
    let mut all_excludes = DEFAULT_EXCLUDE_GLOBS
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    all_excludes.extend(excludes.iter().cloned());

    let include_set = build_glob_set(&includes)?;
    let exclude_set = build_glob_set(&all_excludes)?;

    let mut manifests = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(current_dir) = queue.pop_front() {
        let mut entries = std::fs::read_dir(&current_dir)?
            .flatten()
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        entries.sort();

        for path in entries {
            let relative_path = path.strip_prefix(root).unwrap_or(&path);

            if exclude_set.is_match(relative_path) {
                continue;
            }

            if path.is_dir() {
                queue.push_back(path);
            } else if path.file_name().is_some_and(|name| name == MODULE_MANIFEST)
                && include_set.is_match(relative_path)
            {
                manifests.push(path);
            }
        }
    }

    let mut discovered = Discovered::default();
    for manifest_path in manifests {
        let bytes = std::fs::read(&manifest_path)?;
        let content = std::str::from_utf8(&bytes).map_err(|e| {
            StackrunError::Config(format!(
                "Module manifest {} is not valid UTF-8: {}",
                manifest_path.display(),
                e
            ))
        })?;
        let config = parse_module_config(content).map_err(|e| {
            StackrunError::Config(format!(
                "Failed to parse module manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        let module_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        debug!(module = %config.name, path = %module_dir.display(), "discovered module");

        let (module, services) = module_from_config(config, module_dir, &bytes);
        discovered.modules.push(module);
        discovered.services.extend(services);
    }

    Ok(discovered)
}

/// Convert a parsed manifest into a module and its services
pub fn module_from_config(
    config: ModuleConfig,
    path: PathBuf,
    manifest_bytes: &[u8],
) -> (Module, Vec<Service>) {
    let services: Vec<Service> = config
        .services
        .into_iter()
        .map(|service| Service {
            version: service_version(manifest_bytes, &service.name),
            stack: service.stack.unwrap_or_else(|| service.name.clone()),
            name: service.name,
            module: config.name.clone(),
            module_type: config.module_type.clone(),
            dependencies: service.dependencies.unwrap_or_default(),
            variables: service.variables.unwrap_or_default(),
        })
        .collect();

    let module = Module {
        name: config.name,
        module_type: config.module_type,
        path,
        description: config.description,
        services: services.iter().map(|s| s.name.clone()).collect(),
    };

    (module, services)
}

/// Fingerprint of a service definition: `v-` plus 12 hex chars of SHA-256
pub fn service_version(manifest_bytes: &[u8], service_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(manifest_bytes);
    hasher.update(service_name.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("v-{}", hex)
}
