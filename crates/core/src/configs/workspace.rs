use std::collections::BTreeMap;
use std::path::{Component, Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{StackrunError, StackrunResult};

/// Module type handled when the workspace config does not name one
pub const DEFAULT_MODULE_TYPE: &str = "pulumi";
/// Executable invoked for a provider without an explicit `command`
pub const DEFAULT_PROVIDER_COMMAND: &str = "pulumi";
/// Concurrency ceiling for a provider without an explicit `concurrency`
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Directory (relative to the workspace root) that holds preview plans
pub const DEFAULT_STAGING_DIR: &str = ".stackrun/plans";

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Module type the stack commands apply to. Defaults to `pulumi`.
    pub module_type: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Glob patterns for paths to include in workspace traversal. If empty or not specified, all paths are included.
    pub includes: Option<Vec<String>>,
    /// Glob patterns for paths to exclude from workspace traversal.
    pub excludes: Option<Vec<String>>,
    /// Where `preview` stores its plans, relative to the workspace root.
    pub staging_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,
    pub module_type: String,
    pub command: Option<String>,
    /// Maximum number of tasks of this provider running at once.
    pub concurrency: Option<usize>,
    pub env: Option<BTreeMap<String, String>>,
}

impl WorkspaceConfig {
    pub fn module_type(&self) -> &str {
        self.module_type.as_deref().unwrap_or(DEFAULT_MODULE_TYPE)
    }

    pub fn staging_dir(&self) -> &str {
        self.staging_dir.as_deref().unwrap_or(DEFAULT_STAGING_DIR)
    }

    /// Find the provider that owns services of the given module type
    pub fn provider_for(&self, module_type: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.module_type == module_type)
    }
}

impl ProviderConfig {
    /// Provider used when the workspace config declares none for a module type
    pub fn implicit(module_type: &str) -> Self {
        Self {
            name: module_type.to_string(),
            module_type: module_type.to_string(),
            command: None,
            concurrency: None,
            env: None,
        }
    }

    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_PROVIDER_COMMAND)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }
}

pub fn parse_workspace_config(yaml_str: &str) -> StackrunResult<WorkspaceConfig> {
    let config: WorkspaceConfig = serde_yaml::from_str(yaml_str)?;

    let mut seen = std::collections::HashSet::new();
    for provider in &config.providers {
        if provider.concurrency == Some(0) {
            return Err(StackrunError::Config(format!(
                "Provider '{}' must allow at least one concurrent task",
                provider.name
            )));
        }
        if !seen.insert(provider.module_type.as_str()) {
            return Err(StackrunError::Config(format!(
                "More than one provider is configured for module type '{}'",
                provider.module_type
            )));
        }
    }

    if let Some(staging_dir) = &config.staging_dir {
        validate_staging_dir(staging_dir)?;
    }

    Ok(config)
}

/// The staging dir must be a relative path strictly below the workspace root.
///
/// `preview` clears it before every run, so it can never be allowed to point
/// at the root itself or anywhere outside it.
pub fn validate_staging_dir(staging_dir: &str) -> StackrunResult<()> {
    let path = Path::new(staging_dir);
    let strictly_below_root = path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !strictly_below_root {
        return Err(StackrunError::Config(format!(
            "Staging directory '{}' must be a relative path inside the workspace (e.g. '{}')",
            staging_dir, DEFAULT_STAGING_DIR
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_providers_with_defaults() {
        let config = parse_workspace_config(
            r#"
name: infra
providers:
  - name: pulumi
    moduleType: pulumi
    concurrency: 2
    env:
      PULUMI_SKIP_UPDATE_CHECK: "true"
"#,
        )
        .unwrap();

        assert_eq!(config.module_type(), "pulumi");
        assert_eq!(config.staging_dir(), DEFAULT_STAGING_DIR);

        let provider = config.provider_for("pulumi").unwrap();
        assert_eq!(provider.concurrency(), 2);
        assert_eq!(provider.command(), "pulumi");
        assert!(config.provider_for("terraform").is_none());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = parse_workspace_config(
            r#"
providers:
  - name: pulumi
    moduleType: pulumi
    concurrency: 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least one concurrent task"));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_workspace_config("plugins: []\n").is_err());
    }

    #[test]
    fn staging_dir_must_stay_inside_the_workspace() {
        for staging_dir in ["\"\"", ".", "./", "..", "../plans", "plans/../..", "/tmp/plans"] {
            let yaml = format!("stagingDir: {}\n", staging_dir);
            let err = parse_workspace_config(&yaml).unwrap_err();
            assert!(matches!(err, StackrunError::Config(_)), "{} was accepted", staging_dir);
        }

        let config = parse_workspace_config("stagingDir: build/plans\n").unwrap();
        assert_eq!(config.staging_dir(), "build/plans");
    }

    #[test]
    fn empty_config_is_valid() {
        let config = parse_workspace_config("{}").unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(ProviderConfig::implicit("pulumi").concurrency(), DEFAULT_CONCURRENCY);
    }
}
