use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{StackrunError, StackrunResult};

/// File name of a module manifest
pub const MODULE_MANIFEST: &str = "stackrun.yml";

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub description: Option<String>,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    /// Stack the external tool operates on. Defaults to the service name.
    pub stack: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub variables: Option<BTreeMap<String, String>>,
}

pub fn parse_module_config(yaml_str: &str) -> StackrunResult<ModuleConfig> {
    let config: ModuleConfig = serde_yaml::from_str(yaml_str)?;
    if config.services.is_empty() {
        return Err(StackrunError::Config(format!(
            "Module '{}' declares no services",
            config.name
        )));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_manifest() {
        let config = parse_module_config(
            r#"
name: platform
type: pulumi
services:
  - name: network
  - name: api
    stack: api-dev
    dependencies: [network]
    variables:
      region: eu-west-1
"#,
        )
        .unwrap();

        assert_eq!(config.module_type, "pulumi");
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].stack.as_deref(), Some("api-dev"));
        assert_eq!(
            config.services[1].dependencies,
            Some(vec!["network".to_string()])
        );
    }

    #[test]
    fn module_without_services_is_rejected() {
        let err = parse_module_config("name: empty\ntype: pulumi\nservices: []\n").unwrap_err();
        assert!(matches!(err, StackrunError::Config(_)));
    }
}
