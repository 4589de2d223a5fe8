use crate::errors::OptimizerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    O3,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O2
    }
}

/// Switches for the individual call-site rewrites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevirtualizationOptions {
    /// Turn super calls into virtual calls when both reach the same method (default: true)
    #[serde(default = "default_true")]
    pub enable_super_to_virtual: bool,

    /// Rebind virtual calls to the most specific declaration (default: true)
    #[serde(default = "default_true")]
    pub enable_virtual_rebinding: bool,

    /// Turn interface calls with a single class target into virtual calls (default: true)
    #[serde(default = "default_true")]
    pub enable_interface_devirtualization: bool,

    /// Re-narrow the types of affected values after each method (default: true)
    #[serde(default = "default_true")]
    pub narrow_affected_types: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DevirtualizationOptions {
    fn default() -> Self {
        Self {
            enable_super_to_virtual: true,
            enable_virtual_rebinding: true,
            enable_interface_devirtualization: true,
            narrow_affected_types: true,
        }
    }
}

/// Main optimizer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    #[serde(default)]
    pub optimization_level: OptimizationLevel,

    #[serde(default)]
    pub devirtualization: DevirtualizationOptions,

    /// Worker threads for the parallel phase; the global pool when unset
    #[serde(default)]
    pub threads: Option<usize>,
}

impl OptimizerConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self, OptimizerError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| OptimizerError::Config(e.to_string())),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, OptimizerError> {
        serde_json::from_str(content).map_err(|e| OptimizerError::Config(e.to_string()))
    }

    /// Create a default configuration and write it to a file
    pub fn init_file(path: &Path) -> Result<(), OptimizerError> {
        let config = OptimizerConfig::default();
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| OptimizerError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert_eq!(config.optimization_level, OptimizationLevel::O2);
        assert!(config.devirtualization.enable_interface_devirtualization);
        assert!(config.devirtualization.narrow_affected_types);
        assert_eq!(config.threads, None);
    }

    #[test]
    fn test_serialize_config() {
        let json = serde_json::to_string(&OptimizerConfig::default()).unwrap();
        assert!(json.contains("optimizationLevel"));
        assert!(json.contains("enableSuperToVirtual"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "optimizationLevel": "O3",
            "devirtualization": { "enableVirtualRebinding": false },
            "threads": 2
        }"#;
        let config = OptimizerConfig::from_json_str(json).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O3);
        assert!(!config.devirtualization.enable_virtual_rebinding);
        assert!(config.devirtualization.enable_super_to_virtual);
        assert_eq!(config.threads, Some(2));
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let result = OptimizerConfig::from_json_str(r#"{ "optimizationLevel": "O9" }"#);
        assert!(matches!(result, Err(OptimizerError::Config(_))));
    }

    #[test]
    fn test_yaml_file_and_init_file() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("rebind.yaml");
        std::fs::write(&yaml, "optimizationLevel: O1\ndevirtualization:\n  narrowAffectedTypes: false\n").unwrap();
        let config = OptimizerConfig::from_file(&yaml).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O1);
        assert!(!config.devirtualization.narrow_affected_types);

        let json = dir.path().join("rebind.json");
        OptimizerConfig::init_file(&json).unwrap();
        assert_eq!(OptimizerConfig::from_file(&json).unwrap(), OptimizerConfig::default());
    }
}
