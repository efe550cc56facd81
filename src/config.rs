//! Engine configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (doctypes.toml)
//! - Environment variables (DOCTYPES__*)
//!
//! ## Example config file (doctypes.toml):
//! ```toml
//! [compiler]
//! context_variable = "d"
//!
//! [compiler.aux]
//! asOf = "datetime"
//! tenant = "string"
//!
//! [codec]
//! pretty = false
//!
//! [registry]
//! prewarm = ["schemas/person.json", "schemas/invoice.json"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::compiler::DEFAULT_CONTEXT_VARIABLE;
use crate::error::{Result, SchemaError};
use crate::vocabulary::FieldKind;

/// Main configuration for the document type engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rule/formula compiler settings
    #[serde(default)]
    pub compiler: CompilerSettings,

    /// Body codec settings
    #[serde(default)]
    pub codec: CodecSettings,

    /// Registry settings
    #[serde(default)]
    pub registry: RegistrySettings,
}

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerSettings {
    /// Name under which expressions see the body
    #[serde(default = "default_context_variable")]
    pub context_variable: String,

    /// Auxiliary context entries: name → vocabulary type name
    #[serde(default)]
    pub aux: BTreeMap<String, String>,
}

/// Codec configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecSettings {
    /// Pretty-print stored JSON payloads
    #[serde(default)]
    pub pretty: bool,
}

/// Registry configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Schema definition files to compile at startup
    #[serde(default)]
    pub prewarm: Vec<PathBuf>,
}

fn default_context_variable() -> String {
    DEFAULT_CONTEXT_VARIABLE.to_string()
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            context_variable: default_context_variable(),
            aux: BTreeMap::new(),
        }
    }
}

impl CompilerSettings {
    /// Resolve the auxiliary type names against the field vocabulary
    pub fn aux_kinds(&self) -> Result<BTreeMap<String, FieldKind>> {
        self.aux
            .iter()
            .map(|(name, type_name)| {
                FieldKind::parse(type_name)
                    .map(|kind| (name.clone(), kind))
                    .ok_or_else(|| {
                        SchemaError::InvalidConfig(format!(
                            "auxiliary context '{}' has unknown type '{}'",
                            name, type_name
                        ))
                    })
            })
            .collect()
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["doctypes.toml", ".doctypes.toml", "config/doctypes.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "doctypes") {
            let xdg_config = config_dir.config_dir().join("doctypes.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // DOCTYPES__COMPILER__CONTEXT_VARIABLE=doc
        builder = builder.add_source(
            Environment::with_prefix("DOCTYPES")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::ScalarKind;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.compiler.context_variable, "d");
        assert!(config.compiler.aux.is_empty());
        assert!(!config.codec.pretty);
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[compiler]"));
        assert!(toml_str.contains("[codec]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
[compiler]
context_variable = "doc"

[compiler.aux]
as_of = "DateTime"
codes = "list<int>"

[codec]
pretty = true
"#,
        )
        .unwrap();

        let config = EngineConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.compiler.context_variable, "doc");
        assert!(config.codec.pretty);

        let kinds = config.compiler.aux_kinds().unwrap();
        assert_eq!(kinds["as_of"], FieldKind::DATETIME);
        assert_eq!(kinds["codes"], FieldKind::List(ScalarKind::Integer));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = EngineConfig::default();
        config.compiler.aux.insert("tenant".into(), "string".into());
        config.registry.prewarm.push(PathBuf::from("schemas/person.json"));
        config.save(&path).unwrap();

        let loaded = EngineConfig::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.compiler.aux.get("tenant").map(String::as_str), Some("string"));
        assert_eq!(loaded.registry.prewarm, vec![PathBuf::from("schemas/person.json")]);
    }

    #[test]
    fn test_unknown_aux_type() {
        let mut settings = CompilerSettings::default();
        settings.aux.insert("when".into(), "moment".into());
        assert!(matches!(settings.aux_kinds(), Err(SchemaError::InvalidConfig(_))));
    }
}
