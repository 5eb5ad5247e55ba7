use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("max_trigger_depth must be greater than zero")]
    ZeroTriggerDepth,
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// Driver
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Postgres,
    #[default]
    Sqlite,
}

///
/// EngineConfig
///
/// Runtime knobs of one engine instance, read from an `[engine]` TOML table
/// or built in code.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub driver: Driver,

    /// Recompute stored fields after writes. Turning this off leaves stored
    /// values stale until an explicit recompute.
    pub recompute_stored_fields: bool,

    /// Accept writes to computed fields that declare no inverse method.
    pub permit_missing_inverse: bool,

    /// Bound on nested trigger propagation.
    pub max_trigger_depth: u32,

    /// Emit every statement at debug level on the `tessera::sql` target.
    pub log_sql: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            driver: Driver::default(),
            recompute_stored_fields: true,
            permit_missing_inverse: false,
            max_trigger_depth: 32,
            log_sql: true,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Parse the `[engine]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.engine.validate()?;

        Ok(file.engine)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_trigger_depth == 0 {
            return Err(ConfigError::ZeroTriggerDepth);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config, EngineConfig::default());
        assert!(config.recompute_stored_fields);
        assert_eq!(config.max_trigger_depth, 32);
    }

    #[test]
    fn engine_table_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
[engine]
driver = "postgres"
permit_missing_inverse = true
max_trigger_depth = 4
"#,
        )
        .expect("engine table should parse");

        assert_eq!(config.driver, Driver::Postgres);
        assert!(config.permit_missing_inverse);
        assert_eq!(config.max_trigger_depth, 4);
        assert!(config.log_sql);
    }

    #[test]
    fn zero_trigger_depth_is_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nmax_trigger_depth = 0\n")
            .expect_err("zero depth must fail");

        assert!(matches!(err, ConfigError::ZeroTriggerDepth));
        assert_eq!(InternalError::from(err).class, ErrorClass::Config);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nlog_everything = true\n")
            .expect_err("unknown key must fail");

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
