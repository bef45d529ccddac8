//! Engine configuration, read from a TOML file.
//!
//! Every section and field has a default, so an empty file (or no file at all)
//! yields a local-only engine with an in-memory store.

use crate::external_tool::ExternalToolConfig;
use crate::pipeline::PipelineConfig;
use crate::remote::RemoteConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "aqua_lens.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AquaLensConfig {
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub external_tool: ExternalToolConfig,
}

impl AquaLensConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: AquaLensConfig = toml::from_str(&content)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path`, or falls back to defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from_path(path).unwrap_or_else(|e| {
            tracing::warn!("Config {} not usable, using defaults: {}", path.display(), e);
            AquaLensConfig::default()
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AquaLensConfig = toml::from_str("").unwrap();
        assert_eq!(config, AquaLensConfig::default());
        assert_eq!(config.pipeline.max_edge, 512);
        assert!(!config.remote.enabled);
        assert!(config.store.database_path.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: AquaLensConfig = toml::from_str(
            r#"
            [pipeline]
            seed = 42

            [remote]
            enabled = true
            base_url = "http://analyzer.local:5000"

            [store]
            database_path = "/var/lib/aqua/results.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.seed, Some(42));
        assert_eq!(config.pipeline.max_edge, 512);
        assert!(config.remote.enabled);
        assert_eq!(config.remote.timeout_secs, 30);
        assert_eq!(
            config.store.database_path.as_deref(),
            Some(Path::new("/var/lib/aqua/results.db"))
        );
        assert!(!config.external_tool.enabled);
    }

    #[test]
    fn load_or_default_survives_bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pipeline = 3").unwrap();
        assert!(matches!(
            AquaLensConfig::load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(AquaLensConfig::load_or_default(file.path()), AquaLensConfig::default());
        assert_eq!(
            AquaLensConfig::load_or_default(Path::new("/nonexistent/aqua_lens.toml")),
            AquaLensConfig::default()
        );
    }

    #[test]
    fn rendered_config_parses_back() {
        let mut config = AquaLensConfig::default();
        config.external_tool.enabled = true;
        config.pipeline.seed = Some(7);
        let rendered = config.to_toml().unwrap();
        let parsed: AquaLensConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
