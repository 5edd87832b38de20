//! Configuration for the prefetch pipeline
//!
//! Settings can be loaded from a TOML (or JSON) file and overridden from the
//! environment:
//!
//! - `TENSOR_PREFETCH_ENABLE` - any value other than `0` enables prefetching
//! - `TENSOR_PREFETCH_DEPTH` - number of bundles cycling through the pipeline
//! - `TENSOR_PREFETCH_LOG_COPIES` - any value other than `0` logs every staged bundle
//!
//! # Example
//!
//! ```ignore
//! use tensor_prefetch::config::PrefetchConfig;
//!
//! let mut config = PrefetchConfig::load("prefetch.toml")?;
//! config.apply_env_overrides()?;
//! config.validate()?;
//! ```

use crate::error::{PrefetchError, Result};
use crate::pipeline::PrefetcherOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Enables prefetching when set to a value other than `0`
pub const ENV_ENABLE: &str = "TENSOR_PREFETCH_ENABLE";

/// Overrides the buffer depth
pub const ENV_DEPTH: &str = "TENSOR_PREFETCH_DEPTH";

/// Enables per-bundle copy logging when set to a value other than `0`
pub const ENV_LOG_COPIES: &str = "TENSOR_PREFETCH_LOG_COPIES";

/// Prefetch pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Whether inputs are staged by a prefetcher thread
    pub enabled: bool,

    /// Number of bundles cycling through the pipeline
    pub buffer_depth: usize,

    /// Log every staged bundle
    pub log_tensor_copies: bool,

    /// Backend the compiled subgraphs run on
    pub backend_name: String,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_depth: 2,
            log_tensor_copies: false,
            backend_name: "CPU".to_string(),
        }
    }
}

impl PrefetchConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as TOML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| PrefetchError::Serialization(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| PrefetchError::Serialization(e.to_string()))?
        };

        tracing::info!("Loaded prefetch config from {:?}", path);
        Ok(config)
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PrefetchError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Apply `TENSOR_PREFETCH_*` environment variables on top of this config
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ENV_ENABLE) {
            self.enabled = flag_enabled(&value);
        }
        if let Ok(value) = std::env::var(ENV_DEPTH) {
            self.buffer_depth = value.trim().parse().map_err(|_| {
                PrefetchError::Config(format!("{} must be a positive integer, got {:?}", ENV_DEPTH, value))
            })?;
        }
        if let Ok(value) = std::env::var(ENV_LOG_COPIES) {
            self.log_tensor_copies = flag_enabled(&value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_depth == 0 {
            return Err(PrefetchError::Config(
                "buffer_depth must be at least 1".to_string(),
            ));
        }
        if self.backend_name.trim().is_empty() {
            return Err(PrefetchError::Config("backend_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Options for the prefetcher thread derived from this config
    pub fn prefetcher_options(&self) -> PrefetcherOptions {
        PrefetcherOptions {
            log_tensor_copies: self.log_tensor_copies,
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_ENABLE);
        std::env::remove_var(ENV_DEPTH);
        std::env::remove_var(ENV_LOG_COPIES);
    }

    #[test]
    fn test_defaults() {
        let config = PrefetchConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.buffer_depth, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefetch.toml");

        let config = PrefetchConfig {
            enabled: true,
            buffer_depth: 3,
            log_tensor_copies: true,
            backend_name: "GPU".to_string(),
        };
        config.save(&path).unwrap();
        assert_eq!(PrefetchConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("prefetch.toml");
        std::fs::write(&toml_path, "enabled = true\n").unwrap();
        let config = PrefetchConfig::load(&toml_path).unwrap();
        assert!(config.enabled);
        assert_eq!(config.buffer_depth, 2);

        let json_path = dir.path().join("prefetch.json");
        std::fs::write(&json_path, r#"{"buffer_depth": 5}"#).unwrap();
        let config = PrefetchConfig::load(&json_path).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.buffer_depth, 5);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PrefetchConfig::load(dir.path().join("missing.toml")),
            Err(PrefetchError::Io(_))
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "buffer_depth = \"two\"").unwrap();
        assert!(matches!(
            PrefetchConfig::load(&bad),
            Err(PrefetchError::Serialization(_))
        ));
    }

    #[test]
    fn test_validate() {
        let config = PrefetchConfig {
            buffer_depth: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PrefetchError::Config(_))));

        let config = PrefetchConfig {
            backend_name: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var(ENV_ENABLE, "1");
        std::env::set_var(ENV_DEPTH, " 4 ");
        std::env::set_var(ENV_LOG_COPIES, "0");

        let config = PrefetchConfig::from_env().unwrap();
        assert!(config.enabled);
        assert_eq!(config.buffer_depth, 4);
        assert!(!config.log_tensor_copies);
        assert!(!config.prefetcher_options().log_tensor_copies);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_disable_and_bad_depth() {
        clear_env();
        std::env::set_var(ENV_ENABLE, "0");
        let mut config = PrefetchConfig {
            enabled: true,
            ..Default::default()
        };
        config.apply_env_overrides().unwrap();
        assert!(!config.enabled);

        std::env::set_var(ENV_DEPTH, "deep");
        assert!(matches!(
            PrefetchConfig::from_env(),
            Err(PrefetchError::Config(_))
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_no_env_keeps_defaults() {
        clear_env();
        assert_eq!(PrefetchConfig::from_env().unwrap(), PrefetchConfig::default());
    }
}
