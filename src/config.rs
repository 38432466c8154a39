//! Pipeline configuration.
//!
//! All tunables live in one TOML file and are passed explicitly to the
//! operations that need them. Nothing reads configuration from globals or
//! the environment. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration.
//!
//! ```toml
//! cache_root = "/var/lib/rollscan"
//!
//! [display]
//! target_width = 1920
//! quality = 85
//!
//! [thumbnails]
//! edge = 300
//! quality = 80
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root directory for derived images and thumbnails.
    pub cache_root: PathBuf,
    pub display: DisplayConfig,
    pub thumbnails: ThumbnailConfig,
}

/// Display rendition settings. Sources narrower than `target_width` are
/// never upscaled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub target_width: u32,
    pub quality: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    /// Square edge length in pixels.
    pub edge: u32,
    pub quality: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            display: DisplayConfig::default(),
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target_width: 1920,
            quality: 85,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            edge: 300,
            quality: 80,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, or defaults when the path does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache_root must not be empty".into()));
        }
        if self.display.target_width == 0 {
            return Err(ConfigError::Invalid(
                "display.target_width must be positive".into(),
            ));
        }
        if self.thumbnails.edge == 0 {
            return Err(ConfigError::Invalid(
                "thumbnails.edge must be positive".into(),
            ));
        }
        for (name, q) in [
            ("display.quality", self.display.quality),
            ("thumbnails.quality", self.thumbnails.quality),
        ] {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and 100, got {q}"
                )));
            }
        }
        Ok(())
    }

    /// Directory holding derived display images and the per-roll index.
    pub fn derived_dir(&self) -> PathBuf {
        self.cache_root.join("derived")
    }

    /// Directory holding thumbnail files.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.cache_root.join("thumbnails")
    }

    /// A commented starter config with every default spelled out.
    pub fn starter_toml() -> String {
        let config = Self::default();
        // Serialization of defaults cannot fail
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
