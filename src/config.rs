use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Tunables for a refresh, loadable from a TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Ids per store query; bounds payload size only
    pub batch_size: usize,
    /// Minimum similarity (exclusive) for a removed/added pair to count as a rename
    pub similarity_threshold: f64,
    pub detect_renames: bool,
    pub notify: bool,
    /// Prefix for commit URLs handed to notifications and shortlinks
    pub url_prefix: String,
    pub database: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            similarity_threshold: 0.5,
            detect_renames: true,
            notify: true,
            url_prefix: "/".to_string(),
            database: None,
        }
    }
}

impl IndexConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: IndexConfig =
            toml::from_str(text).map_err(|e| IndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IndexError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IndexError::Config("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.similarity_threshold) {
            return Err(IndexError::Config(
                "similarity_threshold must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}
