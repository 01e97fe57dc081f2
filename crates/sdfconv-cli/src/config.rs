//! Configuration loading

use anyhow::Result;
use sdfconv_urdf::ConvertOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub convert: ConvertOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Spaces per nesting level in the written XML (0 for a single line)
    #[serde(default = "default_indent")]
    pub indent: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
        }
    }
}

fn default_indent() -> usize {
    2
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}
