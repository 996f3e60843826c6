//! Config file parsing for `~/.config/mediashelf/config.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root; defaults to the platform cache dir + "mediashelf".
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip dot-prefixed children while scanning.
    #[serde(default = "default_true")]
    pub skip_hidden: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { skip_hidden: true }
    }
}

/// Load config from the default path. Any read or parse failure falls back
/// to defaults.
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    toml::from_str(&content).unwrap_or_default()
}

/// Default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("mediashelf");
        p.push("config.toml");
        p
    })
}

/// Resolve the cache root: configured dir, else platform cache dir, else a
/// local fallback.
pub fn cache_dir(cfg: &AppConfig) -> PathBuf {
    if let Some(dir) = &cfg.cache.dir {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .map(|mut p| {
            p.push("mediashelf");
            p
        })
        .unwrap_or_else(|| PathBuf::from(".mediashelf-cache"))
}
