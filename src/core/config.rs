use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub name: String,
    pub description: String,
}

/// Baseline values modules pick up for their `THREADS` and `TIMEOUT`
/// option defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    pub default_threads: usize,
    pub default_timeout_seconds: u64,
}

impl Config {
    /// Load config from file, or use defaults if file doesn't exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Load config from file (fails if file doesn't exist)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig {
                name: "Pocket Project".to_string(),
                description: "Exploit module workspace".to_string(),
            },
            modules: ModulesConfig {
                default_threads: 10,
                default_timeout_seconds: 10,
            },
        }
    }
}
