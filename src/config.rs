use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/health.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Operator timezone override, `UTC±H[:MM]`.
    #[serde(default)]
    pub utc_offset: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_interval: default_progress_interval(),
            utc_offset: None,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_progress_interval() -> u64 {
    100_000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.import.batch_size == 0 {
        anyhow::bail!("import.batch_size must be > 0");
    }

    if config.import.progress_interval == 0 {
        anyhow::bail!("import.progress_interval must be > 0");
    }

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    // A malformed utc_offset is not rejected here: the resolver logs it and
    // falls back to the host timezone.
    Ok(())
}
