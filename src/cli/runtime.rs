use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::LogFormat;
use crate::config::Config;

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let (json, human) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Human => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(human)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

/// Where the configuration is read from when `--config` is absent.
pub fn default_config_path() -> Result<PathBuf> {
    // Priority: ./config/tourguide.yaml > <config dir>/tourguide/config.yaml
    let local_config = PathBuf::from("config/tourguide.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("tourguide");
    path.push("config.yaml");
    Ok(path)
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let mut config = read_config_file(&config_path).await?;
    config.apply_env_overrides(|key| env::var(key).ok());
    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}

/// Parse the file at `path`; a missing file yields defaults.
pub async fn read_config_file(path: &Path) -> Result<Config> {
    if fs::try_exists(path).await.unwrap_or(false) {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    } else {
        warn!("Config file not found, using defaults: {}", path.display());
        Ok(Config::default())
    }
}
