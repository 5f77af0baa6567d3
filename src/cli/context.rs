use std::path::{Path, PathBuf};
use std::sync::Arc;

use tourguide_core_types::PlaybackConfig;

use crate::config::Config;

pub struct CliContext {
    config: Arc<Config>,
    config_path: PathBuf,
    playback: Arc<PlaybackConfig>,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        Self {
            playback: Arc::new(config.playback.clone()),
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Shared engine tunables handed to every component.
    pub fn playback_config(&self) -> Arc<PlaybackConfig> {
        self.playback.clone()
    }
}
