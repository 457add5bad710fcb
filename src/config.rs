//! Game configuration, optionally loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::solver::SearchConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    pub size: usize,
    pub start_tiles: usize,
    pub win_value: u32,
    /// Seeds the host RNG; also forwarded to the worker on SETUP/RESET.
    pub seed: Option<u64>,
    /// Mirror human moves into the worker's board.
    pub mirror_moves: bool,
    pub solver_timeout_ms: Option<u64>,
    pub autorun_delay_ms: u64,
    /// JSON state file; in-memory storage when unset.
    pub state_path: Option<PathBuf>,
    pub search: SearchConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            size: 4,
            start_tiles: 2,
            win_value: 2048,
            seed: None,
            mirror_moves: true,
            solver_timeout_ms: None,
            autorun_delay_ms: 1,
            state_path: None,
            search: SearchConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size < 2 {
            return Err(ConfigError::Invalid(format!("size must be at least 2, got {}", self.size)));
        }
        if self.start_tiles > self.size * self.size {
            return Err(ConfigError::Invalid(format!(
                "{} start tiles do not fit a {}x{} grid",
                self.start_tiles, self.size, self.size
            )));
        }
        if self.win_value < 4 || !self.win_value.is_power_of_two() {
            return Err(ConfigError::Invalid(format!("win_value {} is not a power of two >= 4", self.win_value)));
        }
        Ok(())
    }

    pub fn solver_timeout(&self) -> Option<Duration> { self.solver_timeout_ms.map(Duration::from_millis) }

    pub fn autorun_delay(&self) -> Duration { Duration::from_millis(self.autorun_delay_ms) }
}
