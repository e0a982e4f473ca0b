//! Simulation configuration, loadable from TOML.

use gridworks_core::geometry::Size;
use gridworks_core::grid::{MAX_GRID_CELLS, size_fits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 256;

/// Longest accepted minimum tick interval, in milliseconds.
pub const MAX_INTERVAL_MS: u64 = 60_000;

// ===========================================================================
// IterationMode
// ===========================================================================

/// How a tick picks the cells it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    /// Every model cell and every cargo gets both the cycle and the move
    /// hook.
    #[default]
    FullScan,
    /// Only cells woken in the process tab cycle, and only started cells
    /// move.
    ActiveSet,
}

// ===========================================================================
// SimulationConfig
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Size of the worker pool including the driver thread. `None` uses the
    /// available parallelism.
    pub workers: Option<usize>,
    /// Ticks start no closer together than this.
    pub min_interval_ms: u64,
    pub iteration: IterationMode,
    pub model_name: String,
    pub model_size: Size,
    pub bank_name: String,
    pub bank_size: Size,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: None,
            min_interval_ms: 10,
            iteration: IterationMode::FullScan,
            model_name: "main".to_string(),
            model_size: Size::new(16, 16),
            bank_name: "bank".to_string(),
            bank_size: Size::new(4, 4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Toml(String),
    #[error("cannot read {}: {detail}", path.display())]
    Io { path: PathBuf, detail: String },
    #[error("worker count {0} outside 1..={MAX_WORKERS}")]
    InvalidWorkers(usize),
    #[error("minimum interval {0}ms exceeds {MAX_INTERVAL_MS}ms")]
    InvalidInterval(u64),
    #[error("a {0} grid exceeds {MAX_GRID_CELLS} cells")]
    InvalidGridSize(Size),
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(text).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(n) = self.workers {
            if n == 0 || n > MAX_WORKERS {
                return Err(ConfigError::InvalidWorkers(n));
            }
        }
        if self.min_interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::InvalidInterval(self.min_interval_ms));
        }
        for size in [self.model_size, self.bank_size] {
            if !size_fits(size) {
                return Err(ConfigError::InvalidGridSize(size));
            }
        }
        Ok(())
    }

    /// Resolve the worker count, falling back to the available parallelism.
    pub fn resolved_workers(&self) -> usize {
        match self.workers {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_WORKERS),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}
