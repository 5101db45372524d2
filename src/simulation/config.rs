// src/simulation/config.rs

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// How the nodes of one level are evaluated within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    #[default]
    Sequential,
    /// Evaluate a level's nodes on the rayon thread pool.
    Rayon,
}

/// Run parameters. Load from TOML with [`SimulationConfig::from_toml_file`]
/// or start from `Default` and adjust with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of periods to simulate.
    pub num_periods: usize,
    /// Seed for the single run RNG.
    pub seed: u64,
    pub concurrency: ConcurrencyMode,
    /// Log progress every this many periods; 0 disables it.
    pub progress_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_periods: 100,
            seed: 42,
            concurrency: ConcurrencyMode::Sequential,
            progress_interval: 100,
        }
    }
}

impl SimulationConfig {
    pub fn with_periods(mut self, num_periods: usize) -> Self {
        self.num_periods = num_periods;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
