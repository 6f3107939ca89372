//! Engine and reader configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Control mode requested for the first entity of the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedControl {
    /// Keep whatever the document says.
    #[default]
    ByScenario,
    Internal,
    External,
    /// External entity plus an internally driven `<name>_ghost`.
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub control: RequestedControl,
    /// Seed for picking fallback vehicle models.
    pub fallback_seed: u64,
    /// Number of generic vehicle models a fallback vehicle may use.
    pub fallback_model_count: u32,
    /// Searched after the document's own catalog locations.
    pub catalog_dirs: Vec<PathBuf>,
    /// Upper bound for a single step, in seconds.
    pub max_step: f64,
    /// Lower bound for a non-zero step, in seconds.
    pub min_step: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control: RequestedControl::ByScenario,
            fallback_seed: 0,
            fallback_model_count: 10,
            catalog_dirs: Vec::new(),
            max_step: 0.1,
            min_step: 0.0,
        }
    }
}

impl EngineConfig {
    /// Clamp a requested step. A zero step (init only) is never inflated.
    pub fn clamp_step(&self, dt: f64) -> f64 {
        if dt <= 0.0 {
            0.0
        } else {
            dt.min(self.max_step).max(self.min_step)
        }
    }
}
