//! Rows of a precomputed Monte Carlo results table.

use dl_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One estimate from one simulated sample under one modeling choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    /// Simulation run identifier.
    pub run: u32,
    /// Model type (e.g. `classic`, `twfe`).
    pub model: String,
    /// Clustering scheme (e.g. `none`, `firm`, `country`).
    pub cluster: String,
    /// Winsorization level (e.g. `none`, `1%`).
    pub winsorize: String,
    /// Effect injected into the simulated data.
    pub true_effect: f64,
    /// Estimated treatment coefficient.
    pub estimate: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
}

impl SimulationRow {
    /// Estimate and bounds are finite and ordered.
    pub fn validate(&self) -> Result<()> {
        if !(self.true_effect.is_finite()
            && self.estimate.is_finite()
            && self.ci_lower.is_finite()
            && self.ci_upper.is_finite())
        {
            return Err(Error::Data(format!(
                "simulation run {} ({}/{}/{}) has non-finite values",
                self.run, self.model, self.cluster, self.winsorize
            )));
        }
        if self.ci_lower > self.ci_upper {
            return Err(Error::Data(format!(
                "simulation run {} ({}/{}/{}) has ci_lower > ci_upper",
                self.run, self.model, self.cluster, self.winsorize
            )));
        }
        Ok(())
    }

    /// Interval lies entirely above zero.
    pub fn rejects_zero_positive(&self) -> bool {
        self.ci_lower > 0.0
    }

    /// Interval does not contain the injected effect.
    pub fn excludes_true_effect(&self) -> bool {
        self.true_effect < self.ci_lower || self.true_effect > self.ci_upper
    }
}
