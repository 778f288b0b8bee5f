//! Summaries of a precomputed Monte Carlo results table.
//!
//! Rows are grouped by (model, true effect, clustering, winsorization); each
//! group reports the sampling distribution of the estimate and two rejection
//! rates computed from the stored confidence intervals.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dl_core::{Error, Result};
use dl_panel::SimulationRow;
use dl_panel::stats::{mean, sample_sd};
use serde::Serialize;

/// Aggregate over all runs of one modeling choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    /// Model type.
    pub model: String,
    /// Injected effect.
    pub true_effect: f64,
    /// Clustering scheme.
    pub cluster: String,
    /// Winsorization level.
    pub winsorize: String,
    /// Number of runs.
    pub n_runs: usize,
    /// Mean estimate.
    pub mean_estimate: f64,
    /// Sample standard deviation of the estimate (NaN for a single run).
    pub sd_estimate: f64,
    /// `mean_estimate − true_effect`.
    pub bias: f64,
    /// Root mean squared error against the true effect.
    pub rmse: f64,
    /// Share of runs whose interval lies above zero.
    pub power: f64,
    /// Share of runs whose interval excludes the true effect.
    pub type1_error: f64,
}

/// Total order on `f64` keys; rows are validated finite first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EffectKey(f64);

impl EffectKey {
    /// `-0.0` and `0.0` map to the same key.
    fn new(x: f64) -> Self {
        Self(x + 0.0)
    }
}

impl Eq for EffectKey {}

impl PartialOrd for EffectKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EffectKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Group and summarize simulation rows, sorted by model, true effect,
/// clustering scheme and winsorization level.
pub fn summarize_simulation(rows: &[SimulationRow]) -> Result<Vec<SimulationSummary>> {
    if rows.is_empty() {
        return Err(Error::Data("simulation table is empty".into()));
    }
    let mut groups: BTreeMap<(&str, EffectKey, &str, &str), Vec<&SimulationRow>> = BTreeMap::new();
    for r in rows {
        r.validate()?;
        groups
            .entry((r.model.as_str(), EffectKey::new(r.true_effect), r.cluster.as_str(), r.winsorize.as_str()))
            .or_default()
            .push(r);
    }

    let out: Vec<SimulationSummary> = groups
        .into_iter()
        .map(|((model, effect, cluster, winsorize), runs)| {
            let true_effect = effect.0;
            let n = runs.len() as f64;
            let estimates: Vec<f64> = runs.iter().map(|r| r.estimate).collect();
            let mean_estimate = mean(&estimates);
            let mse = estimates.iter().map(|e| (e - true_effect).powi(2)).sum::<f64>() / n;
            SimulationSummary {
                model: model.to_string(),
                true_effect,
                cluster: cluster.to_string(),
                winsorize: winsorize.to_string(),
                n_runs: runs.len(),
                mean_estimate,
                sd_estimate: sample_sd(&estimates),
                bias: mean_estimate - true_effect,
                rmse: mse.sqrt(),
                power: runs.iter().filter(|r| r.rejects_zero_positive()).count() as f64 / n,
                type1_error: runs.iter().filter(|r| r.excludes_true_effect()).count() as f64 / n,
            }
        })
        .collect();

    tracing::info!(rows = rows.len(), groups = out.len(), "summarized simulation results");
    Ok(out)
}
