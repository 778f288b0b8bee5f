//! Event-study confidence bands drawn around the treated group's mean.
//!
//! The event study omits its reference period; plotting needs the full
//! chronological sequence, so the reference is put back with a degenerate
//! `(0, 0)` interval. Each interval's half-width is then centred on the
//! treated group's mean outcome in the matching calendar year.

use std::collections::BTreeMap;

use dl_core::{Error, Result};
use dl_inference::EventStudyEstimate;
use dl_panel::GroupMean;
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Interval for one event period, as reported by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodInterval {
    /// Years relative to treatment start.
    pub period: i64,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl PeriodInterval {
    /// Half-width: `upper − (upper + lower) / 2`.
    pub fn delta(&self) -> f64 {
        self.upper - (self.upper + self.lower) / 2.0
    }
}

/// Insert the reference period with `(0, 0)` at its chronological position.
///
/// Fails if the reference period is already present or a period repeats.
pub fn reconstruct_intervals(
    intervals: &[PeriodInterval],
    reference_period: i64,
) -> Result<Vec<PeriodInterval>> {
    let mut by_period: BTreeMap<i64, PeriodInterval> = BTreeMap::new();
    for iv in intervals {
        if iv.period == reference_period {
            return Err(Error::Validation(format!(
                "reference period {reference_period} already has an interval"
            )));
        }
        if by_period.insert(iv.period, *iv).is_some() {
            return Err(Error::Validation(format!("period {} appears twice", iv.period)));
        }
    }
    by_period.insert(reference_period, PeriodInterval { period: reference_period, lower: 0.0, upper: 0.0 });
    Ok(by_period.into_values().collect())
}

/// One (year, group) row of the parallel-trends plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBandRow {
    /// Calendar year.
    pub year: i32,
    /// `year − start_year`.
    pub period: i64,
    /// Treatment group.
    pub treated_country: bool,
    /// Group mean outcome.
    pub mean: f64,
    /// Interval half-width (treated rows with an estimated period only).
    pub delta: Option<f64>,
    /// `mean − delta`.
    pub band_lower: Option<f64>,
    /// `mean + delta`.
    pub band_upper: Option<f64>,
}

/// Attach bands to group means. Treated rows whose period has an interval
/// get `[mean − delta, mean + delta]`; control rows never get a band.
pub fn band_rows(
    intervals: &[PeriodInterval],
    group_means: &[GroupMean],
    start_year: i32,
) -> Vec<TrendBandRow> {
    let by_period: BTreeMap<i64, &PeriodInterval> = intervals.iter().map(|iv| (iv.period, iv)).collect();
    group_means
        .iter()
        .map(|g| {
            let period = i64::from(g.year) - i64::from(start_year);
            let delta = if g.treated_country { by_period.get(&period).map(|iv| iv.delta()) } else { None };
            TrendBandRow {
                year: g.year,
                period,
                treated_country: g.treated_country,
                mean: g.mean,
                delta,
                band_lower: delta.map(|d| g.mean - d),
                band_upper: delta.map(|d| g.mean + d),
            }
        })
        .collect()
}

/// Plot-friendly event-study coefficients, reference period included.
#[derive(Debug, Clone, Serialize)]
pub struct EventStudyArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Outcome column.
    pub outcome: String,
    /// Clustering scheme.
    pub cluster: String,
    /// Omitted period.
    pub reference_period: i64,
    /// Calendar year of period 0.
    pub start_year: i32,
    /// Confidence level of the intervals.
    pub conf_level: f64,
    /// Observations used.
    pub n_obs: usize,
    /// Periods, ascending.
    pub periods: Vec<i64>,
    /// `start_year + period`.
    pub years: Vec<i32>,
    /// Point estimates (0 at the reference).
    pub estimates: Vec<f64>,
    /// Lower bounds.
    pub ci_lower: Vec<f64>,
    /// Upper bounds.
    pub ci_upper: Vec<f64>,
    /// Half-widths.
    pub delta: Vec<f64>,
}

/// Event-study intervals as [`PeriodInterval`]s (reference excluded).
pub fn intervals_of(es: &EventStudyEstimate) -> Vec<PeriodInterval> {
    es.coefficients
        .iter()
        .map(|c| PeriodInterval { period: c.period, lower: c.ci_lower, upper: c.ci_upper })
        .collect()
}

/// Build the event-study artifact.
pub fn event_study_artifact(es: &EventStudyEstimate) -> Result<EventStudyArtifact> {
    let full = reconstruct_intervals(&intervals_of(es), es.reference_period)?;
    let estimate_of: BTreeMap<i64, f64> = es.coefficients.iter().map(|c| (c.period, c.estimate)).collect();

    let n = full.len();
    let mut periods = Vec::with_capacity(n);
    let mut years = Vec::with_capacity(n);
    let mut estimates = Vec::with_capacity(n);
    let mut ci_lower = Vec::with_capacity(n);
    let mut ci_upper = Vec::with_capacity(n);
    let mut delta = Vec::with_capacity(n);
    for iv in &full {
        periods.push(iv.period);
        years.push(period_year(es.start_year, iv.period)?);
        estimates.push(estimate_of.get(&iv.period).copied().unwrap_or(0.0));
        ci_lower.push(iv.lower);
        ci_upper.push(iv.upper);
        delta.push(iv.delta());
    }

    Ok(EventStudyArtifact {
        schema_version: "didlab_event_study_v0".to_string(),
        meta: ArtifactMeta::now()?,
        outcome: es.outcome.to_string(),
        cluster: es.cluster.to_string(),
        reference_period: es.reference_period,
        start_year: es.start_year,
        conf_level: es.conf_level,
        n_obs: es.n_obs,
        periods,
        years,
        estimates,
        ci_lower,
        ci_upper,
        delta,
    })
}

/// Parallel-trends artifact: group means with event-study bands.
#[derive(Debug, Clone, Serialize)]
pub struct TrendsArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Outcome column.
    pub outcome: String,
    /// Treatment start year.
    pub start_year: i32,
    /// Omitted period, if bands are attached.
    pub reference_period: Option<i64>,
    /// One row per (year, group), control before treated.
    pub rows: Vec<TrendBandRow>,
}

/// Build the trends artifact. Without an event study the rows carry no band.
pub fn trends_artifact(
    outcome: &str,
    group_means: &[GroupMean],
    start_year: i32,
    event_study: Option<&EventStudyEstimate>,
) -> Result<TrendsArtifact> {
    let (rows, reference_period) = match event_study {
        Some(es) => {
            let full = reconstruct_intervals(&intervals_of(es), es.reference_period)?;
            (band_rows(&full, group_means, start_year), Some(es.reference_period))
        }
        None => (band_rows(&[], group_means, start_year), None),
    };
    Ok(TrendsArtifact {
        schema_version: "didlab_trends_v0".to_string(),
        meta: ArtifactMeta::now()?,
        outcome: outcome.to_string(),
        start_year,
        reference_period,
        rows,
    })
}

fn period_year(start_year: i32, period: i64) -> Result<i32> {
    i32::try_from(i64::from(start_year) + period)
        .map_err(|_| Error::Validation(format!("period {period} out of calendar range")))
}
