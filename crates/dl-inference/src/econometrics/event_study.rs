//! Event study: leads and lags around treatment onset with two-way FE.
//!
//! Estimates `y = α_firm + λ_year + Σ_k δ_k · 1{treated_country ∧ t − t* = k} + ε`
//! for every observed offset `k` except the reference period. Offsets outside
//! the optional window get no dummy and pool with the reference.

use std::collections::BTreeSet;

use dl_core::{Error, RegressionEngine, RegressionProblem, Result, DEFAULT_CONF_LEVEL};
use dl_panel::{NumericColumn, Panel, TreatmentAssignment};
use serde::Serialize;

use super::did::ClusterScheme;

/// Default omitted period.
pub const DEFAULT_REFERENCE_PERIOD: i64 = -1;

/// Event-study configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventStudySpec {
    /// Outcome column.
    pub outcome: NumericColumn,
    /// Standard-error clustering.
    pub cluster: ClusterScheme,
    /// Omitted period.
    pub reference_period: i64,
    /// Inclusive `(min, max)` offsets that get their own dummy.
    pub window: Option<(i64, i64)>,
    /// Confidence level.
    pub conf_level: f64,
}

impl EventStudySpec {
    /// Firm-clustered, reference `-1`, no window, 95% intervals.
    pub fn new(outcome: NumericColumn) -> Self {
        Self {
            outcome,
            cluster: ClusterScheme::Firm,
            reference_period: DEFAULT_REFERENCE_PERIOD,
            window: None,
            conf_level: DEFAULT_CONF_LEVEL,
        }
    }
}

/// One lead/lag coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStudyCoefficient {
    /// Years relative to treatment start.
    pub period: i64,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error.
    pub std_error: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
}

/// Fitted event study. `coefficients` excludes the reference period.
#[derive(Debug, Clone, Serialize)]
pub struct EventStudyEstimate {
    /// Outcome column.
    pub outcome: NumericColumn,
    /// Clustering.
    pub cluster: ClusterScheme,
    /// Omitted period.
    pub reference_period: i64,
    /// Calendar year of period 0.
    pub start_year: i32,
    /// Coefficients, ascending by period.
    pub coefficients: Vec<EventStudyCoefficient>,
    /// Observations used.
    pub n_obs: usize,
    /// Degrees of freedom behind the intervals.
    pub df_inference: f64,
    /// Confidence level.
    pub conf_level: f64,
}

fn term(k: i64) -> String {
    format!("period::{k}")
}

/// Offsets that get a dummy, ascending.
pub fn event_periods(
    panel: &Panel,
    assignment: &TreatmentAssignment,
    spec: &EventStudySpec,
) -> Result<Vec<i64>> {
    let observed: BTreeSet<i64> = panel
        .rows()
        .iter()
        .filter(|r| assignment.is_treated_country(&r.country_code))
        .map(|r| assignment.time_to_treatment(&r.country_code, r.year))
        .collect();
    if observed.is_empty() {
        return Err(Error::Data("no treated-country observations for the event study".into()));
    }
    if let Some((lo, hi)) = spec.window {
        if lo > hi {
            return Err(Error::Validation(format!("event window ({lo}, {hi}) is empty")));
        }
        if !(lo..=hi).contains(&spec.reference_period) {
            return Err(Error::Validation(format!(
                "reference period {} outside window ({lo}, {hi})",
                spec.reference_period
            )));
        }
    }
    if !observed.contains(&spec.reference_period) {
        return Err(Error::Validation(format!(
            "reference period {} not observed (offsets {:?})",
            spec.reference_period, observed
        )));
    }
    Ok(observed
        .into_iter()
        .filter(|&k| k != spec.reference_period)
        .filter(|&k| spec.window.map_or(true, |(lo, hi)| (lo..=hi).contains(&k)))
        .collect())
}

/// Materialise the event study as a regression problem.
pub fn build_event_study_problem(
    panel: &Panel,
    assignment: &TreatmentAssignment,
    spec: &EventStudySpec,
) -> Result<(RegressionProblem, Vec<i64>)> {
    let periods = event_periods(panel, assignment, spec)?;
    let offsets: Vec<Option<i64>> = panel
        .rows()
        .iter()
        .map(|r| {
            assignment
                .is_treated_country(&r.country_code)
                .then(|| assignment.time_to_treatment(&r.country_code, r.year))
        })
        .collect();

    let mut problem = RegressionProblem::new(panel.column_f64(spec.outcome));
    for &k in &periods {
        let dummy = offsets.iter().map(|o| if *o == Some(k) { 1.0 } else { 0.0 }).collect();
        problem = problem.with_regressor(term(k), dummy);
    }
    let problem = problem
        .with_fixed_effect(panel.firm_index())
        .with_fixed_effect(panel.year_index())
        .with_cluster(spec.cluster.to_spec(panel))
        .with_conf_level(spec.conf_level);
    Ok((problem, periods))
}

/// Fit the event study.
pub fn event_study<E: RegressionEngine + ?Sized>(
    engine: &E,
    panel: &Panel,
    assignment: &TreatmentAssignment,
    spec: &EventStudySpec,
) -> Result<EventStudyEstimate> {
    let (problem, periods) = build_event_study_problem(panel, assignment, spec)?;
    let fit = engine.fit(&problem)?;

    let coefficients = periods
        .iter()
        .map(|&k| {
            let name = term(k);
            let c = fit
                .coefficient(&name)
                .ok_or_else(|| Error::Computation(format!("engine did not report '{name}'")))?;
            Ok(EventStudyCoefficient {
                period: k,
                estimate: c.estimate,
                std_error: c.std_error,
                p_value: c.p_value,
                ci_lower: c.ci_lower,
                ci_upper: c.ci_upper,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        periods = coefficients.len(),
        reference = spec.reference_period,
        n_obs = fit.n_obs,
        "estimated event study"
    );

    Ok(EventStudyEstimate {
        outcome: spec.outcome,
        cluster: spec.cluster,
        reference_period: spec.reference_period,
        start_year: assignment.start_year,
        coefficients,
        n_obs: fit.n_obs,
        df_inference: fit.df_inference,
        conf_level: fit.conf_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HdfeOlsEngine;
    use approx::assert_relative_eq;
    use dl_panel::SyntheticPanelConfig;

    fn noiseless() -> (Panel, TreatmentAssignment) {
        let cfg = SyntheticPanelConfig {
            n_years: 6,
            start_year: 2004,
            firm_sd: 0.02,
            noise_sd: 0.0,
            firms_per_country: 5,
            ..Default::default()
        };
        (cfg.generate().unwrap(), cfg.assignment())
    }

    #[test]
    fn leads_zero_lags_equal_effect() {
        let (panel, assignment) = noiseless();
        let spec = EventStudySpec { cluster: ClusterScheme::None, ..EventStudySpec::new(NumericColumn::Roa) };
        let es = event_study(&HdfeOlsEngine::new(), &panel, &assignment, &spec).unwrap();
        let periods: Vec<i64> = es.coefficients.iter().map(|c| c.period).collect();
        // years 2001..2006, start 2004: offsets -3..2 without -1
        assert_eq!(periods, vec![-3, -2, 0, 1, 2]);
        for c in &es.coefficients {
            let expected = if c.period >= 0 { 0.03 } else { 0.0 };
            assert_relative_eq!(c.estimate, expected, epsilon = 1e-8);
        }
        assert_eq!(es.start_year, 2004);
    }

    #[test]
    fn window_limits_dummies() {
        let (panel, assignment) = noiseless();
        let spec = EventStudySpec { window: Some((-2, 1)), ..EventStudySpec::new(NumericColumn::Roa) };
        assert_eq!(event_periods(&panel, &assignment, &spec).unwrap(), vec![-2, 0, 1]);
    }

    #[test]
    fn trend_break_shows_in_leads() {
        let cfg = SyntheticPanelConfig {
            treated_trend: 0.01,
            noise_sd: 0.0,
            firms_per_country: 4,
            ..Default::default()
        };
        let es = event_study(
            &HdfeOlsEngine::new(),
            &cfg.generate().unwrap(),
            &cfg.assignment(),
            &EventStudySpec::new(NumericColumn::Roa),
        )
        .unwrap();
        let lead = es.coefficients.iter().find(|c| c.period == -2).unwrap();
        assert_relative_eq!(lead.estimate, -0.01, epsilon = 1e-8);
    }

    #[test]
    fn reference_must_be_observed() {
        let (panel, assignment) = noiseless();
        let spec = EventStudySpec { reference_period: -9, ..EventStudySpec::new(NumericColumn::Roa) };
        assert!(event_periods(&panel, &assignment, &spec).is_err());
        let spec = EventStudySpec { window: Some((0, 2)), ..EventStudySpec::new(NumericColumn::Roa) };
        assert!(event_periods(&panel, &assignment, &spec).is_err());
    }
}
