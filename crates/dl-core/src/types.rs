//! Common data types for didlab

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default confidence level for coefficient intervals.
pub const DEFAULT_CONF_LEVEL: f64 = 0.95;

/// A named column of the design matrix.
#[derive(Debug, Clone)]
pub struct Regressor {
    /// Coefficient name reported back in [`RegressionFit`].
    pub name: String,
    /// Column values (length n).
    pub values: Vec<f64>,
}

/// Standard-error clustering for a regression problem.
#[derive(Debug, Clone, Default)]
pub enum ClusterSpec {
    /// Homoskedastic (IID) standard errors.
    #[default]
    Iid,
    /// One-way clustering on a single grouping column.
    OneWay(Vec<u64>),
    /// Two-way clustering (Cameron-Gelbach-Miller) on two grouping columns.
    TwoWay(Vec<u64>, Vec<u64>),
}

impl ClusterSpec {
    /// Short label used in artifacts (`iid`, `cluster`, `twoway`).
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterSpec::Iid => "iid",
            ClusterSpec::OneWay(_) => "cluster",
            ClusterSpec::TwoWay(_, _) => "twoway",
        }
    }

    /// Keep only rows whose index is in `keep` (ascending).
    pub fn select_rows(&self, keep: &[usize]) -> ClusterSpec {
        let pick = |ids: &[u64]| keep.iter().map(|&i| ids[i]).collect::<Vec<u64>>();
        match self {
            ClusterSpec::Iid => ClusterSpec::Iid,
            ClusterSpec::OneWay(a) => ClusterSpec::OneWay(pick(a)),
            ClusterSpec::TwoWay(a, b) => ClusterSpec::TwoWay(pick(a), pick(b)),
        }
    }
}

/// Linear model specification handed to a [`crate::RegressionEngine`].
///
/// Roughly the content of a `y ~ x1 + x2 | fe1 + fe2, cluster = ~c` formula,
/// already materialised into columns.
#[derive(Debug, Clone)]
pub struct RegressionProblem {
    /// Outcome (length n). NaN marks a missing observation.
    pub outcome: Vec<f64>,
    /// Regressors, in reporting order.
    pub regressors: Vec<Regressor>,
    /// Include an intercept column. Ignored when fixed effects are present.
    pub intercept: bool,
    /// Fixed-effect grouping columns (length n each).
    pub fixed_effects: Vec<Vec<u64>>,
    /// Standard-error clustering.
    pub cluster: ClusterSpec,
    /// Confidence level for coefficient intervals.
    pub conf_level: f64,
}

impl RegressionProblem {
    /// Problem with an outcome only: intercept on, no FE, IID errors.
    pub fn new(outcome: Vec<f64>) -> Self {
        Self {
            outcome,
            regressors: Vec::new(),
            intercept: true,
            fixed_effects: Vec::new(),
            cluster: ClusterSpec::Iid,
            conf_level: DEFAULT_CONF_LEVEL,
        }
    }

    /// Append a regressor column.
    pub fn with_regressor(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.regressors.push(Regressor { name: name.into(), values });
        self
    }

    /// Toggle the intercept.
    pub fn with_intercept(mut self, intercept: bool) -> Self {
        self.intercept = intercept;
        self
    }

    /// Absorb one more fixed-effect dimension.
    pub fn with_fixed_effect(mut self, ids: Vec<u64>) -> Self {
        self.fixed_effects.push(ids);
        self
    }

    /// Set standard-error clustering.
    pub fn with_cluster(mut self, cluster: ClusterSpec) -> Self {
        self.cluster = cluster;
        self
    }

    /// Set confidence level for intervals.
    pub fn with_conf_level(mut self, conf_level: f64) -> Self {
        self.conf_level = conf_level;
        self
    }

    /// Number of rows (including rows with a missing outcome).
    pub fn n_rows(&self) -> usize {
        self.outcome.len()
    }

    /// Check column lengths and basic parameter sanity.
    pub fn validate(&self) -> Result<()> {
        let n = self.outcome.len();
        if n == 0 {
            return Err(Error::Validation("outcome must be non-empty".into()));
        }
        if self.regressors.is_empty() {
            return Err(Error::Validation("at least one regressor required".into()));
        }
        for r in &self.regressors {
            if r.values.len() != n {
                return Err(Error::Validation(format!(
                    "regressor '{}' has length {}, expected {}",
                    r.name,
                    r.values.len(),
                    n
                )));
            }
        }
        for (d, fe) in self.fixed_effects.iter().enumerate() {
            if fe.len() != n {
                return Err(Error::Validation(format!(
                    "fixed effect {} has length {}, expected {}",
                    d,
                    fe.len(),
                    n
                )));
            }
        }
        match &self.cluster {
            ClusterSpec::Iid => {}
            ClusterSpec::OneWay(a) => {
                if a.len() != n {
                    return Err(Error::Validation(format!(
                        "cluster ids length ({}) != n ({})",
                        a.len(),
                        n
                    )));
                }
            }
            ClusterSpec::TwoWay(a, b) => {
                if a.len() != n || b.len() != n {
                    return Err(Error::Validation(format!(
                        "two-way cluster ids lengths ({}, {}) != n ({})",
                        a.len(),
                        b.len(),
                        n
                    )));
                }
            }
        }
        if !(self.conf_level > 0.0 && self.conf_level < 1.0) {
            return Err(Error::Validation(format!(
                "conf_level must be in (0,1), got {}",
                self.conf_level
            )));
        }
        Ok(())
    }
}

/// Inference for one coefficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientEstimate {
    /// Regressor name.
    pub name: String,
    /// Point estimate.
    pub estimate: f64,
    /// Standard error (IID or cluster-robust, per the problem's clustering).
    pub std_error: f64,
    /// t statistic (`estimate / std_error`).
    pub t_stat: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
}

/// Result of a regression fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionFit {
    /// Per-coefficient inference, in problem order (intercept first if present).
    pub coefficients: Vec<CoefficientEstimate>,
    /// Observations used (rows with a missing outcome are dropped).
    pub n_obs: usize,
    /// Residual degrees of freedom.
    pub df_resid: f64,
    /// Degrees of freedom absorbed by fixed effects.
    pub df_absorbed: usize,
    /// Degrees of freedom used for the t quantiles.
    pub df_inference: f64,
    /// Residual sum of squares.
    pub rss: f64,
    /// R² after absorbing fixed effects (plain R² without FE).
    pub r_squared_within: f64,
    /// Covariance kind: `iid`, `cluster`, `twoway`.
    pub vcov: String,
    /// Number of clusters per clustering dimension.
    pub n_clusters: Vec<usize>,
    /// Confidence level of the reported intervals.
    pub conf_level: f64,
}

impl RegressionFit {
    /// Look a coefficient up by name.
    pub fn coefficient(&self, name: &str) -> Option<&CoefficientEstimate> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_builder_validates_lengths() {
        let p = RegressionProblem::new(vec![1.0, 2.0, 3.0]).with_regressor("x", vec![0.0, 1.0, 2.0]);
        assert!(p.validate().is_ok());

        let bad = p.clone().with_regressor("z", vec![1.0]);
        assert!(bad.validate().is_err());

        let bad_fe = p.clone().with_fixed_effect(vec![1, 2]);
        assert!(bad_fe.validate().is_err());

        let bad_cl = p.clone().with_cluster(ClusterSpec::TwoWay(vec![1, 1, 2], vec![1]));
        assert!(bad_cl.validate().is_err());

        let bad_level = p.with_conf_level(1.5);
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn problem_requires_regressor() {
        assert!(RegressionProblem::new(vec![1.0]).validate().is_err());
        assert!(RegressionProblem::new(vec![]).validate().is_err());
    }

    #[test]
    fn cluster_select_rows() {
        let c = ClusterSpec::TwoWay(vec![10, 11, 12], vec![20, 21, 22]);
        match c.select_rows(&[0, 2]) {
            ClusterSpec::TwoWay(a, b) => {
                assert_eq!(a, vec![10, 12]);
                assert_eq!(b, vec![20, 22]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ClusterSpec::Iid.kind(), "iid");
    }
}
