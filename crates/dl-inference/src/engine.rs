//! OLS with absorbed fixed effects, the default [`RegressionEngine`].
//!
//! Pipeline: drop rows with a missing outcome or regressor, partial out the
//! fixed effects (MAP), solve the normal equations on the demeaned design,
//! then compute IID / one-way / two-way clustered covariance and Student-t
//! inference.

use dl_core::{
    ClusterSpec, CoefficientEstimate, Error, RegressionEngine, RegressionFit, RegressionProblem,
    Result,
};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::econometrics::hdfe::FixedEffectsSolver;
use crate::econometrics::vcov::{
    cluster_vcov, iid_vcov, standard_errors, twoway_cluster_vcov,
};

/// Name reported for the intercept coefficient.
pub const INTERCEPT: &str = "(Intercept)";

/// Relative squared-norm below which a demeaned regressor counts as absorbed.
const ABSORBED_TOL: f64 = 1e-20;

/// Singular values below `RANK_TOL · σ_max` count as zero.
const RANK_TOL: f64 = 1e-10;

/// High-dimensional fixed-effects OLS.
#[derive(Debug, Clone, Default)]
pub struct HdfeOlsEngine {
    map_tol: Option<f64>,
}

impl HdfeOlsEngine {
    /// Engine with default MAP tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the MAP convergence tolerance.
    pub fn with_map_tol(mut self, tol: f64) -> Self {
        self.map_tol = Some(tol);
        self
    }
}

impl RegressionEngine for HdfeOlsEngine {
    fn name(&self) -> &str {
        "hdfe-ols"
    }

    fn fit(&self, problem: &RegressionProblem) -> Result<RegressionFit> {
        problem.validate()?;

        let keep: Vec<usize> = (0..problem.n_rows())
            .filter(|&i| {
                problem.outcome[i].is_finite()
                    && problem.regressors.iter().all(|r| r.values[i].is_finite())
            })
            .collect();
        let dropped = problem.n_rows() - keep.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped rows with missing values");
        }
        let n = keep.len();
        if n == 0 {
            return Err(Error::Data("no complete observations to fit".into()));
        }

        let pick = |v: &[f64]| keep.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        let mut y = pick(&problem.outcome);
        let mut names: Vec<String> = Vec::with_capacity(problem.regressors.len() + 1);
        let mut cols: Vec<Vec<f64>> = Vec::with_capacity(problem.regressors.len() + 1);

        let solver = if problem.fixed_effects.is_empty() {
            if problem.intercept {
                names.push(INTERCEPT.to_string());
                cols.push(vec![1.0; n]);
            }
            for r in &problem.regressors {
                names.push(r.name.clone());
                cols.push(pick(&r.values));
            }
            None
        } else {
            let fe: Vec<Vec<u64>> =
                problem.fixed_effects.iter().map(|ids| keep.iter().map(|&i| ids[i]).collect()).collect();
            let mut solver = FixedEffectsSolver::from_ids(&fe)?;
            if let Some(tol) = self.map_tol {
                solver = solver.with_tol(tol);
            }
            y = solver.partial_out(&y)?;
            for r in &problem.regressors {
                let raw = pick(&r.values);
                let demeaned = solver.partial_out(&raw)?;
                let ss_raw: f64 = raw.iter().map(|v| v * v).sum();
                let ss_dm: f64 = demeaned.iter().map(|v| v * v).sum();
                if ss_dm <= ABSORBED_TOL * ss_raw.max(1.0) {
                    return Err(Error::Computation(format!(
                        "regressor '{}' is collinear with the fixed effects",
                        r.name
                    )));
                }
                names.push(r.name.clone());
                cols.push(demeaned);
            }
            Some(solver)
        };

        let p = cols.len();
        let x = DMatrix::from_fn(n, p, |i, j| cols[j][i]);
        let yv = DVector::from_vec(y);

        let svd = x.clone().svd(false, false);
        let rank = svd.rank(svd.singular_values.max() * RANK_TOL);
        if rank < p {
            return Err(Error::Computation(format!(
                "rank-deficient design: rank {rank} < {p} columns ({})",
                names.join(", ")
            )));
        }

        let xt = x.transpose();
        let xtx_inv = (&xt * &x)
            .try_inverse()
            .ok_or_else(|| Error::Computation("X'X is singular (rank-deficient design)".into()))?;
        let beta = &xtx_inv * (&xt * &yv);
        let resid = &yv - &x * &beta;
        let rss = resid.dot(&resid);

        let df_absorbed = solver.as_ref().map_or(0, FixedEffectsSolver::degrees_of_freedom_absorbed);
        let k_total = p + df_absorbed;
        if n <= k_total {
            return Err(Error::Computation(format!(
                "not enough observations: n = {n}, parameters = {k_total}"
            )));
        }
        let df_resid = (n - k_total) as f64;

        let tss = if solver.is_none() && problem.intercept {
            let m = yv.mean();
            yv.iter().map(|v| (v - m).powi(2)).sum::<f64>()
        } else {
            yv.dot(&yv)
        };
        let r_squared_within = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };

        let cluster = problem.cluster.select_rows(&keep);
        let (vcov, n_clusters, df_inference) = match &cluster {
            ClusterSpec::Iid => (iid_vcov(&xtx_inv, rss, df_resid)?, Vec::new(), df_resid),
            ClusterSpec::OneWay(ids) => {
                let k = small_sample_k(solver.as_ref(), p, &[ids]);
                let (v, g) = cluster_vcov(&x, &resid, &xtx_inv, ids, k)?;
                (v, vec![g], (g - 1) as f64)
            }
            ClusterSpec::TwoWay(a, b) => {
                let k = small_sample_k(solver.as_ref(), p, &[a, b]);
                let (v, g) = twoway_cluster_vcov(&x, &resid, &xtx_inv, a, b, k)?;
                (v, g.to_vec(), (g[0].min(g[1]) - 1) as f64)
            }
        };

        let se = standard_errors(&vcov);
        let t_dist = StudentsT::new(0.0, 1.0, df_inference)
            .map_err(|e| Error::Computation(format!("t distribution (df = {df_inference}): {e}")))?;
        let crit = t_dist.inverse_cdf(1.0 - (1.0 - problem.conf_level) / 2.0);

        let coefficients = names
            .into_iter()
            .enumerate()
            .map(|(j, name)| {
                let estimate = beta[j];
                let std_error = se[j];
                let t_stat = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
                let p_value =
                    if t_stat.is_finite() { 2.0 * (1.0 - t_dist.cdf(t_stat.abs())) } else { f64::NAN };
                CoefficientEstimate {
                    name,
                    estimate,
                    std_error,
                    t_stat,
                    p_value,
                    ci_lower: estimate - crit * std_error,
                    ci_upper: estimate + crit * std_error,
                }
            })
            .collect();

        tracing::debug!(
            engine = self.name(),
            n_obs = n,
            k = p,
            df_absorbed,
            vcov = cluster.kind(),
            "regression fitted"
        );

        Ok(RegressionFit {
            coefficients,
            n_obs: n,
            df_resid,
            df_absorbed,
            df_inference,
            rss,
            r_squared_within,
            vcov: cluster.kind().to_string(),
            n_clusters,
            conf_level: problem.conf_level,
        })
    }
}

/// Parameter count for the clustered small-sample factor. Fixed effects
/// nested in a clustering dimension are not counted.
fn small_sample_k(solver: Option<&FixedEffectsSolver>, p: usize, clusters: &[&Vec<u64>]) -> usize {
    let Some(solver) = solver else {
        return p;
    };
    let levels = solver.levels();
    let nested: usize = (0..solver.n_dimensions())
        .filter(|&d| clusters.iter().any(|ids| solver.is_nested_in(d, ids)))
        .map(|d| levels[d])
        .sum();
    p + solver.degrees_of_freedom_absorbed().saturating_sub(nested)
}
