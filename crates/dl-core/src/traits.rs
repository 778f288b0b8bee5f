//! Core traits for didlab
//!
//! Estimation is a collaborator: DiD model builders only assemble a
//! [`RegressionProblem`] and hand it to whatever [`RegressionEngine`] the
//! caller supplies. The concrete solver lives in `dl-inference`.

use crate::Result;
use crate::types::{RegressionFit, RegressionProblem};

/// Linear-model estimation backend.
pub trait RegressionEngine {
    /// Fit the problem and return coefficient inference.
    fn fit(&self, problem: &RegressionProblem) -> Result<RegressionFit>;

    /// Engine name (e.g. "hdfe-ols").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoefficientEstimate;

    struct ConstantEngine;

    impl RegressionEngine for ConstantEngine {
        fn fit(&self, problem: &RegressionProblem) -> Result<RegressionFit> {
            problem.validate()?;
            Ok(RegressionFit {
                coefficients: problem
                    .regressors
                    .iter()
                    .map(|r| CoefficientEstimate {
                        name: r.name.clone(),
                        estimate: 1.0,
                        std_error: 0.5,
                        t_stat: 2.0,
                        p_value: 0.05,
                        ci_lower: 0.0,
                        ci_upper: 2.0,
                    })
                    .collect(),
                n_obs: problem.n_rows(),
                df_resid: 1.0,
                df_absorbed: 0,
                df_inference: 1.0,
                rss: 0.0,
                r_squared_within: 1.0,
                vcov: problem.cluster.kind().to_string(),
                n_clusters: vec![],
                conf_level: problem.conf_level,
            })
        }

        fn name(&self) -> &str {
            "Constant"
        }
    }

    #[test]
    fn test_engine_trait_object() {
        let engine: Box<dyn RegressionEngine> = Box::new(ConstantEngine);
        let problem = RegressionProblem::new(vec![1.0, 2.0]).with_regressor("x", vec![0.0, 1.0]);
        let fit = engine.fit(&problem).unwrap();
        assert_eq!(engine.name(), "Constant");
        assert_eq!(fit.coefficient("x").unwrap().estimate, 1.0);
        assert!(fit.coefficient("missing").is_none());
    }
}
