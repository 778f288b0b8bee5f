//! Seeded synthetic firm-year panels.
//!
//! Outcome model:
//! `roa = base + firm_effect + year_trend * t + treated_trend * t * D + effect * treated + noise`,
//! with `firm_effect ~ N(0, firm_sd)` and `noise ~ N(0, noise_sd)`.

use dl_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use serde::{Deserialize, Serialize};

use crate::observation::{Panel, PanelObservation};
use crate::treatment::TreatmentAssignment;

/// Parameters of a synthetic panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPanelConfig {
    /// Number of countries.
    pub n_countries: usize,
    /// The first `n_treated_countries` countries are treated.
    pub n_treated_countries: usize,
    /// Firms per country.
    pub firms_per_country: usize,
    /// First fiscal year.
    pub first_year: i32,
    /// Number of years.
    pub n_years: usize,
    /// Treatment start year.
    pub start_year: i32,
    /// Injected treatment effect on `roa`.
    pub effect: f64,
    /// Mean `roa`.
    pub base_roa: f64,
    /// Common linear trend per year.
    pub year_trend: f64,
    /// Extra trend for treated countries (breaks parallel trends when non-zero).
    pub treated_trend: f64,
    /// Standard deviation of firm effects.
    pub firm_sd: f64,
    /// Standard deviation of idiosyncratic noise.
    pub noise_sd: f64,
    /// Probability a firm-year is dropped (unbalanced panels).
    pub drop_prob: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SyntheticPanelConfig {
    fn default() -> Self {
        Self {
            n_countries: 2,
            n_treated_countries: 1,
            firms_per_country: 50,
            first_year: 2001,
            n_years: 4,
            start_year: 2003,
            effect: 0.03,
            base_roa: 0.05,
            year_trend: 0.0,
            treated_trend: 0.0,
            firm_sd: 0.02,
            noise_sd: 0.01,
            drop_prob: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticPanelConfig {
    fn validate(&self) -> Result<()> {
        if self.n_countries == 0 || self.firms_per_country == 0 || self.n_years == 0 {
            return Err(Error::Validation(
                "n_countries, firms_per_country and n_years must be > 0".into(),
            ));
        }
        if self.n_treated_countries > self.n_countries {
            return Err(Error::Validation(format!(
                "n_treated_countries ({}) > n_countries ({})",
                self.n_treated_countries, self.n_countries
            )));
        }
        if !(self.firm_sd >= 0.0 && self.noise_sd >= 0.0) {
            return Err(Error::Validation("firm_sd and noise_sd must be >= 0".into()));
        }
        if !(0.0..1.0).contains(&self.drop_prob) {
            return Err(Error::Validation(format!(
                "drop_prob must be in [0, 1), got {}",
                self.drop_prob
            )));
        }
        Ok(())
    }

    /// Country code of the `c`-th country.
    pub fn country_code(c: usize) -> String {
        format!("C{:02}", c + 1)
    }

    /// Treatment assignment implied by this config.
    pub fn assignment(&self) -> TreatmentAssignment {
        TreatmentAssignment::new(
            (0..self.n_treated_countries).map(Self::country_code),
            self.start_year,
        )
    }

    /// Generate the panel.
    pub fn generate(&self) -> Result<Panel> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let firm_dist = Normal::new(0.0, self.firm_sd)
            .map_err(|e| Error::Validation(format!("firm_sd: {e}")))?;
        let noise_dist = Normal::new(0.0, self.noise_sd)
            .map_err(|e| Error::Validation(format!("noise_sd: {e}")))?;
        let assets_dist = LogNormal::new(6.0, 1.0)
            .map_err(|e| Error::Computation(format!("assets distribution: {e}")))?;
        let assignment = self.assignment();

        let mut rows =
            Vec::with_capacity(self.n_countries * self.firms_per_country * self.n_years);
        for c in 0..self.n_countries {
            let code = Self::country_code(c);
            let treated_country = assignment.is_treated_country(&code);
            for f in 0..self.firms_per_country {
                let firm_effect = firm_dist.sample(&mut rng);
                let assets = assets_dist.sample(&mut rng);
                let firm_id = format!("{code}-{:04}", f + 1);
                for t in 0..self.n_years {
                    let noise = noise_dist.sample(&mut rng);
                    let dropped = self.drop_prob > 0.0 && rng.gen::<f64>() < self.drop_prob;
                    if dropped {
                        continue;
                    }
                    let year = self.first_year + t as i32;
                    let treated = assignment.is_treated(&code, year);
                    let tf = t as f64;
                    let mut roa = self.base_roa + firm_effect + self.year_trend * tf + noise;
                    if treated_country {
                        roa += self.treated_trend * tf;
                    }
                    if treated {
                        roa += self.effect;
                    }
                    rows.push(PanelObservation {
                        firm_id: firm_id.clone(),
                        firm_name: format!("Firm {firm_id}"),
                        country_code: code.clone(),
                        country_name: format!("Country {:02}", c + 1),
                        treated_country,
                        treated,
                        time_to_treatment: assignment.time_to_treatment(&code, year),
                        year,
                        roa: Some(roa),
                        avg_total_assets: Some(assets),
                    });
                }
            }
        }
        tracing::debug!(rows = rows.len(), seed = self.seed, "generated synthetic panel");
        Panel::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{balance, firms_per_country};

    #[test]
    fn default_panel_shape() {
        let cfg = SyntheticPanelConfig::default();
        let p = cfg.generate().unwrap();
        assert_eq!(p.len(), 2 * 50 * 4);
        let b = balance(&p);
        assert!(b.balanced);
        assert_eq!(b.first_year, Some(2001));
        assert_eq!(b.last_year, Some(2004));
        let fc = firms_per_country(&p);
        assert_eq!(fc.len(), 2);
        assert!(fc[0].treated_country && !fc[1].treated_country);
        assert_eq!(TreatmentAssignment::infer(&p).unwrap(), cfg.assignment());
    }

    #[test]
    fn same_seed_same_panel() {
        let cfg = SyntheticPanelConfig { seed: 7, ..Default::default() };
        assert_eq!(cfg.generate().unwrap(), cfg.generate().unwrap());
        let other = SyntheticPanelConfig { seed: 8, ..Default::default() };
        assert_ne!(cfg.generate().unwrap(), other.generate().unwrap());
    }

    #[test]
    fn noiseless_effect_is_exact() {
        let cfg = SyntheticPanelConfig {
            firm_sd: 0.0,
            noise_sd: 0.0,
            firms_per_country: 2,
            ..Default::default()
        };
        let p = cfg.generate().unwrap();
        for r in p.rows() {
            let expected = if r.treated { 0.08 } else { 0.05 };
            assert!((r.roa.unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn drop_prob_unbalances() {
        let cfg = SyntheticPanelConfig { drop_prob: 0.3, ..Default::default() };
        let p = cfg.generate().unwrap();
        assert!(p.len() < 400);
        assert!(!balance(&p).balanced);
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = SyntheticPanelConfig { n_treated_countries: 3, ..Default::default() };
        assert!(cfg.generate().is_err());
        let cfg = SyntheticPanelConfig { drop_prob: 1.0, ..Default::default() };
        assert!(cfg.generate().is_err());
    }
}
