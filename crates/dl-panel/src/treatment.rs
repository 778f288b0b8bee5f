//! Country-level treatment assignment with a common start year.

use std::collections::BTreeSet;

use dl_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::observation::Panel;

/// Treated countries and the calendar year treatment becomes effective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentAssignment {
    /// Country codes in the treated group.
    pub treated_countries: BTreeSet<String>,
    /// First treated year (inclusive).
    pub start_year: i32,
}

impl TreatmentAssignment {
    /// New assignment.
    pub fn new<I, S>(treated_countries: I, start_year: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { treated_countries: treated_countries.into_iter().map(Into::into).collect(), start_year }
    }

    /// Recover the assignment encoded in a panel's flags.
    ///
    /// Treated countries are those flagged `treated_country`; the start year is
    /// the earliest treated firm-year. Fails if the flags are inconsistent with
    /// a single common start year.
    pub fn infer(panel: &Panel) -> Result<Self> {
        let treated_countries: BTreeSet<String> = panel
            .rows()
            .iter()
            .filter(|r| r.treated_country)
            .map(|r| r.country_code.clone())
            .collect();
        if treated_countries.is_empty() {
            return Err(Error::Data("panel has no treated country".into()));
        }
        let start_year = panel
            .rows()
            .iter()
            .filter(|r| r.treated)
            .map(|r| r.year)
            .min()
            .ok_or_else(|| Error::Data("panel has no treated firm-year".into()))?;

        let assignment = Self { treated_countries, start_year };
        for r in panel.rows() {
            if r.treated_country != assignment.is_treated_country(&r.country_code) {
                return Err(Error::Data(format!(
                    "country {} has mixed treated_country flags",
                    r.country_code
                )));
            }
            if r.treated != assignment.is_treated(&r.country_code, r.year) {
                return Err(Error::Data(format!(
                    "firm-year ({}, {}) treated flag disagrees with start year {}",
                    r.firm_id, r.year, assignment.start_year
                )));
            }
        }
        Ok(assignment)
    }

    /// Country is in the treated group.
    pub fn is_treated_country(&self, country_code: &str) -> bool {
        self.treated_countries.contains(country_code)
    }

    /// Firm-year is treated.
    pub fn is_treated(&self, country_code: &str, year: i32) -> bool {
        self.is_treated_country(country_code) && year >= self.start_year
    }

    /// Year is at or after the start year (the DiD `post` indicator).
    pub fn is_post(&self, year: i32) -> bool {
        year >= self.start_year
    }

    /// Signed years since treatment start; zero for untreated countries.
    pub fn time_to_treatment(&self, country_code: &str, year: i32) -> i64 {
        if self.is_treated_country(country_code) {
            i64::from(year) - i64::from(self.start_year)
        } else {
            0
        }
    }

    /// New panel with treatment flags and time-to-treatment recomputed.
    pub fn apply(&self, panel: &Panel) -> Result<Panel> {
        let rows = panel
            .rows()
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.treated_country = self.is_treated_country(&r.country_code);
                r.treated = self.is_treated(&r.country_code, r.year);
                r.time_to_treatment = self.time_to_treatment(&r.country_code, r.year);
                r
            })
            .collect();
        let out = Panel::new(rows)?;
        let n_treated = out.rows().iter().filter(|r| r.treated).count();
        tracing::debug!(
            start_year = self.start_year,
            countries = self.treated_countries.len(),
            treated_firm_years = n_treated,
            "applied treatment assignment"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::test_support::obs;

    fn panel() -> Panel {
        Panel::new(vec![
            obs("A", "DEU", true, 2002, 0.1),
            obs("A", "DEU", true, 2003, 0.1),
            obs("B", "FRA", false, 2002, 0.1),
            obs("B", "FRA", false, 2003, 0.1),
        ])
        .unwrap()
    }

    #[test]
    fn flags_follow_country_and_year() {
        let t = TreatmentAssignment::new(["DEU"], 2003);
        assert!(t.is_treated("DEU", 2003));
        assert!(!t.is_treated("DEU", 2002));
        assert!(!t.is_treated("FRA", 2005));
        assert_eq!(t.time_to_treatment("DEU", 2001), -2);
        assert_eq!(t.time_to_treatment("FRA", 2001), 0);
    }

    #[test]
    fn infer_roundtrips_flags() {
        let t = TreatmentAssignment::infer(&panel()).unwrap();
        assert_eq!(t, TreatmentAssignment::new(["DEU"], 2003));
    }

    #[test]
    fn apply_rewrites_flags() {
        let input = panel();
        let t = TreatmentAssignment::new(["FRA"], 2002);
        let out = t.apply(&input).unwrap();
        let fra: Vec<_> = out.rows().iter().filter(|r| r.country_code == "FRA").collect();
        assert!(fra.iter().all(|r| r.treated && r.treated_country));
        assert_eq!(fra[1].time_to_treatment, 1);
        let deu: Vec<_> = out.rows().iter().filter(|r| r.country_code == "DEU").collect();
        assert!(deu.iter().all(|r| !r.treated && !r.treated_country && r.time_to_treatment == 0));
        assert!(input.rows()[1].treated);
    }

    #[test]
    fn infer_rejects_inconsistent_flags() {
        let mut rows = panel().into_rows();
        // Treated in 2002 but not in 2003.
        rows[0].treated = true;
        rows[1].treated = false;
        let p = Panel::new(rows).unwrap();
        assert!(TreatmentAssignment::infer(&p).is_err());
    }
}
