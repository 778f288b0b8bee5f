//! Panel observations and the panel table.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use dl_core::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// One firm-year row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelObservation {
    /// Company identifier.
    #[serde(alias = "gvkey")]
    pub firm_id: String,
    /// Company name.
    #[serde(alias = "conm")]
    pub firm_name: String,
    /// Country code (ISO-3 or similar).
    #[serde(alias = "country")]
    pub country_code: String,
    /// Country name.
    pub country_name: String,
    /// Country belongs to the treated group.
    #[serde(alias = "tment", deserialize_with = "deserialize_flag")]
    pub treated_country: bool,
    /// Firm-year is treated (treated country and year >= start year).
    #[serde(deserialize_with = "deserialize_flag")]
    pub treated: bool,
    /// Years since treatment start; zero for untreated countries.
    #[serde(alias = "time_to_treat")]
    pub time_to_treatment: i64,
    /// Fiscal year.
    #[serde(alias = "fyear")]
    pub year: i32,
    /// Return on assets (profitability ratio).
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub roa: Option<f64>,
    /// Average total assets.
    #[serde(default, alias = "avg_at", deserialize_with = "deserialize_optional_f64")]
    pub avg_total_assets: Option<f64>,
}

/// Accept `true/false`, `TRUE/FALSE`, `T/F`, `1/0`.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim() {
        "true" | "TRUE" | "True" | "T" | "1" => Ok(true),
        "false" | "FALSE" | "False" | "F" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid boolean flag '{other}'"))),
    }
}

/// Empty, `NA` and `NaN` fields become `None`; infinities are rejected.
fn deserialize_optional_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s.as_deref().map(str::trim) {
        None | Some("") | Some("NA") | Some("NaN") | Some("nan") => Ok(None),
        Some(v) => {
            let x = v
                .parse::<f64>()
                .map_err(|e| serde::de::Error::custom(format!("invalid number '{v}': {e}")))?;
            if x.is_infinite() {
                return Err(serde::de::Error::custom(format!("non-finite number '{v}'")));
            }
            Ok(if x.is_nan() { None } else { Some(x) })
        }
    }
}

/// Numeric panel columns that can be summarised, winsorized or used as outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericColumn {
    /// Return on assets.
    Roa,
    /// Average total assets.
    AvgTotalAssets,
}

impl NumericColumn {
    /// Column name as it appears in input files.
    pub fn name(&self) -> &'static str {
        match self {
            NumericColumn::Roa => "roa",
            NumericColumn::AvgTotalAssets => "avg_total_assets",
        }
    }

    fn get(&self, obs: &PanelObservation) -> Option<f64> {
        match self {
            NumericColumn::Roa => obs.roa,
            NumericColumn::AvgTotalAssets => obs.avg_total_assets,
        }
    }

    fn set(&self, obs: &mut PanelObservation, value: Option<f64>) {
        match self {
            NumericColumn::Roa => obs.roa = value,
            NumericColumn::AvgTotalAssets => obs.avg_total_assets = value,
        }
    }
}

impl fmt::Display for NumericColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roa" => Ok(NumericColumn::Roa),
            "avg_total_assets" | "avg_at" => Ok(NumericColumn::AvgTotalAssets),
            other => Err(Error::Validation(format!(
                "unknown numeric column '{other}' (expected roa or avg_total_assets)"
            ))),
        }
    }
}

/// Firm-year panel.
///
/// Invariants checked at construction:
/// - `(firm_id, year)` is unique;
/// - every firm is observed under a single country.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    rows: Vec<PanelObservation>,
}

impl Panel {
    /// Build a panel, validating its invariants.
    pub fn new(rows: Vec<PanelObservation>) -> Result<Self> {
        let mut seen: HashMap<(&str, i32), usize> = HashMap::with_capacity(rows.len());
        let mut firm_country: HashMap<&str, &str> = HashMap::new();
        for (i, r) in rows.iter().enumerate() {
            if let Some(prev) = seen.insert((r.firm_id.as_str(), r.year), i) {
                return Err(Error::Validation(format!(
                    "duplicate firm-year ({}, {}) at rows {} and {}",
                    r.firm_id, r.year, prev, i
                )));
            }
            let c = firm_country.entry(r.firm_id.as_str()).or_insert(r.country_code.as_str());
            if *c != r.country_code {
                return Err(Error::Validation(format!(
                    "firm {} observed under countries {} and {}",
                    r.firm_id, c, r.country_code
                )));
            }
        }
        Ok(Self { rows })
    }

    /// All rows, in input order.
    pub fn rows(&self) -> &[PanelObservation] {
        &self.rows
    }

    /// Consume the panel, returning its rows.
    pub fn into_rows(self) -> Vec<PanelObservation> {
        self.rows
    }

    /// Number of firm-years.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a numeric column, `None` where missing.
    pub fn column(&self, col: NumericColumn) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| col.get(r)).collect()
    }

    /// Column as `f64`, with NaN for missing values.
    pub fn column_f64(&self, col: NumericColumn) -> Vec<f64> {
        self.rows.iter().map(|r| col.get(r).unwrap_or(f64::NAN)).collect()
    }

    /// New panel with `col` replaced by `values`.
    pub fn with_column(&self, col: NumericColumn, values: Vec<Option<f64>>) -> Result<Panel> {
        if values.len() != self.rows.len() {
            return Err(Error::Validation(format!(
                "column '{}' replacement has length {}, expected {}",
                col,
                values.len(),
                self.rows.len()
            )));
        }
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(r, v)| {
                let mut r = r.clone();
                col.set(&mut r, v);
                r
            })
            .collect();
        Ok(Panel { rows })
    }

    /// New panel keeping only rows for which `keep` returns true.
    pub fn filter<F>(&self, keep: F) -> Panel
    where
        F: Fn(&PanelObservation) -> bool,
    {
        Panel { rows: self.rows.iter().filter(|r| keep(r)).cloned().collect() }
    }

    /// Dense 0-based firm index per row (first-appearance order).
    pub fn firm_index(&self) -> Vec<u64> {
        dense_ids(self.rows.iter().map(|r| r.firm_id.as_str()))
    }

    /// Dense 0-based country index per row.
    pub fn country_index(&self) -> Vec<u64> {
        dense_ids(self.rows.iter().map(|r| r.country_code.as_str()))
    }

    /// Dense 0-based year index per row.
    pub fn year_index(&self) -> Vec<u64> {
        dense_ids(self.rows.iter().map(|r| r.year))
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.year).collect()
    }

    /// Distinct country codes, ascending.
    pub fn countries(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.country_code.as_str()).collect()
    }

    /// Distinct firm identifiers.
    pub fn firms(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.firm_id.as_str()).collect()
    }
}

/// Map arbitrary keys to dense `u64` indices in first-appearance order.
pub(crate) fn dense_ids<K, I>(keys: I) -> Vec<u64>
where
    K: Hash + Eq,
    I: IntoIterator<Item = K>,
{
    let mut map: HashMap<K, u64> = HashMap::new();
    keys.into_iter()
        .map(|k| {
            let len = map.len() as u64;
            *map.entry(k).or_insert(len)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::PanelObservation;

    /// Compact row constructor for tests.
    pub fn obs(firm: &str, country: &str, treated_country: bool, year: i32, roa: f64) -> PanelObservation {
        let start = 2003;
        PanelObservation {
            firm_id: firm.to_string(),
            firm_name: format!("{firm} Inc"),
            country_code: country.to_string(),
            country_name: format!("{country}-land"),
            treated_country,
            treated: treated_country && year >= start,
            time_to_treatment: if treated_country { (year - start) as i64 } else { 0 },
            year,
            roa: Some(roa),
            avg_total_assets: Some(100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::obs;
    use super::*;

    #[test]
    fn rejects_duplicate_firm_year() {
        let rows = vec![obs("A", "DEU", true, 2001, 0.1), obs("A", "DEU", true, 2001, 0.2)];
        let err = Panel::new(rows).unwrap_err();
        assert!(err.to_string().contains("duplicate firm-year"));
    }

    #[test]
    fn rejects_firm_in_two_countries() {
        let rows = vec![obs("A", "DEU", true, 2001, 0.1), obs("A", "FRA", false, 2002, 0.2)];
        assert!(Panel::new(rows).is_err());
    }

    #[test]
    fn with_column_returns_new_panel() {
        let panel =
            Panel::new(vec![obs("A", "DEU", true, 2001, 0.1), obs("B", "FRA", false, 2001, 0.2)])
                .unwrap();
        let replaced = panel.with_column(NumericColumn::Roa, vec![None, Some(1.0)]).unwrap();
        assert_eq!(panel.column(NumericColumn::Roa), vec![Some(0.1), Some(0.2)]);
        assert_eq!(replaced.column(NumericColumn::Roa), vec![None, Some(1.0)]);
        assert!(replaced.column_f64(NumericColumn::Roa)[0].is_nan());
        assert!(panel.with_column(NumericColumn::Roa, vec![None]).is_err());
    }

    #[test]
    fn dense_indices_follow_first_appearance() {
        let panel = Panel::new(vec![
            obs("B", "FRA", false, 2002, 0.0),
            obs("A", "DEU", true, 2001, 0.0),
            obs("B", "FRA", false, 2001, 0.0),
        ])
        .unwrap();
        assert_eq!(panel.firm_index(), vec![0, 1, 0]);
        assert_eq!(panel.country_index(), vec![0, 1, 0]);
        assert_eq!(panel.year_index(), vec![0, 1, 1]);
        assert_eq!(panel.years().into_iter().collect::<Vec<_>>(), vec![2001, 2002]);
    }

    #[test]
    fn numeric_column_parsing() {
        assert_eq!("roa".parse::<NumericColumn>().unwrap(), NumericColumn::Roa);
        assert_eq!("avg_at".parse::<NumericColumn>().unwrap(), NumericColumn::AvgTotalAssets);
        assert!("sales".parse::<NumericColumn>().is_err());
    }
}
