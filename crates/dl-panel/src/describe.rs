//! Descriptive aggregates over a panel.
//!
//! All aggregates tolerate unbalanced panels: a firm missing in some years
//! simply contributes fewer rows.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::observation::{NumericColumn, Panel};
use crate::stats::{mean, quantile_linear_sorted, sample_sd, sorted_finite};

/// Observation counts by year (rows) x country (columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    /// Row labels (years, ascending).
    pub years: Vec<i32>,
    /// Column labels (country codes, ascending).
    pub countries: Vec<String>,
    /// `counts[i][j]` = observations in `years[i]` and `countries[j]`.
    pub counts: Vec<Vec<usize>>,
    /// Per-year totals.
    pub year_totals: Vec<usize>,
    /// Per-country totals.
    pub country_totals: Vec<usize>,
    /// Grand total.
    pub total: usize,
}

/// Distinct firms observed in one country.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirmCount {
    /// Country code.
    pub country_code: String,
    /// Country name.
    pub country_name: String,
    /// Country is in the treated group.
    pub treated_country: bool,
    /// Number of distinct firms.
    pub n_firms: usize,
}

/// Location / spread summary of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    /// Column name.
    pub column: String,
    /// Non-missing values.
    pub n: usize,
    /// Missing values.
    pub n_missing: usize,
    /// Mean.
    pub mean: f64,
    /// Sample standard deviation.
    pub sd: f64,
    /// Minimum.
    pub min: f64,
    /// 25th percentile.
    pub p25: f64,
    /// Median.
    pub median: f64,
    /// 75th percentile.
    pub p75: f64,
    /// Maximum.
    pub max: f64,
}

/// Mean of a column for one (year, treatment group) cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    /// Fiscal year.
    pub year: i32,
    /// Treatment group (country-level flag).
    pub treated_country: bool,
    /// Mean of non-missing values.
    pub mean: f64,
    /// Non-missing values in the cell.
    pub n: usize,
}

/// Shape of the panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    /// Firm-years.
    pub n_obs: usize,
    /// Distinct firms.
    pub n_firms: usize,
    /// Distinct years.
    pub n_years: usize,
    /// Distinct countries.
    pub n_countries: usize,
    /// First year (`None` for an empty panel).
    pub first_year: Option<i32>,
    /// Last year.
    pub last_year: Option<i32>,
    /// Every firm observed in every year.
    pub balanced: bool,
}

/// Everything the exploratory step reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelDescription {
    /// Panel shape.
    pub balance: BalanceSummary,
    /// Year x country counts.
    pub crosstab: CrossTab,
    /// Firms per country.
    pub firms_per_country: Vec<FirmCount>,
    /// Summary of the chosen column.
    pub summary: ColumnSummary,
    /// Per-(year, group) means of the chosen column.
    pub group_means: Vec<GroupMean>,
}

/// Observation counts by year x country.
pub fn year_country_crosstab(panel: &Panel) -> CrossTab {
    let years: Vec<i32> = panel.years().into_iter().collect();
    let countries: Vec<String> = panel.countries().into_iter().map(str::to_string).collect();

    let mut cells: BTreeMap<(i32, &str), usize> = BTreeMap::new();
    for r in panel.rows() {
        *cells.entry((r.year, r.country_code.as_str())).or_default() += 1;
    }

    let counts: Vec<Vec<usize>> = years
        .iter()
        .map(|&y| {
            countries
                .iter()
                .map(|c| cells.get(&(y, c.as_str())).copied().unwrap_or(0))
                .collect()
        })
        .collect();
    let year_totals: Vec<usize> = counts.iter().map(|row| row.iter().sum()).collect();
    let country_totals: Vec<usize> =
        (0..countries.len()).map(|j| counts.iter().map(|row| row[j]).sum()).collect();

    CrossTab { years, countries, counts, year_totals, country_totals, total: panel.len() }
}

/// Distinct firms per country, sorted by country code.
pub fn firms_per_country(panel: &Panel) -> Vec<FirmCount> {
    let mut by_country: BTreeMap<&str, (&str, bool, BTreeSet<&str>)> = BTreeMap::new();
    for r in panel.rows() {
        let entry = by_country
            .entry(r.country_code.as_str())
            .or_insert_with(|| (r.country_name.as_str(), r.treated_country, BTreeSet::new()));
        entry.2.insert(r.firm_id.as_str());
    }
    by_country
        .into_iter()
        .map(|(code, (name, treated, firms))| FirmCount {
            country_code: code.to_string(),
            country_name: name.to_string(),
            treated_country: treated,
            n_firms: firms.len(),
        })
        .collect()
}

/// Mean, sd and quantiles of a numeric column (missing values skipped).
pub fn summarize_column(panel: &Panel, col: NumericColumn) -> ColumnSummary {
    let values = panel.column(col);
    let sorted = sorted_finite(&values);
    ColumnSummary {
        column: col.name().to_string(),
        n: sorted.len(),
        n_missing: values.len() - sorted.len(),
        mean: mean(&sorted),
        sd: sample_sd(&sorted),
        min: sorted.first().copied().unwrap_or(f64::NAN),
        p25: quantile_linear_sorted(&sorted, 0.25),
        median: quantile_linear_sorted(&sorted, 0.5),
        p75: quantile_linear_sorted(&sorted, 0.75),
        max: sorted.last().copied().unwrap_or(f64::NAN),
    }
}

/// Per-(year, treatment group) means, ordered by year then group
/// (control before treated). Cells with no non-missing value are skipped.
pub fn group_means_by_year(panel: &Panel, col: NumericColumn) -> Vec<GroupMean> {
    let mut cells: BTreeMap<(i32, bool), Vec<f64>> = BTreeMap::new();
    for (r, v) in panel.rows().iter().zip(panel.column(col)) {
        if let Some(v) = v.filter(|x| x.is_finite()) {
            cells.entry((r.year, r.treated_country)).or_default().push(v);
        }
    }
    cells
        .into_iter()
        .map(|((year, treated_country), vs)| GroupMean {
            year,
            treated_country,
            mean: mean(&vs),
            n: vs.len(),
        })
        .collect()
}

/// Panel shape and balance.
pub fn balance(panel: &Panel) -> BalanceSummary {
    let years = panel.years();
    let n_firms = panel.firms().len();
    BalanceSummary {
        n_obs: panel.len(),
        n_firms,
        n_years: years.len(),
        n_countries: panel.countries().len(),
        first_year: years.first().copied(),
        last_year: years.last().copied(),
        balanced: panel.len() == n_firms * years.len(),
    }
}

/// Full exploratory description for `col`.
pub fn describe(panel: &Panel, col: NumericColumn) -> PanelDescription {
    PanelDescription {
        balance: balance(panel),
        crosstab: year_country_crosstab(panel),
        firms_per_country: firms_per_country(panel),
        summary: summarize_column(panel, col),
        group_means: group_means_by_year(panel, col),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::test_support::obs;
    use approx::assert_relative_eq;

    fn unbalanced() -> Panel {
        Panel::new(vec![
            obs("A", "DEU", true, 2001, 0.10),
            obs("A", "DEU", true, 2002, 0.20),
            obs("B", "DEU", true, 2002, 0.30),
            obs("C", "FRA", false, 2001, 0.00),
            obs("C", "FRA", false, 2002, 0.05),
            obs("D", "ITA", false, 2002, 0.15),
        ])
        .unwrap()
    }

    #[test]
    fn crosstab_counts_and_totals() {
        let ct = year_country_crosstab(&unbalanced());
        assert_eq!(ct.years, vec![2001, 2002]);
        assert_eq!(ct.countries, vec!["DEU", "FRA", "ITA"]);
        assert_eq!(ct.counts, vec![vec![1, 1, 0], vec![2, 1, 1]]);
        assert_eq!(ct.year_totals, vec![2, 4]);
        assert_eq!(ct.country_totals, vec![3, 2, 1]);
        assert_eq!(ct.total, 6);
    }

    #[test]
    fn firm_counts_sum_to_distinct_firms() {
        let p = unbalanced();
        let fc = firms_per_country(&p);
        assert_eq!(fc.iter().map(|f| f.n_firms).collect::<Vec<_>>(), vec![2, 1, 1]);
        assert_eq!(fc.iter().map(|f| f.n_firms).sum::<usize>(), p.firms().len());
        assert!(fc[0].treated_country);
    }

    #[test]
    fn summary_skips_missing() {
        let p = unbalanced();
        let mut values = p.column(NumericColumn::Roa);
        values[5] = None;
        let p = p.with_column(NumericColumn::Roa, values).unwrap();
        let s = summarize_column(&p, NumericColumn::Roa);
        assert_eq!(s.n, 5);
        assert_eq!(s.n_missing, 1);
        assert_relative_eq!(s.mean, 0.13, epsilon = 1e-12);
        assert_relative_eq!(s.median, 0.10, epsilon = 1e-12);
        assert_relative_eq!(s.min, 0.0);
        assert_relative_eq!(s.max, 0.30);
    }

    #[test]
    fn group_means_by_year_and_group() {
        let gm = group_means_by_year(&unbalanced(), NumericColumn::Roa);
        assert_eq!(gm.len(), 4);
        assert_eq!((gm[0].year, gm[0].treated_country), (2001, false));
        assert_relative_eq!(gm[3].mean, 0.25, epsilon = 1e-12);
        assert_eq!(gm[3].n, 2);
        assert_relative_eq!(gm[2].mean, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn balance_detects_gaps() {
        let b = balance(&unbalanced());
        assert_eq!((b.n_obs, b.n_firms, b.n_years, b.n_countries), (6, 4, 2, 3));
        assert!(!b.balanced);
        assert_eq!(b.first_year, Some(2001));

        let empty = balance(&Panel::new(vec![]).unwrap());
        assert!(empty.balanced);
        assert_eq!(empty.last_year, None);
    }
}
