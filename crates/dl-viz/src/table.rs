//! Plain-text tables for terminal output and `report.txt`.

use dl_inference::{DidCellMeans, DidEstimate, EventStudyEstimate, SimulationSummary};
use dl_panel::{BalanceSummary, ColumnSummary, CrossTab, FirmCount, WinsorReport};

/// Column-aligned text table. The first column is left-aligned, the rest
/// right-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    title: Option<String>,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    /// Table with a header row.
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { title: None, header: header.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a row; short rows are padded with empty cells.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.header.len().max(row.len()), String::new());
        self.rows.push(row);
    }

    /// Number of body rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no body rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render with two-space column gaps and a dashed rule under the header.
    pub fn render(&self) -> String {
        let n_cols = self.rows.iter().map(Vec::len).chain([self.header.len()]).max().unwrap_or(0);
        let mut widths = vec![0usize; n_cols];
        for row in std::iter::once(&self.header).chain(&self.rows) {
            for (j, cell) in row.iter().enumerate() {
                widths[j] = widths[j].max(cell.chars().count());
            }
        }

        let fmt_row = |row: &[String]| {
            let cells: Vec<String> = (0..n_cols)
                .map(|j| {
                    let cell = row.get(j).map(String::as_str).unwrap_or("");
                    if j == 0 {
                        format!("{:<w$}", cell, w = widths[j])
                    } else {
                        format!("{:>w$}", cell, w = widths[j])
                    }
                })
                .collect();
            cells.join("  ").trim_end().to_string()
        };

        let mut out = String::new();
        if let Some(t) = &self.title {
            out.push_str(t);
            out.push('\n');
        }
        out.push_str(&fmt_row(&self.header));
        out.push('\n');
        let rule_len = widths.iter().sum::<usize>() + 2 * n_cols.saturating_sub(1);
        out.push_str(&"-".repeat(rule_len));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&fmt_row(row));
            out.push('\n');
        }
        out
    }
}

fn num(x: f64, prec: usize) -> String {
    if x.is_finite() { format!("{:.*}", prec, x) } else { "NA".to_string() }
}

fn opt(x: Option<f64>, prec: usize) -> String {
    x.map_or_else(|| "NA".to_string(), |v| num(v, prec))
}

/// Observations by year x country with totals.
pub fn crosstab_table(ct: &CrossTab) -> TextTable {
    let header = std::iter::once("year".to_string())
        .chain(ct.countries.iter().cloned())
        .chain(["total".to_string()]);
    let mut t = TextTable::new(header).with_title("Observations by year and country");
    for (i, year) in ct.years.iter().enumerate() {
        t.push_row(
            std::iter::once(year.to_string())
                .chain(ct.counts[i].iter().map(usize::to_string))
                .chain([ct.year_totals[i].to_string()]),
        );
    }
    t.push_row(
        std::iter::once("total".to_string())
            .chain(ct.country_totals.iter().map(usize::to_string))
            .chain([ct.total.to_string()]),
    );
    t
}

/// Distinct firms per country.
pub fn firm_count_table(counts: &[FirmCount]) -> TextTable {
    let mut t = TextTable::new(["country", "name", "treated", "firms"]).with_title("Firms per country");
    for c in counts {
        t.push_row([
            c.country_code.clone(),
            c.country_name.clone(),
            c.treated_country.to_string(),
            c.n_firms.to_string(),
        ]);
    }
    t
}

/// Panel shape.
pub fn balance_table(b: &BalanceSummary) -> TextTable {
    let mut t = TextTable::new(["", "value"]).with_title("Panel");
    let year = |y: Option<i32>| y.map_or_else(|| "NA".to_string(), |v| v.to_string());
    t.push_row(["observations".to_string(), b.n_obs.to_string()]);
    t.push_row(["firms".to_string(), b.n_firms.to_string()]);
    t.push_row(["countries".to_string(), b.n_countries.to_string()]);
    t.push_row(["years".to_string(), format!("{} ({}-{})", b.n_years, year(b.first_year), year(b.last_year))]);
    t.push_row(["balanced".to_string(), b.balanced.to_string()]);
    t
}

/// Summary statistics of one column.
pub fn column_summary_table(s: &ColumnSummary) -> TextTable {
    let mut t = TextTable::new(["column", "n", "missing", "mean", "sd", "min", "p25", "median", "p75", "max"])
        .with_title("Summary statistics");
    t.push_row([
        s.column.clone(),
        s.n.to_string(),
        s.n_missing.to_string(),
        num(s.mean, 4),
        num(s.sd, 4),
        num(s.min, 4),
        num(s.p25, 4),
        num(s.median, 4),
        num(s.p75, 4),
        num(s.max, 4),
    ]);
    t
}

/// Thresholds and clip counts of a winsorization pass.
pub fn winsor_table(column: &str, r: &WinsorReport) -> TextTable {
    let mut t = TextTable::new(["column", "p_lo", "p_hi", "lower", "upper", "clipped_lo", "clipped_hi"])
        .with_title("Winsorization");
    t.push_row([
        column.to_string(),
        num(r.limits.lower(), 2),
        num(r.limits.upper(), 2),
        opt(r.lower_threshold, 4),
        opt(r.upper_threshold, 4),
        r.n_clipped_lower.to_string(),
        r.n_clipped_upper.to_string(),
    ]);
    t
}

/// 2x2 cell means.
pub fn cell_means_table(m: &DidCellMeans) -> TextTable {
    let mut t = TextTable::new(["group", "pre", "post", "diff"]).with_title("Cell means");
    t.push_row([
        "treated".to_string(),
        num(m.treated_pre, 4),
        num(m.treated_post, 4),
        num(m.treated_post - m.treated_pre, 4),
    ]);
    t.push_row([
        "control".to_string(),
        num(m.control_pre, 4),
        num(m.control_post, 4),
        num(m.control_post - m.control_pre, 4),
    ]);
    t.push_row(["did".to_string(), String::new(), String::new(), num(m.att(), 4)]);
    t
}

/// One line per DiD variant.
pub fn models_table(models: &[DidEstimate]) -> TextTable {
    let mut t = TextTable::new(["model", "cluster", "outcome", "estimate", "se", "p", "ci_lower", "ci_upper", "n"])
        .with_title("DiD estimates");
    for m in models {
        let outcome = if m.winsorize { format!("{} (w)", m.outcome) } else { m.outcome.to_string() };
        t.push_row([
            m.model.to_string(),
            m.cluster.to_string(),
            outcome,
            num(m.did.estimate, 4),
            num(m.did.std_error, 4),
            num(m.did.p_value, 3),
            num(m.did.ci_lower, 4),
            num(m.did.ci_upper, 4),
            m.n_obs.to_string(),
        ]);
    }
    t
}

/// Event-study coefficients with the reference period marked.
pub fn event_study_table(es: &EventStudyEstimate) -> TextTable {
    let mut t = TextTable::new(["period", "year", "estimate", "se", "ci_lower", "ci_upper"])
        .with_title(format!("Event study ({}, clustered by {})", es.outcome, es.cluster));
    let mut rows: Vec<(i64, Vec<String>)> = es
        .coefficients
        .iter()
        .map(|c| {
            (
                c.period,
                vec![
                    c.period.to_string(),
                    (i64::from(es.start_year) + c.period).to_string(),
                    num(c.estimate, 4),
                    num(c.std_error, 4),
                    num(c.ci_lower, 4),
                    num(c.ci_upper, 4),
                ],
            )
        })
        .collect();
    rows.push((
        es.reference_period,
        vec![
            es.reference_period.to_string(),
            (i64::from(es.start_year) + es.reference_period).to_string(),
            "ref".to_string(),
        ],
    ));
    rows.sort_by_key(|(p, _)| *p);
    for (_, r) in rows {
        t.push_row(r);
    }
    t
}

/// Simulation summary, one line per group.
pub fn simulation_table(groups: &[SimulationSummary]) -> TextTable {
    let mut t = TextTable::new([
        "model", "effect", "cluster", "winsorize", "runs", "mean", "sd", "bias", "rmse", "power", "type1",
    ])
    .with_title("Simulation summary");
    for g in groups {
        t.push_row([
            g.model.clone(),
            num(g.true_effect, 3),
            g.cluster.clone(),
            g.winsorize.clone(),
            g.n_runs.to_string(),
            num(g.mean_estimate, 4),
            num(g.sd_estimate, 4),
            num(g.bias, 4),
            num(g.rmse, 4),
            num(g.power, 3),
            num(g.type1_error, 3),
        ]);
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_inference::{ClusterScheme, EventStudyCoefficient};
    use dl_panel::NumericColumn;

    #[test]
    fn columns_align() {
        let mut t = TextTable::new(["name", "value"]);
        t.push_row(["a", "1"]);
        t.push_row(["longer", "12345"]);
        let out = t.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "name    value");
        assert_eq!(lines[1], "-------------");
        assert_eq!(lines[2], "a           1");
        assert_eq!(lines[3], "longer  12345");
    }

    #[test]
    fn short_rows_padded() {
        let mut t = TextTable::new(["a", "b", "c"]).with_title("T");
        t.push_row(["x"]);
        assert_eq!(t.len(), 1);
        assert!(t.render().starts_with("T\n"));
    }

    #[test]
    fn crosstab_has_total_row_and_column() {
        let ct = CrossTab {
            years: vec![2001, 2002],
            countries: vec!["DEU".into(), "FRA".into()],
            counts: vec![vec![3, 1], vec![2, 0]],
            year_totals: vec![4, 2],
            country_totals: vec![5, 1],
            total: 6,
        };
        let out = crosstab_table(&ct).render();
        assert!(out.contains("total"));
        let last = out.lines().last().unwrap();
        assert!(last.starts_with("total") && last.ends_with('6'));
    }

    #[test]
    fn event_study_marks_reference() {
        let es = EventStudyEstimate {
            outcome: NumericColumn::Roa,
            cluster: ClusterScheme::Firm,
            reference_period: -1,
            start_year: 2003,
            coefficients: vec![EventStudyCoefficient {
                period: 0,
                estimate: 0.03,
                std_error: 0.01,
                p_value: 0.01,
                ci_lower: 0.01,
                ci_upper: 0.05,
            }],
            n_obs: 10,
            df_inference: 4.0,
            conf_level: 0.95,
        };
        let out = event_study_table(&es).render();
        let body: Vec<&str> = out.lines().skip(3).collect();
        assert!(body[0].starts_with("-1") && body[0].contains("ref"));
        assert!(body[1].starts_with('0'));
    }

    #[test]
    fn non_finite_rendered_as_na() {
        assert_eq!(num(f64::NAN, 2), "NA");
        assert_eq!(opt(None, 2), "NA");
        assert_eq!(num(0.12345, 3), "0.123");
    }
}
