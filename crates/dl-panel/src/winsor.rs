//! Winsorization: clip a numeric column at its lower/upper percentiles.
//!
//! Thresholds come from the linear-interpolation (type 7) quantile of the
//! finite values. Missing values and NaN are left untouched; infinities are
//! clipped like any other out-of-range value.

use dl_core::{Error, Result};
use serde::Serialize;

use crate::observation::{NumericColumn, Panel};
use crate::stats::{quantile_linear_sorted, sorted_finite};

/// Percentile levels used for clipping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WinsorLimits {
    lower: f64,
    upper: f64,
}

impl Default for WinsorLimits {
    /// 1st / 99th percentile.
    fn default() -> Self {
        Self { lower: 0.01, upper: 0.99 }
    }
}

impl WinsorLimits {
    /// Custom levels; requires `0 <= lower < upper <= 1`.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite() && 0.0 <= lower && lower < upper && upper <= 1.0)
        {
            return Err(Error::Validation(format!(
                "winsor limits must satisfy 0 <= lower < upper <= 1, got ({lower}, {upper})"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Lower percentile level.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper percentile level.
    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// What a winsorization pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinsorReport {
    /// Percentile levels.
    pub limits: WinsorLimits,
    /// Lower threshold (`None` when the column has no finite values).
    pub lower_threshold: Option<f64>,
    /// Upper threshold.
    pub upper_threshold: Option<f64>,
    /// Values raised to the lower threshold.
    pub n_clipped_lower: usize,
    /// Values lowered to the upper threshold.
    pub n_clipped_upper: usize,
    /// Missing (or NaN) values passed through.
    pub n_missing: usize,
}

/// Percentile thresholds of the finite values, or `None` if there are none.
pub fn winsor_thresholds(values: &[Option<f64>], limits: WinsorLimits) -> Option<(f64, f64)> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    Some((quantile_linear_sorted(&sorted, limits.lower), quantile_linear_sorted(&sorted, limits.upper)))
}

/// Clamp every present value to the fixed `[lo, hi]` range. NaN is left as is.
///
/// Exactly idempotent, unlike re-running [`winsorize`] on its own output.
pub fn clip_to(values: &[Option<f64>], lo: f64, hi: f64) -> (Vec<Option<f64>>, usize, usize) {
    let mut n_lo = 0usize;
    let mut n_hi = 0usize;
    let out = values
        .iter()
        .map(|v| match *v {
            Some(x) if x < lo => {
                n_lo += 1;
                Some(lo)
            }
            Some(x) if x > hi => {
                n_hi += 1;
                Some(hi)
            }
            other => other,
        })
        .collect();
    (out, n_lo, n_hi)
}

/// Winsorize a column of optional values.
pub fn winsorize(values: &[Option<f64>], limits: WinsorLimits) -> (Vec<Option<f64>>, WinsorReport) {
    let n_missing = values.iter().filter(|v| v.map_or(true, f64::is_nan)).count();
    match winsor_thresholds(values, limits) {
        Some((lo, hi)) => {
            let (out, n_clipped_lower, n_clipped_upper) = clip_to(values, lo, hi);
            let report = WinsorReport {
                limits,
                lower_threshold: Some(lo),
                upper_threshold: Some(hi),
                n_clipped_lower,
                n_clipped_upper,
                n_missing,
            };
            (out, report)
        }
        None => {
            let report = WinsorReport {
                limits,
                lower_threshold: None,
                upper_threshold: None,
                n_clipped_lower: 0,
                n_clipped_upper: 0,
                n_missing,
            };
            (values.to_vec(), report)
        }
    }
}

/// Winsorize a plain `f64` slice; NaN entries are treated as missing.
pub fn winsorize_f64(values: &[f64], limits: WinsorLimits) -> Vec<f64> {
    let opt: Vec<Option<f64>> = values.iter().map(|&v| if v.is_nan() { None } else { Some(v) }).collect();
    winsorize(&opt, limits).0.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

/// New panel with `col` winsorized.
pub fn winsorize_panel(
    panel: &Panel,
    col: NumericColumn,
    limits: WinsorLimits,
) -> Result<(Panel, WinsorReport)> {
    let (values, report) = winsorize(&panel.column(col), limits);
    tracing::info!(
        column = %col,
        lower = ?report.lower_threshold,
        upper = ?report.upper_threshold,
        clipped_lower = report.n_clipped_lower,
        clipped_upper = report.n_clipped_upper,
        "winsorized column"
    );
    Ok((panel.with_column(col, values)?, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::test_support::obs;
    use approx::assert_relative_eq;

    fn spread(n: usize) -> Vec<Option<f64>> {
        // Deterministic, heavy-tailed-ish sequence.
        (0..n)
            .map(|i| {
                let x = i as f64 / n as f64 - 0.5;
                Some(x * x * x * 100.0 + (i % 7) as f64 * 0.01)
            })
            .collect()
    }

    #[test]
    fn output_within_thresholds_and_interior_unchanged() {
        let values = spread(500);
        let (out, report) = winsorize(&values, WinsorLimits::default());
        let lo = report.lower_threshold.unwrap();
        let hi = report.upper_threshold.unwrap();
        assert_eq!(out.len(), values.len());
        for (orig, w) in values.iter().zip(&out) {
            let (o, w) = (orig.unwrap(), w.unwrap());
            assert!(w >= lo && w <= hi, "value {w} outside [{lo}, {hi}]");
            if o >= lo && o <= hi {
                assert_eq!(o, w);
            }
        }
        assert!(report.n_clipped_lower > 0);
        assert!(report.n_clipped_upper > 0);
    }

    #[test]
    fn thresholds_follow_type7_quantile() {
        let values: Vec<Option<f64>> = (1..=101).map(|i| Some(i as f64)).collect();
        let (lo, hi) = winsor_thresholds(&values, WinsorLimits::default()).unwrap();
        assert_relative_eq!(lo, 2.0, epsilon = 1e-12);
        assert_relative_eq!(hi, 100.0, epsilon = 1e-12);

        let (out, report) = winsorize(&values, WinsorLimits::default());
        assert_eq!(out[0], Some(2.0));
        assert_eq!(out[100], Some(100.0));
        assert_eq!(report.n_clipped_lower, 1);
        assert_eq!(report.n_clipped_upper, 1);
    }

    #[test]
    fn missing_values_pass_through() {
        let values = vec![Some(1.0), None, Some(2.0), Some(f64::NAN), Some(100.0)];
        let (out, report) = winsorize(&values, WinsorLimits::new(0.25, 0.75).unwrap());
        assert_eq!(out[1], None);
        assert!(out[3].unwrap().is_nan());
        assert_eq!(report.n_missing, 2);
        // finite sorted: [1, 2, 100]; q25 = 1.5, q75 = 51
        assert_eq!(out[0], Some(1.5));
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[4], Some(51.0));
    }

    #[test]
    fn all_missing_is_noop() {
        let values = vec![None, None];
        let (out, report) = winsorize(&values, WinsorLimits::default());
        assert_eq!(out, values);
        assert!(report.lower_threshold.is_none());
    }

    #[test]
    fn reapplying_only_moves_clipped_values() {
        let values = spread(1000);
        let (once, first) = winsorize(&values, WinsorLimits::default());
        let (twice, _) = winsorize(&once, WinsorLimits::default());
        let changed = once.iter().zip(&twice).filter(|(a, b)| a != b).count();
        assert!(changed <= first.n_clipped_lower + first.n_clipped_upper);
        assert!((changed as f64) / (values.len() as f64) <= 0.03);

        // Fixed thresholds are exactly idempotent.
        let (lo, hi) = (first.lower_threshold.unwrap(), first.upper_threshold.unwrap());
        let (again, n_lo, n_hi) = clip_to(&once, lo, hi);
        assert_eq!(again, once);
        assert_eq!((n_lo, n_hi), (0, 0));
    }

    #[test]
    fn infinities_are_clipped_not_missing() {
        let mut values: Vec<Option<f64>> = (1..=100).map(|i| Some(i as f64)).collect();
        values.push(Some(f64::INFINITY));
        values.push(Some(f64::NEG_INFINITY));
        values.push(None);
        let (out, report) = winsorize(&values, WinsorLimits::default());
        let lo = report.lower_threshold.unwrap();
        let hi = report.upper_threshold.unwrap();
        // Thresholds come from the finite values 1..=100.
        assert_relative_eq!(lo, 1.99, epsilon = 1e-12);
        assert_relative_eq!(hi, 99.01, epsilon = 1e-12);
        assert_eq!(out[100], Some(hi));
        assert_eq!(out[101], Some(lo));
        assert_eq!(out[102], None);
        assert!(out.iter().flatten().all(|&w| w >= lo && w <= hi));
        assert_eq!(report.n_missing, 1);
        assert_eq!(report.n_clipped_upper, 2);
        assert_eq!(report.n_clipped_lower, 2);

        let plain = winsorize_f64(&[f64::INFINITY, 0.0, 10.0], WinsorLimits::new(0.0, 0.5).unwrap());
        assert_eq!(plain, vec![5.0, 0.0, 5.0]);
    }

    #[test]
    fn winsorize_f64_keeps_nan() {
        let out = winsorize_f64(&[f64::NAN, 0.0, 10.0], WinsorLimits::new(0.0, 0.5).unwrap());
        assert!(out[0].is_nan());
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 5.0);
    }

    #[test]
    fn invalid_limits_rejected() {
        assert!(WinsorLimits::new(0.5, 0.5).is_err());
        assert!(WinsorLimits::new(-0.1, 0.9).is_err());
        assert!(WinsorLimits::new(0.1, 1.1).is_err());
    }

    #[test]
    fn winsorize_panel_is_pure() {
        let mut rows = Vec::new();
        for i in 0..50 {
            rows.push(obs(&format!("F{i}"), "DEU", true, 2001, i as f64));
        }
        let panel = Panel::new(rows).unwrap();
        let (w, report) =
            winsorize_panel(&panel, NumericColumn::Roa, WinsorLimits::new(0.1, 0.9).unwrap())
                .unwrap();
        assert_eq!(panel.column(NumericColumn::Roa)[0], Some(0.0));
        assert_relative_eq!(w.column(NumericColumn::Roa)[0].unwrap(), 4.9, epsilon = 1e-12);
        assert_eq!(report.n_clipped_lower, 5);
    }
}
