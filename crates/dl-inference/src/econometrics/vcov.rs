//! Coefficient covariance estimators: IID, Liang-Zeger one-way clustered and
//! Cameron-Gelbach-Miller two-way clustered.
//!
//! All take the (possibly FE-demeaned) design `X`, residuals `e` and the
//! bread `(X'X)^{-1}`. `k` is the parameter count used in the `(N-1)/(N-K)`
//! small-sample factor.

use std::collections::HashMap;

use dl_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// `σ² (X'X)^{-1}` with `σ² = RSS / df_resid`.
pub fn iid_vcov(xtx_inv: &DMatrix<f64>, rss: f64, df_resid: f64) -> Result<DMatrix<f64>> {
    if df_resid <= 0.0 {
        return Err(Error::Computation(format!(
            "no residual degrees of freedom (df_resid = {df_resid})"
        )));
    }
    Ok(xtx_inv * (rss / df_resid))
}

/// Distinct clusters in `ids`.
pub fn n_clusters(ids: &[u64]) -> usize {
    let mut seen: Vec<u64> = ids.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Meat `Σ_g (X_g' e_g)(X_g' e_g)'` and the cluster count.
fn cluster_meat(x: &DMatrix<f64>, resid: &DVector<f64>, ids: &[u64]) -> (DMatrix<f64>, usize) {
    let p = x.ncols();
    let mut scores: HashMap<u64, DVector<f64>> = HashMap::new();
    for (i, &cid) in ids.iter().enumerate() {
        let s = scores.entry(cid).or_insert_with(|| DVector::zeros(p));
        let e = resid[i];
        for j in 0..p {
            s[j] += x[(i, j)] * e;
        }
    }
    let mut meat = DMatrix::zeros(p, p);
    for s in scores.values() {
        meat += s * s.transpose();
    }
    (meat, scores.len())
}

/// `G/(G-1) · (N-1)/(N-K)`, or 1 when undefined.
fn small_sample_factor(g: usize, n: usize, k: usize) -> f64 {
    let (g, n, k) = (g as f64, n as f64, k as f64);
    if g > 1.0 && n > k {
        (g / (g - 1.0)) * ((n - 1.0) / (n - k))
    } else {
        1.0
    }
}

/// One-way cluster-robust covariance. Returns `(V, G)`.
pub fn cluster_vcov(
    x: &DMatrix<f64>,
    resid: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    ids: &[u64],
    k: usize,
) -> Result<(DMatrix<f64>, usize)> {
    if ids.len() != x.nrows() {
        return Err(Error::Validation(format!(
            "cluster ids length ({}) != n ({})",
            ids.len(),
            x.nrows()
        )));
    }
    let (meat, g) = cluster_meat(x, resid, ids);
    if g < 2 {
        return Err(Error::Computation(format!("clustered SEs need >= 2 clusters, got {g}")));
    }
    let factor = small_sample_factor(g, x.nrows(), k);
    Ok((xtx_inv * meat * xtx_inv * factor, g))
}

/// Two-way clustered covariance `V_a + V_b − V_ab`, where `V_ab` clusters
/// on the (a, b) intersection. Returns `(V, [G_a, G_b])`.
///
/// The sum can lose positive-definiteness; negative diagonal entries are
/// floored at zero by [`standard_errors`].
pub fn twoway_cluster_vcov(
    x: &DMatrix<f64>,
    resid: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    a: &[u64],
    b: &[u64],
    k: usize,
) -> Result<(DMatrix<f64>, [usize; 2])> {
    let (va, ga) = cluster_vcov(x, resid, xtx_inv, a, k)?;
    let (vb, gb) = cluster_vcov(x, resid, xtx_inv, b, k)?;

    let mut pair_ids: HashMap<(u64, u64), u64> = HashMap::new();
    let ab: Vec<u64> = a
        .iter()
        .zip(b)
        .map(|(&ia, &ib)| {
            let next = pair_ids.len() as u64;
            *pair_ids.entry((ia, ib)).or_insert(next)
        })
        .collect();
    let (meat_ab, gab) = cluster_meat(x, resid, &ab);
    let vab = xtx_inv * meat_ab * xtx_inv * small_sample_factor(gab, x.nrows(), k);

    Ok((va + vb - vab, [ga, gb]))
}

/// `sqrt(max(diag(V), 0))`.
pub fn standard_errors(v: &DMatrix<f64>) -> Vec<f64> {
    (0..v.nrows()).map(|j| v[(j, j)].max(0.0).sqrt()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design() -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>) {
        // intercept + x, residuals correlated within pairs of rows
        let x = DMatrix::from_row_slice(
            8,
            2,
            &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0, 1.0, 6.0, 1.0, 7.0],
        );
        let e = DVector::from_vec(vec![0.5, 0.4, -0.3, -0.2, 0.6, 0.7, -0.9, -0.8]);
        let xtx_inv = (x.transpose() * &x).try_inverse().unwrap();
        (x, e, xtx_inv)
    }

    #[test]
    fn iid_scales_bread() {
        let (_, e, xtx_inv) = design();
        let rss = e.dot(&e);
        let v = iid_vcov(&xtx_inv, rss, 6.0).unwrap();
        assert_relative_eq!(v[(1, 1)], xtx_inv[(1, 1)] * rss / 6.0, epsilon = 1e-14);
        assert!(iid_vcov(&xtx_inv, rss, 0.0).is_err());
    }

    #[test]
    fn singleton_clusters_match_hc1() {
        let (x, e, xtx_inv) = design();
        let ids: Vec<u64> = (0..8).collect();
        let (v, g) = cluster_vcov(&x, &e, &xtx_inv, &ids, 2).unwrap();
        assert_eq!(g, 8);

        // HC1 = n/(n-k) (X'X)^-1 X' diag(e²) X (X'X)^-1
        let mut meat = DMatrix::zeros(2, 2);
        for i in 0..8 {
            let xi = x.row(i).transpose();
            meat += &xi * xi.transpose() * (e[i] * e[i]);
        }
        let hc1 = &xtx_inv * meat * &xtx_inv * (8.0 / 6.0);
        assert_relative_eq!(v[(1, 1)], hc1[(1, 1)], epsilon = 1e-12);
    }

    #[test]
    fn correlated_clusters_inflate_se() {
        let (x, e, xtx_inv) = design();
        let pairs: Vec<u64> = vec![0, 0, 1, 1, 2, 2, 3, 3];
        let (vc, _) = cluster_vcov(&x, &e, &xtx_inv, &pairs, 2).unwrap();
        let vi = iid_vcov(&xtx_inv, e.dot(&e), 6.0).unwrap();
        assert!(standard_errors(&vc)[1] > standard_errors(&vi)[1]);
    }

    #[test]
    fn twoway_with_identical_dimension_equals_oneway() {
        // V_a + V_a - V_a = V_a
        let (x, e, xtx_inv) = design();
        let ids: Vec<u64> = vec![0, 0, 1, 1, 2, 2, 3, 3];
        let (v1, _) = cluster_vcov(&x, &e, &xtx_inv, &ids, 2).unwrap();
        let (v2, g) = twoway_cluster_vcov(&x, &e, &xtx_inv, &ids, &ids, 2).unwrap();
        assert_eq!(g, [4, 4]);
        for (a, b) in v1.iter().zip(v2.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-14);
        }
    }

    #[test]
    fn single_cluster_rejected() {
        let (x, e, xtx_inv) = design();
        assert!(cluster_vcov(&x, &e, &xtx_inv, &[0; 8], 2).is_err());
        assert!(cluster_vcov(&x, &e, &xtx_inv, &[0; 3], 2).is_err());
        assert_eq!(n_clusters(&[3, 1, 3, 2]), 3);
    }
}
