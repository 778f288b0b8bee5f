//! Econometrics for firm-year panels.
//!
//! This module provides:
//! - **Fixed-effects absorption** (MAP alternating projections) with exact
//!   degrees-of-freedom accounting for two-way FE.
//! - **Covariance estimators**: IID, Liang–Zeger one-way clustered and
//!   Cameron–Gelbach–Miller two-way clustered.
//! - **Difference-in-Differences** builders (classic 2×2 OLS and TWFE).
//! - **Event study** with leads/lags around a common start year.

pub mod did;
pub mod event_study;
pub mod hdfe;
pub mod vcov;

pub use did::{
    ClusterScheme, DidCellMeans, DidEstimate, DidGrid, DidModel, DidSpec, DidVariant, cell_means,
    estimate_did, estimate_grid,
};
pub use event_study::{
    EventStudyCoefficient, EventStudyEstimate, EventStudySpec, event_study,
};
pub use hdfe::FixedEffectsSolver;
