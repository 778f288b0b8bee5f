//! # dl-inference
//!
//! Estimation layer for didlab.
//!
//! - [`engine::HdfeOlsEngine`]: the default [`dl_core::RegressionEngine`]
//!   (fixed-effects OLS with IID / clustered inference)
//! - [`econometrics`]: DiD and event-study model builders
//! - [`simulation`]: summaries of precomputed Monte Carlo results

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod econometrics;
pub mod engine;
pub mod simulation;

pub use econometrics::{
    ClusterScheme, DidCellMeans, DidEstimate, DidGrid, DidModel, DidSpec, DidVariant, EventStudyCoefficient,
    EventStudyEstimate, EventStudySpec, cell_means, estimate_did, estimate_grid, event_study,
};
pub use engine::HdfeOlsEngine;
pub use simulation::{SimulationSummary, summarize_simulation};
