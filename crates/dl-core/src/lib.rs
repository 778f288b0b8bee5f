//! # dl-core
//!
//! Core types, traits, and error handling for didlab.
//!
//! This crate provides:
//! - Common error types
//! - The `RegressionEngine` trait (the estimation collaborator)
//! - Shared regression problem / result structures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::RegressionEngine;
pub use types::{
    ClusterSpec, CoefficientEstimate, DEFAULT_CONF_LEVEL, RegressionFit, RegressionProblem, Regressor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
