//! # dl-panel
//!
//! Firm-year panel data for didlab.
//!
//! This crate provides:
//! - The panel table ([`Panel`]) with its (firm, year) uniqueness invariant
//! - Country-level treatment assignment
//! - Winsorization (1st/99th percentile clipping)
//! - Descriptive aggregates (cross tabs, firm counts, column summaries)
//! - CSV / Parquet readers for panels and precomputed simulation results
//! - A seeded synthetic panel generator
//!
//! Every transform returns a new [`Panel`]; nothing is mutated in place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod describe;
pub mod io;
pub mod observation;
pub mod simulation;
pub mod stats;
pub mod synth;
pub mod treatment;
pub mod winsor;

pub use describe::{
    BalanceSummary, ColumnSummary, CrossTab, FirmCount, GroupMean, PanelDescription, describe,
};
pub use observation::{NumericColumn, Panel, PanelObservation};
pub use simulation::SimulationRow;
pub use synth::SyntheticPanelConfig;
pub use treatment::TreatmentAssignment;
pub use winsor::{WinsorLimits, WinsorReport, winsorize, winsorize_panel};
