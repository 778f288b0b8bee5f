//! # dl-viz
//!
//! Visualization data artifacts for didlab.
//!
//! Emits plot-friendly JSON structures (arrays instead of nested objects
//! where a plot consumes columns) and plain-text tables. No rendering.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Describe / models / simulation artifacts.
pub mod artifacts;

/// Event-study bands and parallel-trends rows.
pub mod event_band;

/// Provenance block.
pub mod meta;

/// Text tables.
pub mod table;

pub use artifacts::{
    DescribeArtifact, ModelsArtifact, SimulationArtifact, describe_artifact, models_artifact,
    simulation_artifact,
};
pub use event_band::{
    EventStudyArtifact, PeriodInterval, TrendBandRow, TrendsArtifact, band_rows,
    event_study_artifact, reconstruct_intervals, trends_artifact,
};
pub use meta::ArtifactMeta;
pub use table::TextTable;
