//! Reading panels and simulation tables from disk.
//!
//! Format is chosen by file extension: `.csv` or `.parquet` / `.pq`.

pub mod csv;
pub mod parquet;

use std::path::Path;

use crate::observation::Panel;
use crate::simulation::SimulationRow;

/// Error type for panel / simulation IO.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet read/write error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("column '{col}' has wrong type: expected {expected}, got {actual}")]
    WrongType { col: String, expected: String, actual: String },

    #[error("row {row}: column '{col}' is null")]
    NullValue { row: usize, col: String },

    #[error("unsupported file extension for {0} (expected .csv or .parquet)")]
    UnsupportedFormat(String),

    #[error("invalid data: {0}")]
    Invalid(#[from] dl_core::Error),
}

/// Supported on-disk table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// Apache Parquet.
    Parquet,
}

impl TableFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, ReadError> {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(TableFormat::Csv),
            Some("parquet") | Some("pq") => Ok(TableFormat::Parquet),
            _ => Err(ReadError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Read a panel table (CSV or Parquet).
pub fn read_panel(path: &Path) -> Result<Panel, ReadError> {
    tracing::info!(path = %path.display(), "loading panel");
    let panel = match TableFormat::from_path(path)? {
        TableFormat::Csv => csv::read_panel_csv(path)?,
        TableFormat::Parquet => parquet::read_panel_parquet(path)?,
    };
    tracing::info!(rows = panel.len(), firms = panel.firms().len(), "panel loaded");
    Ok(panel)
}

/// Write a panel table (CSV or Parquet).
pub fn write_panel(path: &Path, panel: &Panel) -> Result<(), ReadError> {
    match TableFormat::from_path(path)? {
        TableFormat::Csv => csv::write_panel_csv(path, panel),
        TableFormat::Parquet => parquet::write_panel_parquet(path, panel),
    }
}

/// Read a precomputed simulation results table (CSV or Parquet).
pub fn read_simulation(path: &Path) -> Result<Vec<SimulationRow>, ReadError> {
    tracing::info!(path = %path.display(), "loading simulation results");
    let rows = match TableFormat::from_path(path)? {
        TableFormat::Csv => csv::read_simulation_csv(path)?,
        TableFormat::Parquet => parquet::read_simulation_parquet(path)?,
    };
    for r in &rows {
        r.validate()?;
    }
    tracing::info!(rows = rows.len(), "simulation results loaded");
    Ok(rows)
}
