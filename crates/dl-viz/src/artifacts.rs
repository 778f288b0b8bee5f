//! JSON artifacts for the descriptive, estimation and simulation stages.

use dl_core::Result;
use dl_inference::{DidCellMeans, DidEstimate, SimulationSummary};
use dl_panel::{PanelDescription, WinsorReport};
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Exploratory description of the panel.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Aggregates.
    #[serde(flatten)]
    pub description: PanelDescription,
    /// Effect of 1/99 winsorization on the summarised column, if computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winsor: Option<WinsorReport>,
}

/// Build the describe artifact.
pub fn describe_artifact(
    description: PanelDescription,
    winsor: Option<WinsorReport>,
) -> Result<DescribeArtifact> {
    Ok(DescribeArtifact {
        schema_version: "didlab_describe_v0".to_string(),
        meta: ArtifactMeta::now()?,
        description,
        winsor,
    })
}

/// DiD model grid results.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Outcome column.
    pub outcome: String,
    /// Treatment start year.
    pub start_year: i32,
    /// 2x2 cell means of the raw outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_means: Option<DidCellMeans>,
    /// Winsorization applied to winsorized variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winsor: Option<WinsorReport>,
    /// One entry per fitted variant.
    pub models: Vec<DidEstimate>,
}

/// Build the models artifact.
pub fn models_artifact(
    outcome: &str,
    start_year: i32,
    cell_means: Option<DidCellMeans>,
    winsor: Option<WinsorReport>,
    models: Vec<DidEstimate>,
) -> Result<ModelsArtifact> {
    Ok(ModelsArtifact {
        schema_version: "didlab_models_v0".to_string(),
        meta: ArtifactMeta::now()?,
        outcome: outcome.to_string(),
        start_year,
        cell_means,
        winsor,
        models,
    })
}

/// Simulation summary table.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationArtifact {
    /// Schema identifier.
    pub schema_version: String,
    /// Provenance.
    pub meta: ArtifactMeta,
    /// Rows read from the results table.
    pub n_rows: usize,
    /// One entry per (model, true effect, cluster, winsorize) group.
    pub groups: Vec<SimulationSummary>,
}

/// Build the simulation artifact.
pub fn simulation_artifact(n_rows: usize, groups: Vec<SimulationSummary>) -> Result<SimulationArtifact> {
    Ok(SimulationArtifact {
        schema_version: "didlab_simulation_v0".to_string(),
        meta: ArtifactMeta::now()?,
        n_rows,
        groups,
    })
}
