//! Analysis spec v0 (YAML) parsing + semantic validation.
//!
//! A single YAML file drives load → describe → estimate → event study →
//! simulation summary → report.

use anyhow::{Context, Result};
use dl_inference::econometrics::event_study::DEFAULT_REFERENCE_PERIOD;
use dl_inference::{ClusterScheme, DidModel, DidVariant, EventStudySpec};
use dl_panel::{NumericColumn, TreatmentAssignment, WinsorLimits};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SPEC_V0: &str = "didlab_analysis_spec_v0";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSpecV0 {
    pub schema_version: String,
    #[serde(default)]
    pub analysis: Option<AnalysisMeta>,
    pub inputs: Inputs,
    #[serde(default)]
    pub treatment: Option<TreatmentSection>,
    #[serde(default = "default_outcome")]
    pub outcome: NumericColumn,
    #[serde(default)]
    pub winsor: WinsorSection,
    #[serde(default)]
    pub models: ModelGrid,
    #[serde(default)]
    pub event_study: Option<EventStudySection>,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inputs {
    pub panel: PathBuf,
    #[serde(default)]
    pub simulation: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreatmentSection {
    pub treated_countries: Vec<String>,
    pub start_year: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WinsorSection {
    #[serde(default = "default_lower")]
    pub lower: f64,
    #[serde(default = "default_upper")]
    pub upper: f64,
}

impl Default for WinsorSection {
    fn default() -> Self {
        Self { lower: default_lower(), upper: default_upper() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelGrid {
    #[serde(default = "default_models")]
    pub models: Vec<DidModel>,
    #[serde(default = "default_clusters")]
    pub clusters: Vec<ClusterScheme>,
    #[serde(default = "default_winsorize")]
    pub winsorize: Vec<bool>,
    #[serde(default = "default_conf_level")]
    pub conf_level: f64,
}

impl Default for ModelGrid {
    fn default() -> Self {
        Self {
            models: default_models(),
            clusters: default_clusters(),
            winsorize: default_winsorize(),
            conf_level: default_conf_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventStudySection {
    #[serde(default = "default_es_cluster")]
    pub cluster: ClusterScheme,
    #[serde(default = "default_reference")]
    pub reference_period: i64,
    #[serde(default)]
    pub window: Option<(i64, i64)>,
    #[serde(default)]
    pub winsorize: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub dir: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

fn default_outcome() -> NumericColumn {
    NumericColumn::Roa
}

fn default_lower() -> f64 {
    0.01
}

fn default_upper() -> f64 {
    0.99
}

fn default_models() -> Vec<DidModel> {
    vec![DidModel::Classic, DidModel::Twfe]
}

fn default_clusters() -> Vec<ClusterScheme> {
    vec![ClusterScheme::None, ClusterScheme::Firm]
}

fn default_winsorize() -> Vec<bool> {
    vec![false, true]
}

fn default_conf_level() -> f64 {
    dl_core::DEFAULT_CONF_LEVEL
}

fn default_es_cluster() -> ClusterScheme {
    ClusterScheme::Firm
}

fn default_reference() -> i64 {
    DEFAULT_REFERENCE_PERIOD
}

/// Everything the report needs, with paths resolved against the spec file.
#[derive(Debug, Clone)]
pub struct ReportPlan {
    pub name: String,
    pub description: Option<String>,
    pub panel: PathBuf,
    pub simulation: Option<PathBuf>,
    pub treatment: Option<TreatmentAssignment>,
    pub outcome: NumericColumn,
    pub limits: WinsorLimits,
    pub variants: Vec<DidVariant>,
    pub conf_level: f64,
    pub event_study: Option<(EventStudySpec, bool)>,
    pub out_dir: PathBuf,
    pub overwrite: bool,
}

pub fn read_analysis_spec(path: &Path) -> Result<AnalysisSpecV0> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read analysis spec {}", path.display()))?;

    let header: serde_yaml_ng::Value = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("{} is not valid YAML", path.display()))?;
    let schema_version = header.get("schema_version").and_then(|v| v.as_str()).map(str::to_string);
    if schema_version.as_deref() != Some(SPEC_V0) {
        anyhow::bail!(
            "{}: unsupported schema_version {:?} (expected {SPEC_V0})",
            path.display(),
            schema_version
        );
    }

    serde_yaml_ng::from_slice(&bytes).with_context(|| format!("invalid analysis spec {}", path.display()))
}

impl AnalysisSpecV0 {
    /// Validate and resolve relative paths against `base_dir`.
    pub fn plan(&self, base_dir: &Path) -> Result<ReportPlan> {
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base_dir.join(p) };

        let g = &self.models;
        if g.models.is_empty() || g.clusters.is_empty() || g.winsorize.is_empty() {
            anyhow::bail!("models: models, clusters and winsorize must be non-empty");
        }
        if !(g.conf_level > 0.0 && g.conf_level < 1.0) {
            anyhow::bail!("models.conf_level must be in (0,1), got {}", g.conf_level);
        }
        let limits = WinsorLimits::new(self.winsor.lower, self.winsor.upper)?;

        let treatment = match &self.treatment {
            Some(t) => {
                if t.treated_countries.is_empty() {
                    anyhow::bail!("treatment.treated_countries must be non-empty");
                }
                Some(TreatmentAssignment::new(t.treated_countries.iter().cloned(), t.start_year))
            }
            None => None,
        };

        let event_study = match &self.event_study {
            Some(es) => {
                if let Some((lo, hi)) = es.window {
                    if lo > hi {
                        anyhow::bail!("event_study.window: min ({lo}) > max ({hi})");
                    }
                }
                let spec = EventStudySpec {
                    outcome: self.outcome,
                    cluster: es.cluster,
                    reference_period: es.reference_period,
                    window: es.window,
                    conf_level: g.conf_level,
                };
                Some((spec, es.winsorize))
            }
            None => None,
        };

        Ok(ReportPlan {
            name: self.analysis.as_ref().map(|a| a.name.clone()).unwrap_or_else(|| "didlab".to_string()),
            description: self
                .analysis
                .as_ref()
                .and_then(|a| a.description.as_deref())
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            panel: resolve(&self.inputs.panel),
            simulation: self.inputs.simulation.as_deref().map(resolve),
            treatment,
            outcome: self.outcome,
            limits,
            variants: DidVariant::grid(&g.models, &g.clusters, &g.winsorize),
            conf_level: g.conf_level,
            event_study,
            out_dir: resolve(&self.output.dir),
            overwrite: self.output.overwrite,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AnalysisSpecV0 {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn minimal_spec_uses_defaults() {
        let spec = parse(
            r#"
schema_version: didlab_analysis_spec_v0
inputs:
  panel: data/panel.csv
output:
  dir: out
"#,
        );
        let plan = spec.plan(Path::new("/base")).unwrap();
        assert_eq!(plan.panel, PathBuf::from("/base/data/panel.csv"));
        assert_eq!(plan.out_dir, PathBuf::from("/base/out"));
        assert_eq!(plan.outcome, NumericColumn::Roa);
        assert_eq!(plan.variants.len(), 2 * 2 * 2);
        assert!(plan.treatment.is_none());
        assert!(plan.event_study.is_none());
        assert_eq!(plan.name, "didlab");
        assert!(plan.description.is_none());
    }

    #[test]
    fn full_spec() {
        let spec = parse(
            r#"
schema_version: didlab_analysis_spec_v0
analysis:
  name: eu-reform
  description: "  2003 reform, EU sample  "
inputs:
  panel: /abs/panel.parquet
  simulation: sims.csv
treatment:
  treated_countries: [DEU]
  start_year: 2003
outcome: roa
winsor: { lower: 0.05, upper: 0.95 }
models:
  models: [twfe]
  clusters: [firm, firm-year]
  winsorize: [true]
event_study:
  cluster: country
  window: [-2, 1]
output:
  dir: out
  overwrite: true
"#,
        );
        let plan = spec.plan(Path::new("/base")).unwrap();
        assert_eq!(plan.name, "eu-reform");
        assert_eq!(plan.description.as_deref(), Some("2003 reform, EU sample"));
        assert_eq!(plan.panel, PathBuf::from("/abs/panel.parquet"));
        assert_eq!(plan.simulation, Some(PathBuf::from("/base/sims.csv")));
        assert_eq!(plan.treatment.unwrap().start_year, 2003);
        assert_eq!(plan.variants.len(), 2);
        assert_eq!(plan.variants[1].cluster, ClusterScheme::FirmYear);
        let (es, winsorize) = plan.event_study.unwrap();
        assert_eq!(es.window, Some((-2, 1)));
        assert_eq!(es.reference_period, -1);
        assert!(!winsorize);
        assert!(plan.overwrite);
    }

    #[test]
    fn invalid_specs_rejected() {
        let bad_grid = parse(
            r#"
schema_version: didlab_analysis_spec_v0
inputs: { panel: p.csv }
models: { models: [] }
output: { dir: out }
"#,
        );
        assert!(bad_grid.plan(Path::new(".")).is_err());

        let bad_winsor = parse(
            r#"
schema_version: didlab_analysis_spec_v0
inputs: { panel: p.csv }
winsor: { lower: 0.9, upper: 0.1 }
output: { dir: out }
"#,
        );
        assert!(bad_winsor.plan(Path::new(".")).is_err());

        let unknown = serde_yaml_ng::from_str::<AnalysisSpecV0>(
            "schema_version: didlab_analysis_spec_v0\ninputs: { panel: p.csv }\noutput: { dir: o }\nextra: 1\n",
        );
        assert!(unknown.is_err());

        let unknown_meta = serde_yaml_ng::from_str::<AnalysisSpecV0>(
            "schema_version: didlab_analysis_spec_v0\nanalysis: { name: a, author: b }\ninputs: { panel: p.csv }\noutput: { dir: o }\n",
        );
        let err = unknown_meta.unwrap_err().to_string();
        assert!(err.contains("author"), "{err}");
    }
}
