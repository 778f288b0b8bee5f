//! Difference-in-Differences model builders.
//!
//! Two specifications of the same ATT:
//!
//! - **Classic**: `y = α + β₁·treated_country + β₂·post + δ·(treated_country×post) + ε`.
//! - **TWFE**: `y = α_firm + λ_year + δ·treated + ε`.
//!
//! Both are handed to a [`RegressionEngine`] as a [`RegressionProblem`];
//! the builders only materialise columns, fixed effects and clustering.
//!
//! # References
//!
//! - Angrist & Pischke, *Mostly Harmless Econometrics*, Ch. 5.
//! - Cameron, Gelbach & Miller (2011), "Robust Inference With Multiway
//!   Clustering." *JBES*.

use std::fmt;
use std::str::FromStr;

use dl_core::{
    ClusterSpec, CoefficientEstimate, Error, RegressionEngine, RegressionProblem, Result,
    DEFAULT_CONF_LEVEL,
};
use dl_panel::stats::mean;
use dl_panel::{NumericColumn, Panel, TreatmentAssignment, WinsorLimits, WinsorReport, winsorize_panel};
use serde::{Deserialize, Serialize};

/// Coefficient of the classic model's interaction term.
pub const CLASSIC_DID_TERM: &str = "treated_country:post";

/// Coefficient of the TWFE treatment indicator.
pub const TWFE_DID_TERM: &str = "treated";

/// DiD specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidModel {
    /// Pooled OLS with group, period and interaction terms.
    Classic,
    /// Firm and year fixed effects with a treatment indicator.
    Twfe,
}

impl DidModel {
    /// Lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            DidModel::Classic => "classic",
            DidModel::Twfe => "twfe",
        }
    }

    /// Name of the coefficient carrying the DiD estimate.
    pub fn did_term(&self) -> &'static str {
        match self {
            DidModel::Classic => CLASSIC_DID_TERM,
            DidModel::Twfe => TWFE_DID_TERM,
        }
    }
}

impl fmt::Display for DidModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DidModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "ols" => Ok(DidModel::Classic),
            "twfe" => Ok(DidModel::Twfe),
            other => Err(Error::Validation(format!(
                "unknown DiD model '{other}' (expected classic or twfe)"
            ))),
        }
    }
}

/// Standard-error clustering in panel terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterScheme {
    /// IID standard errors.
    None,
    /// Cluster by firm.
    Firm,
    /// Cluster by country.
    Country,
    /// Cluster by fiscal year.
    Year,
    /// Two-way clustering by firm and year.
    FirmYear,
}

impl ClusterScheme {
    /// Label used in artifacts and on the command line.
    pub fn label(&self) -> &'static str {
        match self {
            ClusterScheme::None => "none",
            ClusterScheme::Firm => "firm",
            ClusterScheme::Country => "country",
            ClusterScheme::Year => "year",
            ClusterScheme::FirmYear => "firm-year",
        }
    }

    /// Cluster ids for `panel`'s rows.
    pub fn to_spec(&self, panel: &Panel) -> ClusterSpec {
        match self {
            ClusterScheme::None => ClusterSpec::Iid,
            ClusterScheme::Firm => ClusterSpec::OneWay(panel.firm_index()),
            ClusterScheme::Country => ClusterSpec::OneWay(panel.country_index()),
            ClusterScheme::Year => ClusterSpec::OneWay(panel.year_index()),
            ClusterScheme::FirmYear => ClusterSpec::TwoWay(panel.firm_index(), panel.year_index()),
        }
    }
}

impl fmt::Display for ClusterScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClusterScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "iid" => Ok(ClusterScheme::None),
            "firm" => Ok(ClusterScheme::Firm),
            "country" => Ok(ClusterScheme::Country),
            "year" => Ok(ClusterScheme::Year),
            "firm-year" | "firm_year" | "twoway" => Ok(ClusterScheme::FirmYear),
            other => Err(Error::Validation(format!(
                "unknown cluster scheme '{other}' (expected none, firm, country, year, firm-year)"
            ))),
        }
    }
}

/// One DiD variant: model, clustering, and whether the outcome is winsorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DidVariant {
    /// Specification.
    pub model: DidModel,
    /// Standard-error clustering.
    pub cluster: ClusterScheme,
    /// Winsorize the outcome before fitting.
    #[serde(default)]
    pub winsorize: bool,
}

impl DidVariant {
    /// Short label, e.g. `twfe/firm/winsor`.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.model, self.cluster, if self.winsorize { "winsor" } else { "raw" })
    }

    /// Full model x cluster x winsorize grid, in that nesting order.
    pub fn grid(models: &[DidModel], clusters: &[ClusterScheme], winsorize: &[bool]) -> Vec<Self> {
        let mut out = Vec::with_capacity(models.len() * clusters.len() * winsorize.len());
        for &model in models {
            for &cluster in clusters {
                for &w in winsorize {
                    out.push(Self { model, cluster, winsorize: w });
                }
            }
        }
        out
    }
}

/// Everything needed to estimate one DiD variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DidSpec {
    /// Model, clustering and winsorization.
    pub variant: DidVariant,
    /// Outcome column.
    pub outcome: NumericColumn,
    /// Percentiles used when `variant.winsorize` is set.
    pub limits: WinsorLimits,
    /// Confidence level.
    pub conf_level: f64,
}

impl DidSpec {
    /// Spec with 1/99 limits and 95% intervals.
    pub fn new(variant: DidVariant, outcome: NumericColumn) -> Self {
        Self { variant, outcome, limits: WinsorLimits::default(), conf_level: DEFAULT_CONF_LEVEL }
    }
}

/// One fitted DiD variant.
#[derive(Debug, Clone, Serialize)]
pub struct DidEstimate {
    /// Specification.
    pub model: DidModel,
    /// Clustering.
    pub cluster: ClusterScheme,
    /// Outcome was winsorized.
    pub winsorize: bool,
    /// Outcome column.
    pub outcome: NumericColumn,
    /// The DiD coefficient.
    pub did: CoefficientEstimate,
    /// All reported coefficients.
    pub coefficients: Vec<CoefficientEstimate>,
    /// Observations used.
    pub n_obs: usize,
    /// Clusters per clustering dimension.
    pub n_clusters: Vec<usize>,
    /// Degrees of freedom behind the intervals.
    pub df_inference: f64,
    /// Within R².
    pub r_squared_within: f64,
    /// Engine that produced the fit.
    pub engine: String,
}

/// Mean outcome in the four treatment-group x period cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DidCellMeans {
    /// Treated countries, before the start year.
    pub treated_pre: f64,
    /// Treated countries, from the start year.
    pub treated_post: f64,
    /// Control countries, before the start year.
    pub control_pre: f64,
    /// Control countries, from the start year.
    pub control_post: f64,
}

impl DidCellMeans {
    /// `(T_post − T_pre) − (C_post − C_pre)`; equals the classic estimate.
    pub fn att(&self) -> f64 {
        (self.treated_post - self.treated_pre) - (self.control_post - self.control_pre)
    }
}

/// The 2x2 table of cell means. Fails if any cell has no outcome values.
pub fn cell_means(
    panel: &Panel,
    assignment: &TreatmentAssignment,
    outcome: NumericColumn,
) -> Result<DidCellMeans> {
    let mut cells: [Vec<f64>; 4] = Default::default();
    for (r, v) in panel.rows().iter().zip(panel.column(outcome)) {
        let Some(v) = v.filter(|x| x.is_finite()) else {
            continue;
        };
        let g = usize::from(assignment.is_treated_country(&r.country_code)) * 2
            + usize::from(assignment.is_post(r.year));
        cells[g].push(v);
    }
    let names = ["control_pre", "control_post", "treated_pre", "treated_post"];
    if let Some(i) = cells.iter().position(Vec::is_empty) {
        return Err(Error::Data(format!("DiD cell '{}' has no observations", names[i])));
    }
    Ok(DidCellMeans {
        control_pre: mean(&cells[0]),
        control_post: mean(&cells[1]),
        treated_pre: mean(&cells[2]),
        treated_post: mean(&cells[3]),
    })
}

/// Materialise a DiD variant as a regression problem (no winsorization).
pub fn build_problem(
    panel: &Panel,
    assignment: &TreatmentAssignment,
    model: DidModel,
    cluster: ClusterScheme,
    outcome: NumericColumn,
    conf_level: f64,
) -> RegressionProblem {
    let y = panel.column_f64(outcome);
    let indicator = |b: bool| if b { 1.0 } else { 0.0 };
    let problem = match model {
        DidModel::Classic => {
            let group: Vec<f64> = panel
                .rows()
                .iter()
                .map(|r| indicator(assignment.is_treated_country(&r.country_code)))
                .collect();
            let post: Vec<f64> =
                panel.rows().iter().map(|r| indicator(assignment.is_post(r.year))).collect();
            let interaction: Vec<f64> = group.iter().zip(&post).map(|(g, p)| g * p).collect();
            RegressionProblem::new(y)
                .with_intercept(true)
                .with_regressor("treated_country", group)
                .with_regressor("post", post)
                .with_regressor(CLASSIC_DID_TERM, interaction)
        }
        DidModel::Twfe => {
            let treated: Vec<f64> = panel
                .rows()
                .iter()
                .map(|r| indicator(assignment.is_treated(&r.country_code, r.year)))
                .collect();
            RegressionProblem::new(y)
                .with_regressor(TWFE_DID_TERM, treated)
                .with_fixed_effect(panel.firm_index())
                .with_fixed_effect(panel.year_index())
        }
    };
    problem.with_cluster(cluster.to_spec(panel)).with_conf_level(conf_level)
}

/// Fit one DiD variant.
pub fn estimate_did<E: RegressionEngine + ?Sized>(
    engine: &E,
    panel: &Panel,
    assignment: &TreatmentAssignment,
    spec: &DidSpec,
) -> Result<DidEstimate> {
    if spec.variant.winsorize {
        let (w, _) = winsorize_panel(panel, spec.outcome, spec.limits)?;
        fit_variant(engine, &w, assignment, spec)
    } else {
        fit_variant(engine, panel, assignment, spec)
    }
}

/// Estimates of a variant grid.
#[derive(Debug, Clone)]
pub struct DidGrid {
    /// One estimate per variant, in grid order.
    pub estimates: Vec<DidEstimate>,
    /// Winsorization shared by the winsorized variants, if any.
    pub winsor: Option<WinsorReport>,
}

/// Fit every variant; the outcome is winsorized once and shared.
pub fn estimate_grid<E: RegressionEngine + ?Sized>(
    engine: &E,
    panel: &Panel,
    assignment: &TreatmentAssignment,
    variants: &[DidVariant],
    outcome: NumericColumn,
    limits: WinsorLimits,
    conf_level: f64,
) -> Result<DidGrid> {
    let (winsorized, winsor) = if variants.iter().any(|v| v.winsorize) {
        let (w, report) = winsorize_panel(panel, outcome, limits)?;
        (Some(w), Some(report))
    } else {
        (None, None)
    };
    let estimates = variants
        .iter()
        .map(|&variant| {
            let spec = DidSpec { variant, outcome, limits, conf_level };
            let data = match (&winsorized, variant.winsorize) {
                (Some(w), true) => w,
                _ => panel,
            };
            fit_variant(engine, data, assignment, &spec)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DidGrid { estimates, winsor })
}

fn fit_variant<E: RegressionEngine + ?Sized>(
    engine: &E,
    panel: &Panel,
    assignment: &TreatmentAssignment,
    spec: &DidSpec,
) -> Result<DidEstimate> {
    let v = spec.variant;
    let problem = build_problem(panel, assignment, v.model, v.cluster, spec.outcome, spec.conf_level);
    let fit = engine.fit(&problem)?;
    let did = fit
        .coefficient(v.model.did_term())
        .cloned()
        .ok_or_else(|| Error::Computation(format!("engine did not report '{}'", v.model.did_term())))?;
    tracing::info!(
        variant = %v.label(),
        estimate = did.estimate,
        std_error = did.std_error,
        n_obs = fit.n_obs,
        "estimated DiD"
    );
    Ok(DidEstimate {
        model: v.model,
        cluster: v.cluster,
        winsorize: v.winsorize,
        outcome: spec.outcome,
        did,
        coefficients: fit.coefficients,
        n_obs: fit.n_obs,
        n_clusters: fit.n_clusters,
        df_inference: fit.df_inference,
        r_squared_within: fit.r_squared_within,
        engine: engine.name().to_string(),
    })
}
