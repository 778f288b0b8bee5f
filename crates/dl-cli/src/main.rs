//! didlab CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dl_inference::{
    ClusterScheme, DidModel, DidVariant, EventStudySpec, HdfeOlsEngine, cell_means,
    estimate_grid, event_study, summarize_simulation,
};
use dl_panel::describe::group_means_by_year;
use dl_panel::{NumericColumn, Panel, SyntheticPanelConfig, TreatmentAssignment, WinsorLimits};
use dl_viz::table;
use std::path::{Path, PathBuf};

mod analysis_spec;
mod report;

#[derive(Parser)]
#[command(name = "didlab")]
#[command(about = "didlab - difference-in-differences on firm-year panels")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TreatmentArgs {
    /// Treated country codes (comma-separated). Inferred from the panel's
    /// `treated_country` / `treated` flags when omitted.
    #[arg(long, value_delimiter = ',', requires = "start_year")]
    treated: Vec<String>,

    /// First treated calendar year.
    #[arg(long, requires = "treated")]
    start_year: Option<i32>,
}

impl TreatmentArgs {
    fn assignment(&self) -> Option<TreatmentAssignment> {
        self.start_year.map(|y| TreatmentAssignment::new(self.treated.iter().cloned(), y))
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct WinsorArgs {
    /// Lower winsorization percentile.
    #[arg(long, default_value = "0.01")]
    lower: f64,

    /// Upper winsorization percentile.
    #[arg(long, default_value = "0.99")]
    upper: f64,
}

impl WinsorArgs {
    fn limits(&self) -> Result<WinsorLimits> {
        Ok(WinsorLimits::new(self.lower, self.upper)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutcomeMode {
    /// Raw outcome only
    Raw,
    /// Winsorized outcome only
    Winsor,
    /// Both
    Both,
}

impl OutcomeMode {
    fn flags(self) -> Vec<bool> {
        match self {
            Self::Raw => vec![false],
            Self::Winsor => vec![true],
            Self::Both => vec![false, true],
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cross tabs, firm counts, balance and a column summary
    Describe {
        /// Input panel (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Column to summarise
        #[arg(long, default_value = "roa")]
        column: NumericColumn,

        #[command(flatten)]
        winsor: WinsorArgs,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print text tables to stdout instead of JSON.
        #[arg(long)]
        table: bool,
    },

    /// Winsorize one column and write the new panel
    Winsorize {
        /// Input panel (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Column to winsorize
        #[arg(long, default_value = "roa")]
        column: NumericColumn,

        #[command(flatten)]
        winsor: WinsorArgs,

        /// Output panel (.csv or .parquet)
        #[arg(short, long)]
        output: PathBuf,

        /// Output file for the winsorization report (pretty JSON). Defaults to stdout.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Fit a grid of DiD variants (model x cluster x outcome)
    Estimate {
        /// Input panel (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Outcome column
        #[arg(long, default_value = "roa")]
        column: NumericColumn,

        /// Models (comma-separated: classic, twfe)
        #[arg(long, value_delimiter = ',', default_value = "classic,twfe")]
        models: Vec<DidModel>,

        /// Clustering schemes (comma-separated: none, firm, country, year, firm-year)
        #[arg(long, value_delimiter = ',', default_value = "none,firm")]
        clusters: Vec<ClusterScheme>,

        /// Raw outcome, winsorized outcome, or both
        #[arg(long, value_enum, default_value = "both")]
        outcome_mode: OutcomeMode,

        #[command(flatten)]
        treatment: TreatmentArgs,

        #[command(flatten)]
        winsor: WinsorArgs,

        /// Confidence level of the intervals
        #[arg(long, default_value = "0.95")]
        conf_level: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print text tables to stdout instead of JSON.
        #[arg(long)]
        table: bool,
    },

    /// Event study with firm and year fixed effects
    EventStudy {
        /// Input panel (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Outcome column
        #[arg(long, default_value = "roa")]
        column: NumericColumn,

        /// Clustering scheme
        #[arg(long, default_value = "firm")]
        cluster: ClusterScheme,

        /// Omitted period
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        reference: i64,

        /// Smallest offset with its own dummy. Requires `--window-max`.
        #[arg(long, requires = "window_max", allow_hyphen_values = true)]
        window_min: Option<i64>,

        /// Largest offset with its own dummy. Requires `--window-min`.
        #[arg(long, requires = "window_min", allow_hyphen_values = true)]
        window_max: Option<i64>,

        /// Winsorize the outcome first.
        #[arg(long)]
        winsorize: bool,

        #[command(flatten)]
        treatment: TreatmentArgs,

        #[command(flatten)]
        winsor: WinsorArgs,

        /// Confidence level of the intervals
        #[arg(long, default_value = "0.95")]
        conf_level: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print text tables to stdout instead of JSON.
        #[arg(long)]
        table: bool,
    },

    /// Per-year group means (parallel trends), optionally with event-study bands
    Trends {
        /// Input panel (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Outcome column
        #[arg(long, default_value = "roa")]
        column: NumericColumn,

        /// Attach event-study confidence bands to the treated group.
        #[arg(long)]
        bands: bool,

        /// Clustering scheme of the band event study
        #[arg(long, default_value = "firm")]
        cluster: ClusterScheme,

        /// Omitted period of the band event study
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        reference: i64,

        #[command(flatten)]
        treatment: TreatmentArgs,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarise precomputed Monte Carlo results
    SimSummary {
        /// Simulation results (.csv or .parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print text tables to stdout instead of JSON.
        #[arg(long)]
        table: bool,
    },

    /// Generate a seeded synthetic panel
    Synth {
        /// Generator config (YAML or JSON). Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the config seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the injected treatment effect
        #[arg(long, allow_hyphen_values = true)]
        effect: Option<f64>,

        /// Output panel (.csv or .parquet)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run an analysis spec end to end and write every artifact
    Report {
        /// Analysis spec (YAML, `didlab_analysis_spec_v0`)
        #[arg(long)]
        config: PathBuf,

        /// Override `output.dir`
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Allow writing into a non-empty output directory.
        #[arg(long)]
        overwrite: bool,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Describe { input, column, winsor, output, table } => {
            cmd_describe(&input, column, winsor.limits()?, output.as_ref(), table)
        }
        Commands::Winsorize { input, column, winsor, output, report } => {
            cmd_winsorize(&input, column, winsor.limits()?, &output, report.as_ref())
        }
        Commands::Estimate {
            input,
            column,
            models,
            clusters,
            outcome_mode,
            treatment,
            winsor,
            conf_level,
            output,
            table,
        } => {
            let variants = DidVariant::grid(&models, &clusters, &outcome_mode.flags());
            cmd_estimate(
                &input,
                column,
                &variants,
                &treatment,
                winsor.limits()?,
                conf_level,
                output.as_ref(),
                table,
            )
        }
        Commands::EventStudy {
            input,
            column,
            cluster,
            reference,
            window_min,
            window_max,
            winsorize,
            treatment,
            winsor,
            conf_level,
            output,
            table,
        } => {
            let spec = EventStudySpec {
                outcome: column,
                cluster,
                reference_period: reference,
                window: window_min.zip(window_max),
                conf_level,
            };
            let limits = if winsorize { Some(winsor.limits()?) } else { None };
            cmd_event_study(&input, &spec, limits, &treatment, output.as_ref(), table)
        }
        Commands::Trends { input, column, bands, cluster, reference, treatment, output } => {
            cmd_trends(&input, column, bands, cluster, reference, &treatment, output.as_ref())
        }
        Commands::SimSummary { input, output, table } => cmd_sim_summary(&input, output.as_ref(), table),
        Commands::Synth { config, seed, effect, output } => {
            cmd_synth(config.as_ref(), seed, effect, &output)
        }
        Commands::Report { config, out_dir, overwrite } => cmd_report(&config, out_dir, overwrite),
        Commands::Version => cmd_version(),
    }
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn load_panel(input: &Path) -> Result<Panel> {
    let panel = dl_panel::io::read_panel(input)
        .with_context(|| format!("failed to load panel {}", input.display()))?;
    tracing::info!(path = %input.display(), rows = panel.len(), "loaded panel");
    Ok(panel)
}

fn load_with_treatment(input: &Path, treatment: &TreatmentArgs) -> Result<(Panel, TreatmentAssignment)> {
    let raw = load_panel(input)?;
    let (panel, assignment) = report::resolve_assignment(&raw, treatment.assignment().as_ref())?;
    tracing::info!(
        treated = ?assignment.treated_countries,
        start_year = assignment.start_year,
        "treatment assignment"
    );
    Ok((panel, assignment))
}

fn log_winsor(column: NumericColumn, r: &dl_panel::WinsorReport) {
    tracing::info!(
        column = %column,
        lower = ?r.lower_threshold,
        upper = ?r.upper_threshold,
        clipped_lower = r.n_clipped_lower,
        clipped_upper = r.n_clipped_upper,
        "winsorized"
    );
}

fn cmd_describe(
    input: &Path,
    column: NumericColumn,
    limits: WinsorLimits,
    output: Option<&PathBuf>,
    as_table: bool,
) -> Result<()> {
    let panel = load_panel(input)?;
    let description = dl_panel::describe(&panel, column);
    let (_, winsor) = dl_panel::winsorize_panel(&panel, column, limits)?;
    log_winsor(column, &winsor);

    if as_table {
        let tables = [
            table::balance_table(&description.balance),
            table::crosstab_table(&description.crosstab),
            table::firm_count_table(&description.firms_per_country),
            table::column_summary_table(&description.summary),
            table::winsor_table(column.name(), &winsor),
        ];
        for t in &tables {
            println!("{}", t.render());
        }
        if output.is_none() {
            return Ok(());
        }
    }
    let artifact = dl_viz::describe_artifact(description, Some(winsor))?;
    write_json(output, serde_json::to_value(artifact)?)
}

fn cmd_winsorize(
    input: &Path,
    column: NumericColumn,
    limits: WinsorLimits,
    output: &Path,
    report: Option<&PathBuf>,
) -> Result<()> {
    let panel = load_panel(input)?;
    let (winsorized, r) = dl_panel::winsorize_panel(&panel, column, limits)?;
    log_winsor(column, &r);
    dl_panel::io::write_panel(output, &winsorized)
        .with_context(|| format!("failed to write panel {}", output.display()))?;
    write_json(
        report,
        serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "column": column.name(),
            "rows": winsorized.len(),
            "winsor": r,
        }),
    )
}

#[allow(clippy::too_many_arguments)]
fn cmd_estimate(
    input: &Path,
    column: NumericColumn,
    variants: &[DidVariant],
    treatment: &TreatmentArgs,
    limits: WinsorLimits,
    conf_level: f64,
    output: Option<&PathBuf>,
    as_table: bool,
) -> Result<()> {
    if variants.is_empty() {
        anyhow::bail!("empty model grid");
    }
    let (panel, assignment) = load_with_treatment(input, treatment)?;
    let engine = HdfeOlsEngine::new();

    let means = match cell_means(&panel, &assignment, column) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "skipping cell means");
            None
        }
    };
    let grid = estimate_grid(&engine, &panel, &assignment, variants, column, limits, conf_level)
        .context("DiD estimation failed")?;
    for m in &grid.estimates {
        tracing::info!(
            model = %m.model,
            cluster = %m.cluster,
            winsorize = m.winsorize,
            estimate = m.did.estimate,
            std_error = m.did.std_error,
            "fitted DiD variant"
        );
    }

    if let Some(r) = &grid.winsor {
        log_winsor(column, r);
    }

    if as_table {
        if let Some(m) = &means {
            println!("{}", table::cell_means_table(m).render());
        }
        println!("{}", table::models_table(&grid.estimates).render());
        if output.is_none() {
            return Ok(());
        }
    }
    let artifact =
        dl_viz::models_artifact(column.name(), assignment.start_year, means, grid.winsor, grid.estimates)?;
    write_json(output, serde_json::to_value(artifact)?)
}

fn cmd_event_study(
    input: &Path,
    spec: &EventStudySpec,
    winsor: Option<WinsorLimits>,
    treatment: &TreatmentArgs,
    output: Option<&PathBuf>,
    as_table: bool,
) -> Result<()> {
    let (panel, assignment) = load_with_treatment(input, treatment)?;
    let panel = match winsor {
        Some(limits) => {
            let (w, r) = dl_panel::winsorize_panel(&panel, spec.outcome, limits)?;
            log_winsor(spec.outcome, &r);
            w
        }
        None => panel,
    };
    let es = event_study(&HdfeOlsEngine::new(), &panel, &assignment, spec).context("event study failed")?;

    if as_table {
        println!("{}", table::event_study_table(&es).render());
        if output.is_none() {
            return Ok(());
        }
    }
    write_json(output, serde_json::to_value(dl_viz::event_study_artifact(&es)?)?)
}

fn cmd_trends(
    input: &Path,
    column: NumericColumn,
    bands: bool,
    cluster: ClusterScheme,
    reference: i64,
    treatment: &TreatmentArgs,
    output: Option<&PathBuf>,
) -> Result<()> {
    let (panel, assignment) = load_with_treatment(input, treatment)?;
    let es = if bands {
        let spec = EventStudySpec { cluster, reference_period: reference, ..EventStudySpec::new(column) };
        Some(event_study(&HdfeOlsEngine::new(), &panel, &assignment, &spec).context("event study failed")?)
    } else {
        None
    };
    let artifact = dl_viz::trends_artifact(
        column.name(),
        &group_means_by_year(&panel, column),
        assignment.start_year,
        es.as_ref(),
    )?;
    write_json(output, serde_json::to_value(artifact)?)
}

fn cmd_sim_summary(input: &Path, output: Option<&PathBuf>, as_table: bool) -> Result<()> {
    let rows = dl_panel::io::read_simulation(input)
        .with_context(|| format!("failed to load simulation results {}", input.display()))?;
    let groups = summarize_simulation(&rows)?;
    tracing::info!(rows = rows.len(), groups = groups.len(), "summarised simulation");

    if as_table {
        println!("{}", table::simulation_table(&groups).render());
        if output.is_none() {
            return Ok(());
        }
    }
    write_json(output, serde_json::to_value(dl_viz::simulation_artifact(rows.len(), groups)?)?)
}

fn read_synth_config(path: &Path) -> Result<SyntheticPanelConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_slice(&bytes).with_context(|| format!("invalid synth config {}", path.display()))
    } else {
        serde_yaml_ng::from_slice(&bytes).with_context(|| format!("invalid synth config {}", path.display()))
    }
}

fn cmd_synth(config: Option<&PathBuf>, seed: Option<u64>, effect: Option<f64>, output: &Path) -> Result<()> {
    let mut cfg = match config {
        Some(p) => read_synth_config(p)?,
        None => SyntheticPanelConfig::default(),
    };
    if let Some(s) = seed {
        cfg.seed = s;
    }
    if let Some(e) = effect {
        cfg.effect = e;
    }
    let panel = cfg.generate()?;
    dl_panel::io::write_panel(output, &panel)
        .with_context(|| format!("failed to write panel {}", output.display()))?;
    tracing::info!(path = %output.display(), rows = panel.len(), seed = cfg.seed, "wrote synthetic panel");

    write_json(
        None,
        serde_json::json!({
            "output": output.display().to_string(),
            "rows": panel.len(),
            "config": cfg,
            "assignment": cfg.assignment(),
        }),
    )
}

fn cmd_report(config: &Path, out_dir: Option<PathBuf>, overwrite: bool) -> Result<()> {
    let spec = analysis_spec::read_analysis_spec(config)?;
    let base_dir = config.parent().unwrap_or_else(|| Path::new("."));
    let mut plan = spec.plan(base_dir)?;
    if let Some(dir) = out_dir {
        plan.out_dir = dir;
    }
    plan.overwrite |= overwrite;
    tracing::info!(
        schema = %spec.schema_version,
        name = %plan.name,
        variants = plan.variants.len(),
        out_dir = %plan.out_dir.display(),
        "running report"
    );

    let outputs = report::run_report(&plan)?;
    for f in &outputs.files {
        tracing::debug!(path = %f.display(), "report file");
    }
    println!("{}", outputs.text);
    Ok(())
}

fn cmd_version() -> Result<()> {
    write_json(
        None,
        serde_json::json!({
            "tool": dl_viz::meta::TOOL,
            "version": dl_core::VERSION,
        }),
    )
}
