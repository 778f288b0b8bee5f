//! `didlab report`: run the whole walkthrough from an analysis spec and
//! write every artifact plus `report.txt` into one directory.

use anyhow::{Context, Result};
use dl_inference::{HdfeOlsEngine, cell_means, estimate_grid, event_study, summarize_simulation};
use dl_panel::describe::group_means_by_year;
use dl_panel::{Panel, TreatmentAssignment, describe, winsorize_panel};
use dl_viz::table;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::analysis_spec::ReportPlan;

/// Files written by a report run and the rendered text report.
#[derive(Debug, Clone)]
pub struct ReportOutputs {
    pub files: Vec<PathBuf>,
    pub text: String,
}

fn prepare_out_dir(dir: &Path, overwrite: bool) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            anyhow::bail!("output path exists but is not a directory: {}", dir.display());
        }
        if !overwrite && dir.read_dir()?.next().is_some() {
            anyhow::bail!(
                "output directory is not empty: {} (set output.overwrite: true)",
                dir.display()
            );
        }
    } else {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }
    Ok(())
}

fn write_artifact<T: Serialize>(dir: &Path, name: &str, value: &T, files: &mut Vec<PathBuf>) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote artifact");
    files.push(path);
    Ok(())
}

/// Treatment from the plan (re-applied to the flags) or inferred from them.
pub fn resolve_assignment(panel: &Panel, explicit: Option<&TreatmentAssignment>) -> Result<(Panel, TreatmentAssignment)> {
    match explicit {
        Some(a) => Ok((a.apply(panel)?, a.clone())),
        None => {
            let a = TreatmentAssignment::infer(panel)
                .context("could not infer treatment from panel flags; give treated countries and start year")?;
            Ok((panel.clone(), a))
        }
    }
}

pub fn run_report(plan: &ReportPlan) -> Result<ReportOutputs> {
    prepare_out_dir(&plan.out_dir, plan.overwrite)?;
    let dir = plan.out_dir.as_path();
    let engine = HdfeOlsEngine::new();
    let mut files = Vec::new();
    let mut header = format!("didlab report: {}\n", plan.name);
    if let Some(d) = &plan.description {
        header.push_str(d);
        header.push('\n');
    }
    let mut sections: Vec<String> = vec![header];

    let raw = dl_panel::io::read_panel(&plan.panel)
        .with_context(|| format!("failed to load panel {}", plan.panel.display()))?;
    let (panel, assignment) = resolve_assignment(&raw, plan.treatment.as_ref())?;
    let outcome = plan.outcome;

    // Describe
    let description = describe(&panel, outcome);
    let (winsorized, winsor_report) = winsorize_panel(&panel, outcome, plan.limits)?;
    sections.push(table::balance_table(&description.balance).render());
    sections.push(table::crosstab_table(&description.crosstab).render());
    sections.push(table::firm_count_table(&description.firms_per_country).render());
    sections.push(table::column_summary_table(&description.summary).render());
    sections.push(table::winsor_table(outcome.name(), &winsor_report).render());
    let artifact = dl_viz::describe_artifact(description, Some(winsor_report))?;
    write_artifact(dir, "describe.json", &artifact, &mut files)?;

    // Models
    let means = match cell_means(&panel, &assignment, outcome) {
        Ok(m) => {
            sections.push(table::cell_means_table(&m).render());
            Some(m)
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping cell means");
            None
        }
    };
    let grid = estimate_grid(
        &engine,
        &panel,
        &assignment,
        &plan.variants,
        outcome,
        plan.limits,
        plan.conf_level,
    )
    .context("DiD estimation failed")?;
    sections.push(table::models_table(&grid.estimates).render());
    let artifact =
        dl_viz::models_artifact(outcome.name(), assignment.start_year, means, grid.winsor, grid.estimates)?;
    write_artifact(dir, "models.json", &artifact, &mut files)?;

    // Event study + trends
    let es = match &plan.event_study {
        Some((spec, use_winsor)) => {
            let data = if *use_winsor { &winsorized } else { &panel };
            let es = event_study(&engine, data, &assignment, spec).context("event study failed")?;
            sections.push(table::event_study_table(&es).render());
            write_artifact(dir, "event_study.json", &dl_viz::event_study_artifact(&es)?, &mut files)?;
            Some((es, *use_winsor))
        }
        None => None,
    };
    let trends_source = match &es {
        Some((_, true)) => &winsorized,
        _ => &panel,
    };
    let trends = dl_viz::trends_artifact(
        outcome.name(),
        &group_means_by_year(trends_source, outcome),
        assignment.start_year,
        es.as_ref().map(|(e, _)| e),
    )?;
    write_artifact(dir, "trends.json", &trends, &mut files)?;

    // Simulation
    if let Some(sim_path) = &plan.simulation {
        let rows = dl_panel::io::read_simulation(sim_path)
            .with_context(|| format!("failed to load simulation results {}", sim_path.display()))?;
        let groups = summarize_simulation(&rows)?;
        sections.push(table::simulation_table(&groups).render());
        write_artifact(dir, "simulation.json", &dl_viz::simulation_artifact(rows.len(), groups)?, &mut files)?;
    }

    let text = sections.join("\n");
    let report_path = dir.join("report.txt");
    std::fs::write(&report_path, &text).with_context(|| format!("failed to write {}", report_path.display()))?;
    files.push(report_path);

    tracing::info!(dir = %dir.display(), files = files.len(), "report complete");
    Ok(ReportOutputs { files, text })
}
