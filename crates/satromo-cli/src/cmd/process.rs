use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use satromo_core::compute::HttpComputeService;
use satromo_core::config::Config;
use satromo_core::context::RunContext;
use satromo_core::pipeline::{self, ProcessReport};
use satromo_core::product::TriggerOutcome;
use satromo_core::readiness::DateReadiness;
use std::path::Path;

pub fn run(root: &Path, date: Option<NaiveDate>, force: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let as_of = date.unwrap_or_else(|| Utc::now().date_naive());
    let ctx = RunContext::detect(root, &config, as_of)
        .context("failed to determine run context")?;
    let compute = HttpComputeService::from_config(&config.service)
        .context("failed to create compute service client")?;

    let report = pipeline::run_process(&ctx, &config, &compute, force)
        .with_context(|| format!("process run for {as_of} failed"))?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &ProcessReport) {
    let rows = report
        .windows
        .iter()
        .map(|w| {
            let waiting: Vec<String> = w
                .dates
                .iter()
                .filter(|d| !d.readiness.is_ready())
                .map(|d| format!("{} ({})", d.date, readiness_label(&d.readiness)))
                .collect();
            vec![
                w.collection.clone(),
                format!("{}..{}", w.start, w.end),
                if w.is_ready() { "ready" } else { "not ready" }.to_string(),
                waiting.join(", "),
            ]
        })
        .collect();
    print_table(&["COLLECTION", "WINDOW", "STATE", "WAITING ON"], rows);

    if report.products.is_empty() {
        return;
    }
    println!();
    let rows = report
        .products
        .iter()
        .map(|p| {
            let (outcome, detail) = match &p.outcome {
                TriggerOutcome::Submitted {
                    filename, job_ids, ..
                } => ("submitted", format!("{filename} ({} jobs)", job_ids.len())),
                TriggerOutcome::StillRunning => ("skipped", "export still in flight".to_string()),
                TriggerOutcome::NoCandidateScene => ("skipped", "no candidate scene".to_string()),
                TriggerOutcome::NoNewImagery { last_scene_date } => {
                    ("skipped", format!("no imagery after {last_scene_date}"))
                }
            };
            vec![p.product.clone(), outcome.to_string(), detail]
        })
        .collect();
    print_table(&["PRODUCT", "OUTCOME", "DETAIL"], rows);
}

fn readiness_label(readiness: &DateReadiness) -> String {
    match readiness {
        DateReadiness::Asset => "asset".to_string(),
        DateReadiness::EmptyMarker => "no data".to_string(),
        DateReadiness::InFlight { job_id } => format!("in flight {job_id}"),
        DateReadiness::GenerationSubmitted { job_id } => format!("generating {job_id}"),
        DateReadiness::NoSourceData => "marked empty".to_string(),
    }
}
