use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use satromo_core::compute::HttpComputeService;
use satromo_core::config::Config;
use satromo_core::context::RunContext;
use satromo_core::pipeline;
use satromo_core::reconcile::{ItemOutcome, ReconcileReport};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let ctx = RunContext::detect(root, &config, Utc::now().date_naive())
        .context("failed to determine run context")?;
    let compute = HttpComputeService::from_config(&config.service)
        .context("failed to create compute service client")?;
    let merger = pipeline::gdal_merger(&ctx, &config);
    let transfer = pipeline::rclone_transfer(&ctx);

    let report = pipeline::run_publish(&ctx, &compute, &merger, &transfer)
        .context("publish run failed")?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    let failures = report.publish_failures();
    let unpolled = report.poll_failures();
    if failures > 0 || unpolled > 0 {
        anyhow::bail!("{failures} item(s) failed to publish, {unpolled} item(s) could not be polled");
    }
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    if report.items.is_empty() && report.ungrouped.is_empty() {
        println!("Nothing to publish.");
        return;
    }
    let rows = report
        .items
        .iter()
        .map(|i| {
            let (state, detail) = match &i.outcome {
                ItemOutcome::Waiting { pending } => ("waiting", pending.join(" ")),
                ItemOutcome::Incomplete { missing } => {
                    let missing: Vec<String> = missing.iter().map(u8::to_string).collect();
                    ("incomplete", format!("missing partitions {}", missing.join(",")))
                }
                ItemOutcome::Abandoned { missing, .. } => {
                    let missing: Vec<String> = missing.iter().map(u8::to_string).collect();
                    ("abandoned", format!("never submitted partitions {}", missing.join(",")))
                }
                ItemOutcome::PollFailed { job_id, reason } => ("poll failed", format!("{job_id}: {reason}")),
                ItemOutcome::Failed { failed, .. } => ("failed", failed.join(" ")),
                ItemOutcome::Published { destination, .. } => ("published", destination.clone()),
                ItemOutcome::PublishFailed { reason } => ("publish failed", reason.clone()),
            };
            vec![i.stem.clone(), state.to_string(), detail]
        })
        .collect();
    print_table(&["ITEM", "STATE", "DETAIL"], rows);

    for entry in &report.ungrouped {
        println!("skipped {} ({}): no partition suffix", entry.job_id, entry.filename);
    }
}
