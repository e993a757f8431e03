use crate::output::{print_json, print_table};
use anyhow::Context;
use satromo_core::config::Config;
use satromo_core::context::StorePaths;
use satromo_core::job::Partition;
use satromo_core::ledger::JobLedger;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let paths = StorePaths::resolve(root, &config.files);
    let ledger = JobLedger::load(&paths.running_jobs)
        .with_context(|| format!("failed to read {}", paths.running_jobs.display()))?;
    let grouping = ledger.group_items();

    if json {
        return print_json(&grouping);
    }

    if ledger.is_empty() {
        println!("No export jobs in flight.");
        return Ok(());
    }

    let rows = grouping
        .items
        .iter()
        .map(|item| {
            let present: Vec<String> = item
                .partitions
                .keys()
                .map(|p| p.index().to_string())
                .collect();
            let jobs: Vec<&str> = item.entries().map(|(_, e)| e.job_id.as_str()).collect();
            vec![
                item.stem.clone(),
                format!("{}/{}", present.join(","), Partition::COUNT),
                jobs.join(" "),
            ]
        })
        .collect();
    print_table(&["ITEM", "PARTITIONS", "JOBS"], rows);

    if !grouping.ungrouped.is_empty() {
        println!();
        println!("Rows without a partition suffix:");
        for entry in &grouping.ungrouped {
            println!("  {}  {}", entry.job_id, entry.filename);
        }
    }
    Ok(())
}
