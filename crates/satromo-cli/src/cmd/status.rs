use crate::output::{print_json, print_table};
use anyhow::Context;
use satromo_core::config::Config;
use satromo_core::context::StorePaths;
use satromo_core::product_status::ProductStatusTracker;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let paths = StorePaths::resolve(root, &config.files);
    let tracker = ProductStatusTracker::load(&paths.product_status)
        .with_context(|| format!("failed to read {}", paths.product_status.display()))?;

    if json {
        return print_json(&tracker.records());
    }

    if tracker.records().is_empty() {
        println!("No product status recorded.");
        return Ok(());
    }
    let rows = tracker
        .records()
        .iter()
        .map(|r| {
            vec![
                r.product.clone(),
                r.last_scene_date.to_string(),
                r.run_date.to_string(),
                r.status.to_string(),
            ]
        })
        .collect();
    print_table(&["PRODUCT", "LAST SCENE", "RUN DATE", "STATUS"], rows);
    Ok(())
}
