//! The two scheduled passes: `process` submits, `publish` reconciles.

use crate::compute::ComputeService;
use crate::config::Config;
use crate::context::{RunContext, Stores};
use crate::error::Result;
use crate::product::{ExportSettings, ProductRegistry, ProductTrigger, TriggerOutcome};
use crate::readiness::{collection_windows, ReadinessGate, WindowReport};
use crate::reconcile::{PublishTarget, ReconcileReport, Reconciler};
use crate::tools::{FileTransfer, GdalMerger, RasterMerger, RcloneTransfer};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct ProductRun {
    pub product: String,
    pub collection: String,
    #[serde(flatten)]
    pub outcome: TriggerOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub windows: Vec<WindowReport>,
    pub products: Vec<ProductRun>,
}

/// Check every collection window and trigger the products of the ready ones.
pub fn run_process(
    ctx: &RunContext,
    config: &Config,
    compute: &dyn ComputeService,
    force: bool,
) -> Result<ProcessReport> {
    let registry = ProductRegistry::new(config.products.clone());
    let windows = collection_windows(&registry, &config.collections)?;
    let mut stores = Stores::load(&ctx.paths)?;
    let mut report = ProcessReport::default();

    tracing::info!(
        environment = %ctx.environment,
        as_of = %ctx.as_of,
        collections = windows.len(),
        products = registry.len(),
        "process run"
    );

    for window in &windows {
        let check = ReadinessGate::new(
            compute,
            &mut stores.completed,
            &mut stores.markers,
            config.roi,
            &config.output_crs,
        )
        .check_window(window, ctx.as_of)?;
        let ready = check.is_ready();
        report.windows.push(check);
        if !ready {
            for product in &window.products {
                tracing::info!(product = %product, collection = %window.collection, "waiting for collection");
            }
            continue;
        }

        let settings = ExportSettings {
            region: config.roi,
            crs: &config.output_crs,
            nodata: config.merge.nodata,
            processing_dir: &ctx.paths.processing_dir,
        };
        let mut trigger =
            ProductTrigger::new(compute, &mut stores.ledger, &mut stores.status, settings)
                .force(force);
        for product in registry.consumers(&window.collection) {
            let outcome = trigger.run(product, ctx.as_of)?;
            report.products.push(ProductRun {
                product: product.name.clone(),
                collection: window.collection.clone(),
                outcome,
            });
        }
    }
    Ok(report)
}

/// Reconcile every item in the ledger.
pub fn run_publish(
    ctx: &RunContext,
    compute: &dyn ComputeService,
    merger: &dyn RasterMerger,
    transfer: &dyn FileTransfer,
) -> Result<ReconcileReport> {
    let mut stores = Stores::load(&ctx.paths)?;
    let mount = ctx.drive_mount();
    let target = PublishTarget {
        drive_mount: &mount,
        processing_dir: &ctx.paths.processing_dir,
        destination: &ctx.settings.destination,
    };
    tracing::info!(
        environment = %ctx.environment,
        rows = stores.ledger.entries().len(),
        "publish run"
    );
    Reconciler::new(compute, merger, transfer, &mut stores, target).reconcile()
}

pub fn gdal_merger(ctx: &RunContext, config: &Config) -> GdalMerger {
    GdalMerger {
        buildvrt: config.merge.buildvrt_binary.clone(),
        warp: config.merge.warp_binary.clone(),
        cutline: config.merge.cutline.as_deref().map(|p| ctx.resolve(p)),
        nodata: config.merge.nodata,
        timeout: Duration::from_secs(config.merge.timeout_seconds),
        work_dir: ctx.paths.processing_dir.clone(),
    }
}

pub fn rclone_transfer(ctx: &RunContext) -> RcloneTransfer {
    let binary = &ctx.settings.transfer_binary;
    RcloneTransfer {
        // bare names are looked up on PATH
        binary: if binary.components().count() > 1 {
            ctx.resolve(binary)
        } else {
            binary.clone()
        },
        config: ctx.settings.transfer_config.as_deref().map(|p| ctx.resolve(p)),
        timeout: Duration::from_secs(ctx.settings.transfer_timeout_seconds),
    }
}
