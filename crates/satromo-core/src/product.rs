//! Product descriptors and the per-product export trigger.

use crate::compute::{ComputeService, ExportRequest, ImageRecipe};
use crate::error::{Result, SatromoError};
use crate::io;
use crate::job::JobDescription;
use crate::ledger::JobLedger;
use crate::paths;
use crate::product_status::{ProductState, ProductStatusRecord, ProductStatusTracker};
use crate::region::Region;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ProductDescriptor / ProductKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductKind {
    NdviMax { nir: String, red: String },
    Mosaic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub name: String,
    /// Export filename prefix.
    pub prefix: String,
    /// Upstream collection the derived collection is generated from.
    pub image_collection: String,
    /// Derived daily collection this product is computed from.
    pub step0_collection: String,
    /// Window length in days, ending at the run date.
    pub temporal_coverage: u32,
    /// Export resolution in metres.
    pub spatial_scale_export: f64,
    pub kind: ProductKind,
}

impl ProductDescriptor {
    /// First date of the product's window ending at `as_of`.
    pub fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of - Duration::days(i64::from(self.temporal_coverage.max(1)) - 1)
    }

    fn recipe(&self, start: NaiveDate, end: NaiveDate) -> ImageRecipe {
        let collection = self.step0_collection.clone();
        match &self.kind {
            ProductKind::NdviMax { nir, red } => ImageRecipe::NdviMax {
                collection,
                start,
                end,
                nir: nir.clone(),
                red: red.clone(),
            },
            ProductKind::Mosaic => ImageRecipe::Mosaic {
                collection,
                start,
                end,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ProductRegistry
// ---------------------------------------------------------------------------

/// Products in declaration order, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct ProductRegistry {
    products: Vec<ProductDescriptor>,
}

impl ProductRegistry {
    pub fn new(products: Vec<ProductDescriptor>) -> Self {
        Self { products }
    }

    pub fn get(&self, name: &str) -> Result<&ProductDescriptor> {
        self.products
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| SatromoError::ProductNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductDescriptor> {
        self.products.iter()
    }

    /// Products computed from `collection`, in declaration order.
    pub fn consumers<'a>(
        &'a self,
        collection: &'a str,
    ) -> impl Iterator<Item = &'a ProductDescriptor> + 'a {
        self.products
            .iter()
            .filter(move |p| p.step0_collection == collection)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ProductTrigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Submitted {
        item: String,
        filename: String,
        job_ids: Vec<String>,
    },
    /// The previous export of this product has not been published yet.
    StillRunning,
    NoCandidateScene,
    NoNewImagery { last_scene_date: NaiveDate },
}

/// Metadata written next to the merged raster and published with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub product: String,
    pub item: String,
    pub asset: String,
    pub first_scene_date: NaiveDate,
    pub last_scene_date: NaiveDate,
    pub scene_count: u32,
    pub run_date: NaiveDate,
}

/// Export settings shared by every product of one run.
#[derive(Debug, Clone)]
pub struct ExportSettings<'a> {
    pub region: Region,
    pub crs: &'a str,
    pub nodata: i32,
    pub processing_dir: &'a Path,
}

pub struct ProductTrigger<'a> {
    compute: &'a dyn ComputeService,
    ledger: &'a mut JobLedger,
    tracker: &'a mut ProductStatusTracker,
    settings: ExportSettings<'a>,
    force: bool,
}

impl<'a> ProductTrigger<'a> {
    pub fn new(
        compute: &'a dyn ComputeService,
        ledger: &'a mut JobLedger,
        tracker: &'a mut ProductStatusTracker,
        settings: ExportSettings<'a>,
    ) -> Self {
        Self {
            compute,
            ledger,
            tracker,
            settings,
            force: false,
        }
    }

    /// Submit even when the product is still marked RUNNING.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn run(&mut self, product: &ProductDescriptor, as_of: NaiveDate) -> Result<TriggerOutcome> {
        let name = product.name.as_str();

        if !self.force && self.tracker.status_for(name) == Some(ProductState::Running) {
            tracing::info!(product = name, "skipping: export still in flight");
            return Ok(TriggerOutcome::StillRunning);
        }

        let start = product.window_start(as_of);
        let Some(stats) = self
            .compute
            .scene_stats(&product.step0_collection, start, as_of)?
        else {
            tracing::info!(product = name, %start, end = %as_of, "skipping: no candidate scene");
            return Ok(TriggerOutcome::NoCandidateScene);
        };

        if !self.tracker.needs_update(name, stats.last_date) {
            tracing::info!(product = name, last_scene = %stats.last_date, "skipping: no new imagery");
            return Ok(TriggerOutcome::NoNewImagery {
                last_scene_date: stats.last_date,
            });
        }

        let item = item_timestamp(as_of);
        let filename = format!(
            "{}{}-{}_run{}",
            product.prefix,
            stats.first_date.format("%Y%m%d"),
            stats.last_date.format("%Y%m%d"),
            as_of.format("%Y%m%d")
        );
        let description = JobDescription::new(name, &item).to_string();
        let image = product.recipe(stats.first_date, stats.last_date);

        // RUNNING before the first submission, so a partial submission still
        // blocks resubmission until the reconciler resolves it.
        self.tracker.upsert(ProductStatusRecord {
            product: name.to_string(),
            last_scene_date: stats.last_date,
            run_date: as_of,
            status: ProductState::Running,
        })?;

        let mut job_ids = Vec::new();
        for (partition, region) in self.settings.region.quadrants() {
            let prefix = format!("{filename}{partition}");
            let request = ExportRequest {
                image: image.clone(),
                region,
                description: description.clone(),
                filename_prefix: prefix.clone(),
                scale: product.spatial_scale_export,
                crs: self.settings.crs.to_string(),
                nodata: self.settings.nodata,
            };
            let job_id = match self.compute.submit_export(&request) {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(product = name, filename = %prefix, submitted = job_ids.len(), error = %e, "export submission failed");
                    if job_ids.is_empty() {
                        self.tracker.set_status(name, ProductState::Failed)?;
                    }
                    return Err(e);
                }
            };
            self.ledger.record_submission(&job_id, &prefix)?;
            tracing::info!(product = name, job_id = %job_id, filename = %prefix, "export submitted");
            job_ids.push(job_id);
        }

        let metadata = ItemMetadata {
            product: name.to_string(),
            item: item.clone(),
            asset: format!("{filename}.{}", paths::RASTER_EXTENSION),
            first_scene_date: stats.first_date,
            last_scene_date: stats.last_date,
            scene_count: stats.count,
            run_date: as_of,
        };
        let json = serde_json::to_vec_pretty(&metadata)?;
        io::atomic_write(
            &paths::item_metadata(self.settings.processing_dir, &filename),
            &json,
        )?;

        Ok(TriggerOutcome::Submitted {
            item,
            filename,
            job_ids,
        })
    }
}

/// `YYYYMMDDT240000`: the end of the run day.
pub fn item_timestamp(as_of: NaiveDate) -> String {
    format!("{}T240000", as_of.format("%Y%m%d"))
}
