//! The completion reconciler: advances ledger items to publication.
//!
//! Every invocation groups the ledger into items, polls each partition job
//! once and decides per item:
//!
//! ```text
//! a partition job could not be polled    -> PollFailed   (ledger untouched)
//! missing rows, some row still in flight -> Incomplete   (ledger untouched)
//! missing rows, every row terminal       -> Abandoned    (archived, product failed)
//! any partition PENDING/RUNNING          -> Waiting      (ledger untouched)
//! all terminal, some not SUCCEEDED       -> Failed       (archived, product failed)
//! all SUCCEEDED                          -> merge, move, clean up -> Published
//! ```
//!
//! Archived items have their partition rasters deleted from the mount. A
//! publish that breaks half way leaves the ledger as it was, so the next
//! invocation retries the whole item.

use crate::compute::ComputeService;
use crate::context::Stores;
use crate::error::{Result, SatromoError};
use crate::io;
use crate::job::{JobDescription, JobStatus, Partition};
use crate::ledger::{ItemGroup, LedgerEntry};
use crate::paths;
use crate::product_status::ProductState;
use crate::tools::{FileTransfer, RasterMerger};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Waiting {
        pending: Vec<String>,
    },
    Incomplete {
        missing: Vec<u8>,
    },
    /// Partition rows were never all submitted and the present ones are done.
    Abandoned {
        product: Option<String>,
        missing: Vec<u8>,
    },
    PollFailed {
        job_id: String,
        reason: String,
    },
    Failed {
        product: Option<String>,
        failed: Vec<String>,
    },
    Published {
        product: String,
        item: String,
        destination: String,
    },
    PublishFailed {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub stem: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub items: Vec<ItemReport>,
    /// Ledger rows whose filename has no partition suffix.
    pub ungrouped: Vec<LedgerEntry>,
}

impl ReconcileReport {
    pub fn publish_failures(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::PublishFailed { .. }))
            .count()
    }

    pub fn poll_failures(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::PollFailed { .. }))
            .count()
    }

    pub fn published(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Published { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Where partition outputs are found and merged items are sent.
#[derive(Debug, Clone)]
pub struct PublishTarget<'a> {
    pub drive_mount: &'a Path,
    pub processing_dir: &'a Path,
    pub destination: &'a str,
}

struct Polled {
    entry: LedgerEntry,
    status: JobStatus,
}

pub struct Reconciler<'a> {
    compute: &'a dyn ComputeService,
    merger: &'a dyn RasterMerger,
    transfer: &'a dyn FileTransfer,
    stores: &'a mut Stores,
    target: PublishTarget<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        compute: &'a dyn ComputeService,
        merger: &'a dyn RasterMerger,
        transfer: &'a dyn FileTransfer,
        stores: &'a mut Stores,
        target: PublishTarget<'a>,
    ) -> Self {
        Self {
            compute,
            merger,
            transfer,
            stores,
            target,
        }
    }

    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        let grouping = self.stores.ledger.group_items();
        for entry in &grouping.ungrouped {
            tracing::warn!(job_id = %entry.job_id, filename = %entry.filename, "ledger row has no partition suffix; skipping");
        }

        let mut items = Vec::with_capacity(grouping.items.len());
        for group in &grouping.items {
            let outcome = self.reconcile_item(group)?;
            items.push(ItemReport {
                stem: group.stem.clone(),
                outcome,
            });
        }
        Ok(ReconcileReport {
            items,
            ungrouped: grouping.ungrouped,
        })
    }

    fn reconcile_item(&mut self, group: &ItemGroup) -> Result<ItemOutcome> {
        let stem = group.stem.as_str();

        let mut polled = Vec::new();
        for (_, entry) in group.entries() {
            let status = match self.compute.job_status(&entry.job_id) {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(stem, job_id = %entry.job_id, error = %e, "poll failed; item stays in the ledger");
                    return Ok(ItemOutcome::PollFailed {
                        job_id: entry.job_id.clone(),
                        reason: e.to_string(),
                    });
                }
            };
            tracing::debug!(stem, job_id = %entry.job_id, state = %status.state, "polled");
            polled.push(Polled {
                entry: entry.clone(),
                status,
            });
        }

        if !group.is_complete() {
            let missing: Vec<u8> = group.missing_partitions().into_iter().map(Partition::index).collect();
            if polled.iter().any(|p| !p.status.state.is_terminal()) {
                tracing::warn!(stem, ?missing, "item is missing partition rows");
                return Ok(ItemOutcome::Incomplete { missing });
            }
            tracing::error!(stem, ?missing, "item is missing partition rows and nothing is in flight; dropping it");
            let product = self.archive(stem, &polled)?;
            return Ok(ItemOutcome::Abandoned { product, missing });
        }

        let pending: Vec<String> = polled
            .iter()
            .filter(|p| !p.status.state.is_terminal())
            .map(|p| p.entry.job_id.clone())
            .collect();
        let failed: Vec<String> = polled
            .iter()
            .filter(|p| p.status.state.is_terminal() && !p.status.state.is_success())
            .map(|p| p.entry.job_id.clone())
            .collect();

        if !pending.is_empty() {
            if !failed.is_empty() {
                tracing::warn!(stem, ?failed, "partition failed while others still run");
            }
            tracing::info!(stem, ?pending, "waiting for partitions");
            return Ok(ItemOutcome::Waiting { pending });
        }

        if !failed.is_empty() {
            return self.fail_item(stem, &polled, failed);
        }

        match self.publish(stem, &polled) {
            Ok(published) => {
                self.finish(stem, &polled, &published.0)?;
                let (product, item, destination) = published;
                Ok(ItemOutcome::Published {
                    product,
                    item,
                    destination,
                })
            }
            Err(e) => {
                tracing::error!(stem, error = %e, "publish failed; item stays in the ledger");
                Ok(ItemOutcome::PublishFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Merge, move and delete the partition outputs. Returns the product,
    /// item and destination.
    fn publish(&self, stem: &str, polled: &[Polled]) -> Result<(String, String, String)> {
        let description = polled
            .first()
            .map(|p| p.status.description.as_str())
            .unwrap_or_default();
        let JobDescription { product, item } = JobDescription::parse(description)?;

        let inputs = partition_rasters(self.target.drive_mount, stem)?;

        io::ensure_dir(self.target.processing_dir)?;
        let merged = paths::merged_raster(self.target.processing_dir, stem);
        self.merger.merge(stem, &inputs, &merged)?;

        let destination = paths::publish_destination(self.target.destination, &product, &item);
        self.transfer.move_to(&merged, &destination)?;

        let metadata = paths::item_metadata(self.target.processing_dir, stem);
        if metadata.exists() {
            self.transfer.move_to(&metadata, &destination)?;
        }

        for input in &inputs {
            io::remove_if_exists(input)?;
        }
        tracing::info!(stem, product = %product, item = %item, destination = %destination, "published");
        Ok((product, item, destination))
    }

    /// Move a published item out of the ledger.
    fn finish(&mut self, stem: &str, polled: &[Polled], product: &str) -> Result<()> {
        for p in polled {
            self.stores.completed.record(&p.status)?;
        }
        for p in polled {
            self.stores.ledger.remove(&p.entry.job_id)?;
        }
        if !self.stores.status.set_status(product, ProductState::Complete)? {
            tracing::warn!(product, "no status record to mark complete");
        }
        io::remove_if_exists(&paths::merge_vrt(self.target.processing_dir, stem))?;
        io::remove_if_exists(&paths::merge_input_list(self.target.processing_dir, stem))?;
        Ok(())
    }

    fn fail_item(&mut self, stem: &str, polled: &[Polled], failed: Vec<String>) -> Result<ItemOutcome> {
        tracing::error!(stem, ?failed, "item failed; dropping it from the ledger");
        let product = self.archive(stem, polled)?;
        Ok(ItemOutcome::Failed { product, failed })
    }

    /// Delete whatever partition rasters the item left on the mount, archive
    /// its rows and mark the product failed. Returns the product, when any
    /// description names one.
    fn archive(&mut self, stem: &str, polled: &[Polled]) -> Result<Option<String>> {
        let product = polled
            .iter()
            .find_map(|p| JobDescription::parse(&p.status.description).ok())
            .map(|d| d.product);

        for raster in partition_files(self.target.drive_mount, stem)?.values().flatten() {
            io::remove_if_exists(raster)?;
            tracing::debug!(stem, raster = %raster.display(), "deleted partition raster");
        }
        for p in polled {
            self.stores.completed.record(&p.status)?;
        }
        for p in polled {
            self.stores.ledger.remove(&p.entry.job_id)?;
        }
        if let Some(product) = &product {
            if !self.stores.status.set_status(product, ProductState::Failed)? {
                tracing::warn!(product = %product, "no status record to mark failed");
            }
        }
        Ok(product)
    }
}

/// `<stem>quadrant<N>*.tif` files under `mount`, by partition. A missing
/// mount holds nothing.
fn partition_files(mount: &Path, stem: &str) -> Result<BTreeMap<Partition, Vec<PathBuf>>> {
    let suffix = format!(".{}", paths::RASTER_EXTENSION);
    let entries = match std::fs::read_dir(mount) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    let mut files = BTreeMap::new();
    for partition in Partition::all() {
        let prefix = format!("{stem}{partition}");
        let mut found: Vec<PathBuf> = names
            .iter()
            .filter(|n| n.starts_with(&prefix) && n.ends_with(&suffix))
            .map(|n| mount.join(n))
            .collect();
        if !found.is_empty() {
            found.sort();
            files.insert(partition, found);
        }
    }
    Ok(files)
}

/// Every `<stem>quadrant<N>*.tif` under `mount`, sorted. Large exports are
/// split by the service into several tiles per partition.
fn partition_rasters(mount: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let files = partition_files(mount, stem)?;
    let missing: Vec<String> = Partition::all()
        .filter(|p| !files.contains_key(p))
        .map(|p| format!("{stem}{p}*.{}", paths::RASTER_EXTENSION))
        .collect();
    if !missing.is_empty() {
        return Err(SatromoError::MissingPartitionOutputs {
            stem: stem.to_string(),
            missing: missing.join(", "),
        });
    }
    let mut found: Vec<PathBuf> = files.into_values().flatten().collect();
    found.sort();
    Ok(found)
}
