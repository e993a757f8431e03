//! The external geospatial compute service.
//!
//! Everything pixel-level happens remotely. This side only submits jobs,
//! polls their state and manages the dated assets of derived collections.

pub mod http;

use crate::error::Result;
use crate::job::JobStatus;
use crate::region::Region;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use http::HttpComputeService;

// ---------------------------------------------------------------------------
// Assets and scenes
// ---------------------------------------------------------------------------

/// One dated asset of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub date: NaiveDate,
}

/// Summary of the scenes a collection holds inside a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStats {
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub count: u32,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// What image the service should compute before exporting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageRecipe {
    /// Per-pixel maximum NDVI over the scenes of `collection` in the range.
    NdviMax {
        collection: String,
        start: NaiveDate,
        end: NaiveDate,
        nir: String,
        red: String,
    },
    /// Plain mosaic of the scenes of `collection` in the range.
    Mosaic {
        collection: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub image: ImageRecipe,
    pub region: Region,
    pub description: String,
    pub filename_prefix: String,
    /// Export resolution in metres.
    pub scale: f64,
    pub crs: String,
    pub nodata: i32,
}

/// Request to derive one dated asset of `target_collection` from the scenes
/// of `base_collection` acquired on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub recipe: String,
    pub base_collection: String,
    pub target_collection: String,
    pub date: NaiveDate,
    pub region: Region,
    pub crs: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Submitted(String),
    /// The base collection has no scenes for the requested date.
    NoSourceData,
}

// ---------------------------------------------------------------------------
// ComputeService
// ---------------------------------------------------------------------------

pub trait ComputeService {
    /// Submit an export; returns the service-assigned job id.
    fn submit_export(&self, request: &ExportRequest) -> Result<String>;

    fn submit_generation(&self, request: &GenerationRequest) -> Result<GenerationOutcome>;

    fn job_status(&self, job_id: &str) -> Result<JobStatus>;

    /// Every job the service still knows about, terminal or not.
    fn list_jobs(&self) -> Result<Vec<JobStatus>>;

    fn list_assets(&self, collection: &str) -> Result<Vec<Asset>>;

    fn delete_asset(&self, asset_id: &str) -> Result<()>;

    /// `None` when the collection has no scenes in `[start, end]`.
    fn scene_stats(
        &self,
        collection: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<SceneStats>>;
}
