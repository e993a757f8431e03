//! Typed handlers that produce one dated asset of a derived collection.

use crate::compute::{ComputeService, GenerationOutcome, GenerationRequest};
use crate::error::Result;
use crate::region::Region;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a derived collection's daily assets are generated.
///
/// Each variant maps onto one recipe the compute service knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationHandler {
    /// Cloud-masked surface-reflectance mosaic of one acquisition day.
    S2SrDailyMosaic,
    /// Top-of-atmosphere mosaic of one acquisition day.
    S2ToaDailyMosaic,
}

impl GenerationHandler {
    pub fn recipe(self) -> &'static str {
        match self {
            GenerationHandler::S2SrDailyMosaic => "s2_sr_daily_mosaic",
            GenerationHandler::S2ToaDailyMosaic => "s2_toa_daily_mosaic",
        }
    }

    pub fn request(
        self,
        base_collection: &str,
        target_collection: &str,
        date: NaiveDate,
        region: Region,
        crs: &str,
    ) -> GenerationRequest {
        GenerationRequest {
            recipe: self.recipe().to_string(),
            base_collection: base_collection.to_string(),
            target_collection: target_collection.to_string(),
            date,
            region,
            crs: crs.to_string(),
            description: generation_description(target_collection, date),
        }
    }

    /// Submit generation for `date` without waiting for it.
    pub fn generate(
        self,
        compute: &dyn ComputeService,
        base_collection: &str,
        target_collection: &str,
        date: NaiveDate,
        region: Region,
        crs: &str,
    ) -> Result<GenerationOutcome> {
        let request = self.request(base_collection, target_collection, date, region, crs);
        compute.submit_generation(&request)
    }
}

impl fmt::Display for GenerationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.recipe())
    }
}

/// Last `/`-separated segment of a collection identifier.
pub fn basename(collection: &str) -> &str {
    collection.rsplit('/').next().unwrap_or(collection)
}

/// `<basename>_<YYYY-MM-DD>`: the description of a generation job and the
/// key in-flight jobs are matched on.
pub fn generation_description(collection: &str, date: NaiveDate) -> String {
    format!("{}_{}", basename(collection), date.format("%Y-%m-%d"))
}
