//! Per-product record of the last exported scene date and run state.
//!
//! A product is `RUNNING` from the moment its exports are submitted until the
//! reconciler has merged and published the item, when it flips to `complete`.
//! `failed` marks an item whose partitions ended without success; such a
//! product is reprocessed on the next run.

use crate::error::{Result, SatromoError};
use crate::table::RecordTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const HEADER: [&str; 4] = ["Product", "LastSceneDate", "RunDate", "Status"];

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductState {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "failed")]
    Failed,
}

impl ProductState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductState::Running => "RUNNING",
            ProductState::Complete => "complete",
            ProductState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProductState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(ProductState::Running),
            "complete" => Ok(ProductState::Complete),
            "failed" => Ok(ProductState::Failed),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStatusRecord {
    pub product: String,
    pub last_scene_date: NaiveDate,
    pub run_date: NaiveDate,
    pub status: ProductState,
}

#[derive(Debug)]
pub struct ProductStatusTracker {
    path: PathBuf,
    records: Vec<ProductStatusRecord>,
}

impl ProductStatusTracker {
    pub fn load(path: &Path) -> Result<Self> {
        let table = RecordTable::load(path, &HEADER)?;
        let mut records = Vec::with_capacity(table.len());
        for (i, row) in table.rows().iter().enumerate() {
            let malformed = |reason: String| SatromoError::MalformedRecord {
                path: path.to_path_buf(),
                line: i + 2,
                reason,
            };
            records.push(ProductStatusRecord {
                product: row[0].clone(),
                last_scene_date: parse_date(&row[1])?,
                run_date: parse_date(&row[2])?,
                status: row[3].parse().map_err(malformed)?,
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn records(&self) -> &[ProductStatusRecord] {
        &self.records
    }

    pub fn get(&self, product: &str) -> Option<&ProductStatusRecord> {
        self.records.iter().find(|r| r.product == product)
    }

    pub fn status_for(&self, product: &str) -> Option<ProductState> {
        self.get(product).map(|r| r.status)
    }

    pub fn last_scene_date_for(&self, product: &str) -> Option<NaiveDate> {
        self.get(product).map(|r| r.last_scene_date)
    }

    /// Replace the row for `record.product` in place, or append it.
    pub fn upsert(&mut self, record: ProductStatusRecord) -> Result<()> {
        match self.records.iter_mut().find(|r| r.product == record.product) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.save()
    }

    /// Change only the status of an existing row. Returns false when the
    /// product has no record.
    pub fn set_status(&mut self, product: &str, status: ProductState) -> Result<bool> {
        let Some(record) = self.records.iter_mut().find(|r| r.product == product) else {
            return Ok(false);
        };
        record.status = status;
        self.save()?;
        Ok(true)
    }

    /// Whether upstream data ending at `last_scene` is newer than what was
    /// last exported for `product`. No record means always process; a failed
    /// record is always retried.
    pub fn needs_update(&self, product: &str, last_scene: NaiveDate) -> bool {
        match self.get(product) {
            None => true,
            Some(r) if r.status == ProductState::Failed => true,
            Some(r) => r.last_scene_date < last_scene,
        }
    }

    fn save(&self) -> Result<()> {
        let mut table = RecordTable::new(&HEADER);
        for r in &self.records {
            table.push(vec![
                r.product.clone(),
                r.last_scene_date.format(DATE_FORMAT).to_string(),
                r.run_date.format(DATE_FORMAT).to_string(),
                r.status.to_string(),
            ]);
        }
        table.save(&self.path)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| SatromoError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn record(product: &str, last: &str, status: ProductState) -> ProductStatusRecord {
        ProductStatusRecord {
            product: product.to_string(),
            last_scene_date: d(last),
            run_date: d("2024-03-10"),
            status,
        }
    }

    #[test]
    fn upsert_appends_unseen_product() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools/last_updates.csv");
        let mut tracker = ProductStatusTracker::load(&path).unwrap();
        tracker.upsert(record("ndvi", "2024-03-09", ProductState::Running)).unwrap();
        tracker.upsert(record("l2a", "2024-03-08", ProductState::Complete)).unwrap();

        let reloaded = ProductStatusTracker::load(&path).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        assert_eq!(reloaded.status_for("ndvi"), Some(ProductState::Running));
    }

    #[test]
    fn upsert_replaces_existing_row_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_updates.csv");
        let mut tracker = ProductStatusTracker::load(&path).unwrap();
        tracker.upsert(record("ndvi", "2024-03-01", ProductState::Complete)).unwrap();
        tracker.upsert(record("l2a", "2024-03-01", ProductState::Complete)).unwrap();
        tracker.upsert(record("ndvi", "2024-03-09", ProductState::Running)).unwrap();

        let reloaded = ProductStatusTracker::load(&path).unwrap();
        let ndvi_rows = reloaded.records().iter().filter(|r| r.product == "ndvi").count();
        assert_eq!(ndvi_rows, 1);
        assert_eq!(reloaded.records()[0].product, "ndvi");
        assert_eq!(reloaded.last_scene_date_for("ndvi"), Some(d("2024-03-09")));
    }

    #[test]
    fn file_uses_documented_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_updates.csv");
        let mut tracker = ProductStatusTracker::load(&path).unwrap();
        tracker.upsert(record("ndvi", "2024-03-09", ProductState::Running)).unwrap();
        tracker.set_status("ndvi", ProductState::Complete).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Product,LastSceneDate,RunDate,Status\nndvi,2024-03-09,2024-03-10,complete\n"
        );
    }

    #[test]
    fn set_status_on_unknown_product_is_false() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProductStatusTracker::load(&dir.path().join("s.csv")).unwrap();
        assert!(!tracker.set_status("ghost", ProductState::Complete).unwrap());
    }

    #[test]
    fn needs_update_uses_strict_less_than() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ProductStatusTracker::load(&dir.path().join("s.csv")).unwrap();
        assert!(tracker.needs_update("ndvi", d("2024-03-09")));

        tracker.upsert(record("ndvi", "2024-03-09", ProductState::Complete)).unwrap();
        assert!(!tracker.needs_update("ndvi", d("2024-03-09")));
        assert!(!tracker.needs_update("ndvi", d("2024-03-08")));
        assert!(tracker.needs_update("ndvi", d("2024-03-10")));

        tracker.set_status("ndvi", ProductState::Failed).unwrap();
        assert!(tracker.needs_update("ndvi", d("2024-03-09")));
    }

    #[test]
    fn unknown_status_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.csv");
        std::fs::write(&path, "Product,LastSceneDate,RunDate,Status\nndvi,2024-03-09,2024-03-10,done\n").unwrap();
        let err = ProductStatusTracker::load(&path).unwrap_err();
        assert!(matches!(err, SatromoError::MalformedRecord { line: 2, .. }));
    }
}
