//! Permanent markers for collection dates that will never produce an asset.
//!
//! Markers are created once and never mutated or deleted here.

use crate::error::{Result, SatromoError};
use crate::table::RecordTable;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 2] = ["collection", "date"];

#[derive(Debug)]
pub struct EmptyDateMarkers {
    path: PathBuf,
    markers: BTreeSet<(String, NaiveDate)>,
}

impl EmptyDateMarkers {
    pub fn load(path: &Path) -> Result<Self> {
        let table = RecordTable::load(path, &HEADER)?;
        let mut markers = BTreeSet::new();
        for row in table.rows() {
            let date = NaiveDate::parse_from_str(&row[1], "%Y-%m-%d")
                .map_err(|_| SatromoError::InvalidDate(row[1].clone()))?;
            markers.insert((row[0].clone(), date));
        }
        Ok(Self {
            path: path.to_path_buf(),
            markers,
        })
    }

    /// `collection` is the collection basename, as used in job descriptions.
    pub fn contains(&self, collection: &str, date: NaiveDate) -> bool {
        self.markers.contains(&(collection.to_string(), date))
    }

    /// Record that `date` has no data for `collection`. Re-marking is a no-op.
    pub fn mark(&mut self, collection: &str, date: NaiveDate) -> Result<bool> {
        if !self.markers.insert((collection.to_string(), date)) {
            return Ok(false);
        }
        let mut table = RecordTable::new(&HEADER);
        for (c, d) in &self.markers {
            table.push(vec![c.clone(), d.format("%Y-%m-%d").to_string()]);
        }
        table.save(&self.path)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
