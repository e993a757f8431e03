//! The running-jobs ledger: which partition exports are currently in flight.
//!
//! The ledger file is the single source of truth for "what is running". It is
//! read whole, changed in memory and rewritten on every mutation; there is no
//! locking, so two invocations must never run at the same time.

use crate::error::Result;
use crate::job::{ExportName, Partition};
use crate::table::RecordTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 2] = ["Task ID", "Filename"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub job_id: String,
    pub filename: String,
}

impl LedgerEntry {
    pub fn export_name(&self) -> Option<ExportName> {
        ExportName::parse(&self.filename)
    }
}

/// All ledger rows that share one item stem, keyed by partition.
///
/// A partition normally holds exactly one entry; more than one means the same
/// export was submitted twice, and every copy is tracked until it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemGroup {
    pub stem: String,
    pub partitions: BTreeMap<Partition, Vec<LedgerEntry>>,
}

impl ItemGroup {
    pub fn is_complete(&self) -> bool {
        Partition::all().all(|p| self.partitions.contains_key(&p))
    }

    pub fn missing_partitions(&self) -> Vec<Partition> {
        Partition::all()
            .filter(|p| !self.partitions.contains_key(p))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Partition, &LedgerEntry)> {
        self.partitions
            .iter()
            .flat_map(|(p, entries)| entries.iter().map(move |e| (*p, e)))
    }
}

/// Ledger rows grouped into items, plus rows whose filename carries no
/// partition suffix.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Grouping {
    pub items: Vec<ItemGroup>,
    pub ungrouped: Vec<LedgerEntry>,
}

#[derive(Debug)]
pub struct JobLedger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl JobLedger {
    pub fn load(path: &Path) -> Result<Self> {
        let table = RecordTable::load(path, &HEADER)?;
        let entries = table
            .rows()
            .iter()
            .map(|row| LedgerEntry {
                job_id: row[0].clone(),
                filename: row[1].clone(),
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a row for a freshly submitted job and persist.
    ///
    /// Uniqueness is not enforced; callers must not submit the same filename
    /// twice within one invocation.
    pub fn record_submission(&mut self, job_id: &str, filename: &str) -> Result<()> {
        self.entries.push(LedgerEntry {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
        });
        self.save()?;
        tracing::debug!(job_id, filename, "recorded submission");
        Ok(())
    }

    /// Delete every row whose job id matches, keeping all others in order.
    /// Returns false (and leaves the file untouched) when nothing matched.
    pub fn remove(&mut self, job_id: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.job_id != job_id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn group_items(&self) -> Grouping {
        let mut by_stem: BTreeMap<String, ItemGroup> = BTreeMap::new();
        let mut ungrouped = Vec::new();
        for entry in &self.entries {
            match entry.export_name() {
                Some(name) => {
                    by_stem
                        .entry(name.stem.clone())
                        .or_insert_with(|| ItemGroup {
                            stem: name.stem.clone(),
                            partitions: BTreeMap::new(),
                        })
                        .partitions
                        .entry(name.partition)
                        .or_default()
                        .push(entry.clone());
                }
                None => ungrouped.push(entry.clone()),
            }
        }
        Grouping {
            items: by_stem.into_values().collect(),
            ungrouped,
        }
    }

    fn save(&self) -> Result<()> {
        let mut table = RecordTable::new(&HEADER);
        for e in &self.entries {
            table.push(vec![e.job_id.clone(), e.filename.clone()]);
        }
        table.save(&self.path)
    }
}
