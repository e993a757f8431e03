//! Archive of jobs that reached a terminal state.

use crate::error::Result;
use crate::job::JobStatus;
use crate::table::RecordTable;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 5] = ["Task ID", "Description", "State", "CreationTime", "UpdateTime"];

#[derive(Debug)]
pub struct CompletedJobStore {
    path: PathBuf,
    table: RecordTable,
    ids: HashSet<String>,
}

impl CompletedJobStore {
    pub fn load(path: &Path) -> Result<Self> {
        let table = RecordTable::load(path, &HEADER)?;
        let ids = table.rows().iter().map(|r| r[0].clone()).collect();
        Ok(Self {
            path: path.to_path_buf(),
            table,
            ids,
        })
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.ids.contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Append the final status of a job unless its id is already archived.
    /// Returns true when a row was written.
    pub fn record(&mut self, status: &JobStatus) -> Result<bool> {
        if self.contains(&status.id) {
            return Ok(false);
        }
        self.table.push(vec![
            status.id.clone(),
            status.description.clone(),
            status.state.to_string(),
            format_time(status.creation_time),
            format_time(status.update_time),
        ]);
        self.table.save(&self.path)?;
        self.ids.insert(status.id.clone());
        tracing::debug!(job_id = %status.id, state = %status.state, "archived job");
        Ok(true)
    }
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_default()
}
