//! Export job vocabulary shared by the ledger, gate and reconciler.

use crate::error::{Result, SatromoError};
use crate::paths::PARTITION_MARKER;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Polled state of an external job.
///
/// `Pending` and `Running` are the only non-terminal states. Of the terminal
/// states only `Succeeded` counts as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Other(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Other(s) => s,
        }
    }
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "READY" => JobState::Pending,
            "RUNNING" | "CANCELLING" => JobState::Running,
            "SUCCEEDED" | "COMPLETED" | "COMPLETE" => JobState::Succeeded,
            "FAILED" => JobState::Failed,
            "CANCELLED" => JobState::Cancelled,
            _ => JobState::Other(s),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// One polled snapshot of an external job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// JobDescription
// ---------------------------------------------------------------------------

/// The `P:<product> I:<item>` description attached to every product export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub product: String,
    pub item: String,
}

static DESCRIPTION_RE: OnceLock<Regex> = OnceLock::new();

fn description_re() -> &'static Regex {
    DESCRIPTION_RE.get_or_init(|| Regex::new(r"P:(?P<product>.+?) I:(?P<item>\S+)").unwrap())
}

impl JobDescription {
    pub fn new(product: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            item: item.into(),
        }
    }

    pub fn parse(description: &str) -> Result<Self> {
        let caps = description_re()
            .captures(description)
            .ok_or_else(|| SatromoError::MalformedDescription(description.to_string()))?;
        Ok(Self::new(&caps["product"], &caps["item"]))
    }
}

impl fmt::Display for JobDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P:{} I:{}", self.product, self.item)
    }
}

// ---------------------------------------------------------------------------
// Partition / ExportName
// ---------------------------------------------------------------------------

/// One of the four spatial quadrants an item is exported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition(u8);

impl Partition {
    pub const COUNT: usize = 4;

    pub fn new(index: u8) -> Option<Self> {
        (1..=Self::COUNT as u8).contains(&index).then_some(Self(index))
    }

    pub fn all() -> impl Iterator<Item = Partition> {
        (1..=Self::COUNT as u8).map(Partition)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PARTITION_MARKER}{}", self.0)
    }
}

/// A partition export filename split into its item stem and partition.
///
/// `Sentinel_NDVI-MAX_20240301-20240310_run20240310quadrant3` has stem
/// `Sentinel_NDVI-MAX_20240301-20240310_run20240310` and partition 3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExportName {
    pub stem: String,
    pub partition: Partition,
}

impl ExportName {
    pub fn new(stem: impl Into<String>, partition: Partition) -> Self {
        Self {
            stem: stem.into(),
            partition,
        }
    }

    pub fn parse(filename: &str) -> Option<Self> {
        let name = filename.trim();
        let name = name
            .strip_suffix(&format!(".{}", crate::paths::RASTER_EXTENSION))
            .unwrap_or(name);
        let at = name.rfind(PARTITION_MARKER)?;
        let index: u8 = name[at + PARTITION_MARKER.len()..].parse().ok()?;
        let partition = Partition::new(index)?;
        Some(Self::new(&name[..at], partition))
    }

    pub fn filename(&self) -> String {
        format!("{}{}", self.stem, self.partition)
    }
}

impl fmt::Display for ExportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
