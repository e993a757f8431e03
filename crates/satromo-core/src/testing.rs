//! In-memory stand-ins for the compute service and external tools.

use crate::compute::{
    Asset, ComputeService, ExportRequest, GenerationOutcome, GenerationRequest, SceneStats,
};
use crate::config::Config;
use crate::error::{Result, SatromoError};
use crate::job::{JobState, JobStatus};
use crate::product::{ProductDescriptor, ProductKind};
use crate::tools::{FileTransfer, RasterMerger};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn ndvi_product() -> ProductDescriptor {
    ProductDescriptor {
        name: "ndvi".to_string(),
        prefix: "NDVI_".to_string(),
        image_collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
        step0_collection: "projects/p/assets/X".to_string(),
        temporal_coverage: 3,
        spatial_scale_export: 10.0,
        kind: ProductKind::NdviMax {
            nir: "B8".to_string(),
            red: "B4".to_string(),
        },
    }
}

pub fn sample_config(base_url: &str) -> Config {
    let yaml = format!(
        r#"
service:
  base_url: {base_url}
environments:
  dev:
    drive_mount: drive-dev
    destination: s3dev:satromodev/data
  int:
    drive_mount: drive
    destination: s3int:satromoint/data
roi: [0.0, 0.0, 2.0, 2.0]
collections:
  projects/p/assets/X:
    generator: s2_sr_daily_mosaic
products:
  - name: ndvi
    prefix: NDVI_
    image_collection: COPERNICUS/S2_SR_HARMONIZED
    step0_collection: projects/p/assets/X
    temporal_coverage: 3
    spatial_scale_export: 10
    kind:
      type: ndvi_max
      nir: B8
      red: B4
"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}

// ---------------------------------------------------------------------------
// FakeCompute
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    jobs: Vec<JobStatus>,
    assets: BTreeMap<String, Vec<Asset>>,
    scenes: BTreeMap<String, SceneStats>,
    no_source: BTreeSet<(String, NaiveDate)>,
    exports: Vec<ExportRequest>,
    generations: Vec<GenerationRequest>,
    deleted: Vec<String>,
    polls: Vec<String>,
    export_calls: usize,
    failing_export: Option<usize>,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeCompute {
    state: RefCell<FakeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, id: &str, description: &str, state: JobState) {
        self.state.borrow_mut().jobs.push(JobStatus {
            id: id.to_string(),
            description: description.to_string(),
            state,
            creation_time: None,
            update_time: None,
        });
    }

    pub fn set_state(&self, id: &str, state: JobState) {
        let mut s = self.state.borrow_mut();
        let job = s.jobs.iter_mut().find(|j| j.id == id).unwrap();
        job.state = state;
    }

    pub fn add_asset(&self, collection: &str, date: NaiveDate) {
        self.state
            .borrow_mut()
            .assets
            .entry(collection.to_string())
            .or_default()
            .push(Asset {
                id: format!("{collection}/{date}"),
                date,
            });
    }

    pub fn set_scenes(&self, collection: &str, first: NaiveDate, last: NaiveDate, count: u32) {
        self.state.borrow_mut().scenes.insert(
            collection.to_string(),
            SceneStats {
                first_date: first,
                last_date: last,
                count,
            },
        );
    }

    pub fn no_source_data(&self, collection: &str, date: NaiveDate) {
        self.state
            .borrow_mut()
            .no_source
            .insert((collection.to_string(), date));
    }

    /// Make the `n`th `submit_export` call (1-based) fail with a 503.
    pub fn fail_export(&self, n: usize) {
        self.state.borrow_mut().failing_export = Some(n);
    }

    pub fn exports(&self) -> Vec<ExportRequest> {
        self.state.borrow().exports.clone()
    }

    pub fn generations(&self) -> Vec<GenerationRequest> {
        self.state.borrow().generations.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.borrow().deleted.clone()
    }

    pub fn polls(&self) -> Vec<String> {
        self.state.borrow().polls.clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut s = self.state.borrow_mut();
        s.next_id += 1;
        format!("{prefix}{}", s.next_id)
    }
}

impl ComputeService for FakeCompute {
    fn submit_export(&self, request: &ExportRequest) -> Result<String> {
        {
            let mut s = self.state.borrow_mut();
            s.export_calls += 1;
            if s.failing_export == Some(s.export_calls) {
                return Err(SatromoError::ServiceStatus {
                    endpoint: "POST /exports".to_string(),
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
        }
        let id = self.next_id("E");
        self.add_job(&id, &request.description, JobState::Pending);
        self.state.borrow_mut().exports.push(request.clone());
        Ok(id)
    }

    fn submit_generation(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let key = (request.target_collection.clone(), request.date);
        if self.state.borrow().no_source.contains(&key) {
            return Ok(GenerationOutcome::NoSourceData);
        }
        let id = self.next_id("G");
        self.add_job(&id, &request.description, JobState::Pending);
        self.state.borrow_mut().generations.push(request.clone());
        Ok(GenerationOutcome::Submitted(id))
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let mut s = self.state.borrow_mut();
        s.polls.push(job_id.to_string());
        s.jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .ok_or_else(|| SatromoError::ServiceStatus {
                endpoint: format!("GET /jobs/{job_id}"),
                status: 404,
                body: "unknown job".to_string(),
            })
    }

    fn list_jobs(&self) -> Result<Vec<JobStatus>> {
        Ok(self.state.borrow().jobs.clone())
    }

    fn list_assets(&self, collection: &str) -> Result<Vec<Asset>> {
        Ok(self
            .state
            .borrow()
            .assets
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let mut s = self.state.borrow_mut();
        for assets in s.assets.values_mut() {
            assets.retain(|a| a.id != asset_id);
        }
        s.deleted.push(asset_id.to_string());
        Ok(())
    }

    fn scene_stats(
        &self,
        collection: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Option<SceneStats>> {
        Ok(self.state.borrow().scenes.get(collection).cloned())
    }
}

// ---------------------------------------------------------------------------
// Recording tools
// ---------------------------------------------------------------------------

/// Writes a placeholder raster for every merge and records the call.
#[derive(Default)]
pub struct RecordingMerger {
    pub calls: RefCell<Vec<(String, Vec<PathBuf>)>>,
    pub fail_with: Option<String>,
}

impl RasterMerger for RecordingMerger {
    fn merge(&self, stem: &str, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push((stem.to_string(), inputs.to_vec()));
        if let Some(stderr) = &self.fail_with {
            return Err(SatromoError::ToolFailed {
                tool: "gdalwarp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }
        std::fs::write(output, b"merged")?;
        Ok(())
    }
}

/// Moves files into a local directory standing in for the destination.
#[derive(Default)]
pub struct RecordingTransfer {
    pub moves: RefCell<Vec<(PathBuf, String)>>,
}

impl FileTransfer for RecordingTransfer {
    fn move_to(&self, source: &Path, destination: &str) -> Result<()> {
        if !source.exists() {
            return Err(SatromoError::ToolFailed {
                tool: "rclone".to_string(),
                status: "exit status: 3".to_string(),
                stderr: format!("{} not found", source.display()),
            });
        }
        std::fs::remove_file(source)?;
        self.moves
            .borrow_mut()
            .push((source.to_path_buf(), destination.to_string()));
        Ok(())
    }
}
