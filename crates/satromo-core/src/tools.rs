//! External raster-merge and file-transfer tools.
//!
//! Both run as child processes under a deadline. On expiry the child is
//! killed and reaped within [`REAP_TIMEOUT`]; a child that refuses to die is
//! abandoned and reported as timed out either way.

use crate::error::{Result, SatromoError};
use crate::io;
use crate::paths;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_LIMIT: usize = 2000;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Produces one merged, nodata-masked, compressed raster from the partition
/// rasters of an item.
pub trait RasterMerger {
    /// Fails with [`SatromoError::MissingPartitionOutputs`] before running
    /// anything when an input is missing.
    fn merge(&self, stem: &str, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Moves a local file to a destination URI. The destination prefix is
/// assumed to exist.
pub trait FileTransfer {
    fn move_to(&self, source: &Path, destination: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GdalMerger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GdalMerger {
    pub buildvrt: String,
    pub warp: String,
    pub cutline: Option<PathBuf>,
    pub nodata: i32,
    pub timeout: Duration,
    /// Where the `.vrt` and `_list.txt` intermediates are written.
    pub work_dir: PathBuf,
}

impl GdalMerger {
    fn buildvrt_args(list: &Path, vrt: &Path) -> Vec<String> {
        vec![
            "-input_file_list".to_string(),
            list.display().to_string(),
            vrt.display().to_string(),
            "--config".to_string(),
            "GDAL_NUM_THREADS".to_string(),
            "ALL_CPUS".to_string(),
        ]
    }

    fn warp_args(&self, vrt: &Path, output: &Path) -> Vec<String> {
        let nodata = self.nodata.to_string();
        let mut args = vec![
            vrt.display().to_string(),
            output.display().to_string(),
            "-of".to_string(),
            "COG".to_string(),
        ];
        if let Some(cutline) = &self.cutline {
            args.push("-cutline".to_string());
            args.push(cutline.display().to_string());
        }
        args.extend(
            [
                "-dstnodata",
                nodata.as_str(),
                "-srcnodata",
                nodata.as_str(),
                "-co",
                "BIGTIFF=YES",
                "--config",
                "CPL_VSIL_USE_TEMP_FILE_FOR_RANDOM_WRITE",
                "YES",
                "-co",
                "COMPRESS=LZW",
                "-co",
                "PREDICTOR=2",
            ]
            .map(String::from),
        );
        args
    }
}

impl RasterMerger for GdalMerger {
    fn merge(&self, stem: &str, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let missing: Vec<String> = inputs
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if inputs.is_empty() || !missing.is_empty() {
            return Err(SatromoError::MissingPartitionOutputs {
                stem: stem.to_string(),
                missing: if missing.is_empty() {
                    "no partition rasters found".to_string()
                } else {
                    missing.join(", ")
                },
            });
        }

        let buildvrt = locate(Path::new(&self.buildvrt))?;
        let warp = locate(Path::new(&self.warp))?;

        let list = paths::merge_input_list(&self.work_dir, stem);
        let vrt = paths::merge_vrt(&self.work_dir, stem);
        let listing: String = inputs
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        io::atomic_write(&list, listing.as_bytes())?;

        let mut cmd = Command::new(&buildvrt);
        cmd.args(Self::buildvrt_args(&list, &vrt));
        run_with_deadline(cmd, &self.buildvrt, self.timeout)?;

        // gdalwarp appends into an existing output instead of replacing it.
        io::remove_if_exists(output)?;
        let mut cmd = Command::new(&warp);
        cmd.args(self.warp_args(&vrt, output));
        run_with_deadline(cmd, &self.warp, self.timeout)?;

        tracing::info!(stem, output = %output.display(), inputs = inputs.len(), "merged partitions");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RcloneTransfer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RcloneTransfer {
    pub binary: PathBuf,
    pub config: Option<PathBuf>,
    pub timeout: Duration,
}

impl RcloneTransfer {
    fn args(&self, source: &Path, destination: &str) -> Vec<String> {
        let mut args = vec!["move".to_string()];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        args.push("--s3-no-check-bucket".to_string());
        args.push(source.display().to_string());
        args.push(destination.to_string());
        args
    }
}

impl FileTransfer for RcloneTransfer {
    fn move_to(&self, source: &Path, destination: &str) -> Result<()> {
        let binary = locate(&self.binary)?;
        let mut cmd = Command::new(&binary);
        cmd.args(self.args(source, destination));
        run_with_deadline(cmd, &self.binary.display().to_string(), self.timeout)?;
        tracing::info!(source = %source.display(), destination, "moved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

/// Resolve a tool: bare names through `PATH`, anything with a directory
/// component as given.
fn locate(tool: &Path) -> Result<PathBuf> {
    if tool.components().count() > 1 {
        if tool.exists() {
            return Ok(tool.to_path_buf());
        }
        return Err(SatromoError::ToolNotFound(tool.display().to_string()));
    }
    which::which(tool).map_err(|_| SatromoError::ToolNotFound(tool.display().to_string()))
}

/// Run `cmd` to completion or until `timeout` elapses, returning its stdout.
///
/// stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe while we poll.
pub(crate) fn run_with_deadline(mut cmd: Command, tool: &str, timeout: Duration) -> Result<String> {
    tracing::debug!(tool, ?cmd, "spawning");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SatromoError::ToolSpawnFailed {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                if bounded_reap(&mut child).is_none() {
                    tracing::warn!(tool, "child did not exit after kill; abandoning it");
                }
                return Err(SatromoError::ToolTimeout {
                    tool: tool.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    if !status.success() {
        let stderr = stderr.trim();
        return Err(SatromoError::ToolFailed {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: stderr.chars().take(STDERR_LIMIT).collect(),
        });
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn bounded_reap(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => return None,
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
