//! Per-invocation context: which deployment we run in, for which date, and
//! where the record stores live.

use crate::completed::CompletedJobStore;
use crate::config::{Config, EnvironmentConfig, EnvironmentsConfig, FilesConfig};
use crate::empty_dates::EmptyDateMarkers;
use crate::error::{Result, SatromoError};
use crate::ledger::JobLedger;
use crate::paths;
use crate::product_status::ProductStatusTracker;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Int,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Dev => "dev",
            Environment::Int => "int",
        })
    }
}

/// Dev when the secrets file exists under `root`, else int when the secret
/// variable is set and non-empty.
pub fn detect_environment(
    root: &Path,
    envs: &EnvironmentsConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Environment> {
    if paths::resolve(root, &envs.dev_secrets_file).is_file() {
        return Ok(Environment::Dev);
    }
    if lookup(&envs.int_secret_env).is_some_and(|v| !v.is_empty()) {
        return Ok(Environment::Int);
    }
    Err(SatromoError::UnrecognizedRunContext {
        secrets_file: envs.dev_secrets_file.display().to_string(),
        secret_env: envs.int_secret_env.clone(),
    })
}

// ---------------------------------------------------------------------------
// StorePaths / Stores
// ---------------------------------------------------------------------------

/// Record-store locations resolved against the project root.
#[derive(Debug, Clone, Serialize)]
pub struct StorePaths {
    pub running_jobs: PathBuf,
    pub completed_jobs: PathBuf,
    pub product_status: PathBuf,
    pub empty_dates: PathBuf,
    pub processing_dir: PathBuf,
}

impl StorePaths {
    pub fn resolve(root: &Path, files: &FilesConfig) -> Self {
        Self {
            running_jobs: paths::resolve(root, &files.running_jobs),
            completed_jobs: paths::resolve(root, &files.completed_jobs),
            product_status: paths::resolve(root, &files.product_status),
            empty_dates: paths::resolve(root, &files.empty_dates),
            processing_dir: paths::resolve(root, &files.processing_dir),
        }
    }
}

/// All durable state, loaded once per invocation.
#[derive(Debug)]
pub struct Stores {
    pub ledger: JobLedger,
    pub completed: CompletedJobStore,
    pub status: ProductStatusTracker,
    pub markers: EmptyDateMarkers,
}

impl Stores {
    pub fn load(paths: &StorePaths) -> Result<Self> {
        Ok(Self {
            ledger: JobLedger::load(&paths.running_jobs)?,
            completed: CompletedJobStore::load(&paths.completed_jobs)?,
            status: ProductStatusTracker::load(&paths.product_status)?,
            markers: EmptyDateMarkers::load(&paths.empty_dates)?,
        })
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunContext {
    pub root: PathBuf,
    pub environment: Environment,
    pub settings: EnvironmentConfig,
    pub as_of: NaiveDate,
    pub paths: StorePaths,
}

impl RunContext {
    /// Detect the environment from the process environment.
    pub fn detect(root: &Path, config: &Config, as_of: NaiveDate) -> Result<Self> {
        let environment =
            detect_environment(root, &config.environments, |k| std::env::var(k).ok())?;
        Ok(Self::new(root, config, environment, as_of))
    }

    pub fn new(root: &Path, config: &Config, environment: Environment, as_of: NaiveDate) -> Self {
        let settings = match environment {
            Environment::Dev => config.environments.dev.clone(),
            Environment::Int => config.environments.int.clone(),
        };
        Self {
            root: root.to_path_buf(),
            environment,
            settings,
            as_of,
            paths: StorePaths::resolve(root, &config.files),
        }
    }

    pub fn drive_mount(&self) -> PathBuf {
        paths::resolve(&self.root, &self.settings.drive_mount)
    }

    pub fn resolve(&self, configured: &Path) -> PathBuf {
        paths::resolve(&self.root, configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{d, sample_config};
    use tempfile::TempDir;

    #[test]
    fn secrets_file_means_dev() {
        let dir = TempDir::new().unwrap();
        let cfg = sample_config("http://unused");
        let secrets = dir.path().join(&cfg.environments.dev_secrets_file);
        std::fs::create_dir_all(secrets.parent().unwrap()).unwrap();
        std::fs::write(&secrets, "{}").unwrap();

        let env = detect_environment(dir.path(), &cfg.environments, |_| {
            Some("also-set".to_string())
        })
        .unwrap();
        assert_eq!(env, Environment::Dev);
    }

    #[test]
    fn secret_variable_means_int() {
        let dir = TempDir::new().unwrap();
        let cfg = sample_config("http://unused");
        let env = detect_environment(dir.path(), &cfg.environments, |k| {
            (k == "GOOGLE_CLIENT_SECRET").then(|| "x".to_string())
        })
        .unwrap();
        assert_eq!(env, Environment::Int);
    }

    #[test]
    fn neither_is_fatal() {
        let dir = TempDir::new().unwrap();
        let cfg = sample_config("http://unused");
        let err = detect_environment(dir.path(), &cfg.environments, |_| Some(String::new()))
            .unwrap_err();
        assert!(matches!(err, SatromoError::UnrecognizedRunContext { .. }));
    }

    #[test]
    fn context_resolves_store_paths_and_mount() {
        let dir = TempDir::new().unwrap();
        let cfg = sample_config("http://unused");
        let ctx = RunContext::new(dir.path(), &cfg, Environment::Int, d("2024-03-10"));
        assert_eq!(
            ctx.paths.running_jobs,
            dir.path().join("processing/running_tasks.csv")
        );
        assert_eq!(ctx.drive_mount(), dir.path().join("drive"));
        assert_eq!(ctx.settings.destination, "s3int:satromoint/data");
    }
}
