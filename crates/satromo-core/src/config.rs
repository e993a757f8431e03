use crate::error::{Result, SatromoError};
use crate::generation::GenerationHandler;
use crate::paths;
use crate::product::ProductDescriptor;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// FilesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_running_jobs")]
    pub running_jobs: PathBuf,
    #[serde(default = "default_completed_jobs")]
    pub completed_jobs: PathBuf,
    #[serde(default = "default_product_status")]
    pub product_status: PathBuf,
    #[serde(default = "default_empty_dates")]
    pub empty_dates: PathBuf,
    #[serde(default = "default_processing_dir")]
    pub processing_dir: PathBuf,
}

fn default_running_jobs() -> PathBuf {
    PathBuf::from(paths::RUNNING_JOBS_FILE)
}

fn default_completed_jobs() -> PathBuf {
    PathBuf::from(paths::COMPLETED_JOBS_FILE)
}

fn default_product_status() -> PathBuf {
    PathBuf::from(paths::PRODUCT_STATUS_FILE)
}

fn default_empty_dates() -> PathBuf {
    PathBuf::from(paths::EMPTY_DATES_FILE)
}

fn default_processing_dir() -> PathBuf {
    PathBuf::from(paths::PROCESSING_DIR)
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            running_jobs: default_running_jobs(),
            completed_jobs: default_completed_jobs(),
            product_status: default_product_status(),
            empty_dates: default_empty_dates(),
            processing_dir: default_processing_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvironmentsConfig
// ---------------------------------------------------------------------------

/// Settings that differ between the developer and integration deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Directory where the compute service drops partition exports.
    pub drive_mount: PathBuf,
    /// Publish destination URI, e.g. `s3int:satromoint/data`.
    pub destination: String,
    #[serde(default = "default_transfer_binary")]
    pub transfer_binary: PathBuf,
    #[serde(default)]
    pub transfer_config: Option<PathBuf>,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_seconds: u64,
}

fn default_transfer_binary() -> PathBuf {
    PathBuf::from("rclone")
}

fn default_transfer_timeout() -> u64 {
    1800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentsConfig {
    /// Present on developer machines only.
    #[serde(default = "default_dev_secrets_file")]
    pub dev_secrets_file: PathBuf,
    /// Set by the scheduled integration runner.
    #[serde(default = "default_int_secret_env")]
    pub int_secret_env: String,
    pub dev: EnvironmentConfig,
    pub int: EnvironmentConfig,
}

fn default_dev_secrets_file() -> PathBuf {
    PathBuf::from("secrets/geetest-credentials.secret")
}

fn default_int_secret_env() -> String {
    "GOOGLE_CLIENT_SECRET".to_string()
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Boundary polygon the merged raster is clipped to.
    #[serde(default)]
    pub cutline: Option<PathBuf>,
    #[serde(default = "default_nodata")]
    pub nodata: i32,
    #[serde(default = "default_merge_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_buildvrt")]
    pub buildvrt_binary: String,
    #[serde(default = "default_warp")]
    pub warp_binary: String,
}

fn default_nodata() -> i32 {
    9999
}

fn default_merge_timeout() -> u64 {
    3600
}

fn default_buildvrt() -> String {
    "gdalbuildvrt".to_string()
}

fn default_warp() -> String {
    "gdalwarp".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            cutline: None,
            nodata: default_nodata(),
            timeout_seconds: default_merge_timeout(),
            buildvrt_binary: default_buildvrt(),
            warp_binary: default_warp(),
        }
    }
}

// ---------------------------------------------------------------------------
// CollectionConfig
// ---------------------------------------------------------------------------

/// Settings for one derived (step-0) collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub generator: GenerationHandler,
    /// Assets older than this many days are pruned before the window check.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub service: ServiceConfig,
    #[serde(default)]
    pub files: FilesConfig,
    pub environments: EnvironmentsConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    pub roi: Region,
    #[serde(default = "default_output_crs")]
    pub output_crs: String,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
    #[serde(default)]
    pub products: Vec<ProductDescriptor>,
}

fn default_version() -> u32 {
    1
}

fn default_output_crs() -> String {
    "EPSG:2056".to_string()
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SatromoError::NotInitialized(root.to_path_buf()));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ConfigWarning {
            level: WarnLevel::Warning,
            message,
        };

        // 1. Service endpoint must be set
        if self.service.base_url.trim().is_empty() {
            warnings.push(error("service.base_url is empty".to_string()));
        }
        if self.service.timeout_seconds == 0 {
            warnings.push(error("service.timeout_seconds must be at least 1".to_string()));
        }

        // 2. ROI must be a proper rectangle
        if !self.roi.is_valid() {
            warnings.push(error(format!(
                "roi {:?} is empty or not finite",
                <[f64; 4]>::from(self.roi)
            )));
        }

        // 3. Products: unique names, non-zero coverage, known collection
        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.name.as_str()) {
                warnings.push(error(format!("duplicate product name '{}'", product.name)));
            }
            if product.temporal_coverage == 0 {
                warnings.push(error(format!(
                    "product '{}' has a temporal_coverage of 0 days",
                    product.name
                )));
            }
            if !self.collections.contains_key(&product.step0_collection) {
                warnings.push(error(format!(
                    "product '{}' consumes '{}' which has no collections entry",
                    product.name, product.step0_collection
                )));
            }
            if product.prefix.trim().is_empty() {
                warnings.push(error(format!("product '{}' has an empty prefix", product.name)));
            }
        }

        // 4. Collections: unused entries and retention inside the window
        for (name, collection) in &self.collections {
            let coverage = self
                .products
                .iter()
                .filter(|p| &p.step0_collection == name)
                .map(|p| p.temporal_coverage)
                .max();
            match (coverage, collection.retention_days) {
                (None, _) => {
                    warnings.push(warning(format!(
                        "collection '{name}' is not consumed by any product"
                    )));
                }
                (Some(c), Some(r)) if r < c => {
                    warnings.push(warning(format!(
                        "collection '{name}' retains {r} days but products need {c}; \
                         pruning stops at the window start"
                    )));
                }
                _ => {}
            }
        }

        // 5. Base collections behind one derived collection must agree
        let mut bases: BTreeMap<&str, &str> = BTreeMap::new();
        for product in &self.products {
            let base = bases
                .entry(product.step0_collection.as_str())
                .or_insert(product.image_collection.as_str());
            if *base != product.image_collection {
                warnings.push(error(format!(
                    "collection '{}' is fed by both '{}' and '{}'",
                    product.step0_collection, base, product.image_collection
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
