use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "satromo.yaml";

pub const RUNNING_JOBS_FILE: &str = "processing/running_tasks.csv";
pub const COMPLETED_JOBS_FILE: &str = "tools/completed_tasks.csv";
pub const PRODUCT_STATUS_FILE: &str = "tools/last_updates.csv";
pub const EMPTY_DATES_FILE: &str = "tools/step0_empty_assets.csv";
pub const PROCESSING_DIR: &str = "processing";

pub const PARTITION_MARKER: &str = "quadrant";
pub const RASTER_EXTENSION: &str = "tif";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path against the project root. Absolute paths pass
/// through unchanged.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// `<processing>/<stem>.tif`
pub fn merged_raster(processing_dir: &Path, stem: &str) -> PathBuf {
    processing_dir.join(format!("{stem}.{RASTER_EXTENSION}"))
}

/// `<processing>/<stem>.vrt`
pub fn merge_vrt(processing_dir: &Path, stem: &str) -> PathBuf {
    processing_dir.join(format!("{stem}.vrt"))
}

/// `<processing>/<stem>_list.txt`
pub fn merge_input_list(processing_dir: &Path, stem: &str) -> PathBuf {
    processing_dir.join(format!("{stem}_list.txt"))
}

/// `<processing>/<stem>_metadata.json`
pub fn item_metadata(processing_dir: &Path, stem: &str) -> PathBuf {
    processing_dir.join(format!("{stem}_metadata.json"))
}

/// `<destination>/<product>/<item>`, joined with `/` because destinations
/// are usually remote URIs (`remote:bucket/prefix`), not local paths.
pub fn publish_destination(destination: &str, product: &str, item: &str) -> String {
    let base = destination.trim_end_matches('/');
    format!("{base}/{product}/{item}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/srv/satromo");
        assert_eq!(
            resolve(root, Path::new("/data/ledger.csv")),
            PathBuf::from("/data/ledger.csv")
        );
        assert_eq!(
            resolve(root, Path::new(RUNNING_JOBS_FILE)),
            PathBuf::from("/srv/satromo/processing/running_tasks.csv")
        );
    }

    #[test]
    fn publish_destination_joins_remote_segments() {
        assert_eq!(
            publish_destination("s3INT:satromoint/data/", "ch.swisstopo.ndvi", "2024-03-10t240000"),
            "s3INT:satromoint/data/ch.swisstopo.ndvi/2024-03-10t240000"
        );
    }

    #[test]
    fn merge_artifacts_share_the_stem() {
        let dir = Path::new("processing");
        assert_eq!(merged_raster(dir, "prod_2024-03-10_"), dir.join("prod_2024-03-10_.tif"));
        assert_eq!(merge_vrt(dir, "prod_2024-03-10_"), dir.join("prod_2024-03-10_.vrt"));
        assert_eq!(
            merge_input_list(dir, "prod_2024-03-10_"),
            dir.join("prod_2024-03-10__list.txt")
        );
    }
}
