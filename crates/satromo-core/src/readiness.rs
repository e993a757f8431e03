//! The temporal readiness gate.
//!
//! A derived collection is ready for day D when every day of its trailing
//! window has either an asset or an empty-date marker. Days that have
//! neither get a generation job submitted; days with a generation job still
//! in flight are left alone. Both count as not ready, so the products that
//! consume the collection wait for a later invocation.

use crate::completed::CompletedJobStore;
use crate::compute::{ComputeService, GenerationOutcome};
use crate::config::CollectionConfig;
use crate::empty_dates::EmptyDateMarkers;
use crate::error::{Result, SatromoError};
use crate::generation::{self, GenerationHandler};
use crate::job::JobStatus;
use crate::product::ProductRegistry;
use crate::region::Region;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// CollectionWindow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionWindow {
    pub collection: String,
    pub base_collection: String,
    /// Largest temporal coverage over the consuming products.
    pub coverage_days: u32,
    pub retention_days: Option<u32>,
    pub generator: GenerationHandler,
    pub products: Vec<String>,
}

impl CollectionWindow {
    pub fn basename(&self) -> &str {
        generation::basename(&self.collection)
    }

    pub fn start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of - Duration::days(i64::from(self.coverage_days.max(1)) - 1)
    }

    /// Window dates in ascending order, `as_of` last.
    pub fn dates(&self, as_of: NaiveDate) -> Vec<NaiveDate> {
        self.start(as_of)
            .iter_days()
            .take_while(|d| *d <= as_of)
            .collect()
    }

    /// Assets dated strictly before this are pruned. Never later than the
    /// window start.
    pub fn prune_cutoff(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        self.retention_days
            .map(|days| (as_of - Duration::days(i64::from(days))).min(self.start(as_of)))
    }
}

/// Build one window per derived collection, in product declaration order.
///
/// Two products that read the same derived collection must agree on the
/// upstream collection it is generated from.
pub fn collection_windows(
    registry: &ProductRegistry,
    collections: &BTreeMap<String, CollectionConfig>,
) -> Result<Vec<CollectionWindow>> {
    let mut windows: Vec<CollectionWindow> = Vec::new();
    for product in registry.iter() {
        if let Some(window) = windows
            .iter_mut()
            .find(|w| w.collection == product.step0_collection)
        {
            if window.base_collection != product.image_collection {
                return Err(SatromoError::InconsistentBaseCollection {
                    collection: product.step0_collection.clone(),
                    product: product.name.clone(),
                    expected: window.base_collection.clone(),
                    found: product.image_collection.clone(),
                });
            }
            window.coverage_days = window.coverage_days.max(product.temporal_coverage);
            window.products.push(product.name.clone());
            continue;
        }

        let settings = collections
            .get(&product.step0_collection)
            .ok_or_else(|| SatromoError::UnknownCollection(product.step0_collection.clone()))?;
        windows.push(CollectionWindow {
            collection: product.step0_collection.clone(),
            base_collection: product.image_collection.clone(),
            coverage_days: product.temporal_coverage,
            retention_days: settings.retention_days,
            generator: settings.generator,
            products: vec![product.name.clone()],
        });
    }
    Ok(windows)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DateReadiness {
    Asset,
    EmptyMarker,
    InFlight { job_id: String },
    GenerationSubmitted { job_id: String },
    /// The service reported nothing to generate from; a marker was written.
    NoSourceData,
}

impl DateReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, DateReadiness::Asset | DateReadiness::EmptyMarker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateCheck {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub readiness: DateReadiness,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub collection: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub dates: Vec<DateCheck>,
    pub pruned: Vec<String>,
}

impl WindowReport {
    pub fn is_ready(&self) -> bool {
        self.dates.iter().all(|d| d.readiness.is_ready())
    }
}

// ---------------------------------------------------------------------------
// ReadinessGate
// ---------------------------------------------------------------------------

pub struct ReadinessGate<'a> {
    compute: &'a dyn ComputeService,
    completed: &'a mut CompletedJobStore,
    markers: &'a mut EmptyDateMarkers,
    region: Region,
    crs: &'a str,
}

impl<'a> ReadinessGate<'a> {
    pub fn new(
        compute: &'a dyn ComputeService,
        completed: &'a mut CompletedJobStore,
        markers: &'a mut EmptyDateMarkers,
        region: Region,
        crs: &'a str,
    ) -> Self {
        Self {
            compute,
            completed,
            markers,
            region,
            crs,
        }
    }

    pub fn is_window_ready(&mut self, window: &CollectionWindow, as_of: NaiveDate) -> Result<bool> {
        Ok(self.check_window(window, as_of)?.is_ready())
    }

    /// Prune, then check every date of the window in ascending order,
    /// submitting generation for dates that have nothing yet.
    pub fn check_window(&mut self, window: &CollectionWindow, as_of: NaiveDate) -> Result<WindowReport> {
        let mut assets = self.compute.list_assets(&window.collection)?;
        let pruned = match window.prune_cutoff(as_of) {
            Some(cutoff) => self.prune(&mut assets, cutoff)?,
            None => Vec::new(),
        };
        let available: BTreeSet<NaiveDate> = assets.iter().map(|a| a.date).collect();
        let jobs = self.compute.list_jobs()?;

        let mut dates = Vec::new();
        for date in window.dates(as_of) {
            let readiness = self.check_date(window, date, &jobs, &available)?;
            tracing::debug!(collection = %window.collection, %date, ?readiness, "checked date");
            dates.push(DateCheck { date, readiness });
        }

        let report = WindowReport {
            collection: window.collection.clone(),
            start: window.start(as_of),
            end: as_of,
            dates,
            pruned,
        };
        if report.is_ready() {
            tracing::info!(collection = %window.collection, start = %report.start, end = %as_of, "window ready");
        } else {
            let waiting = report.dates.iter().filter(|d| !d.readiness.is_ready()).count();
            tracing::info!(collection = %window.collection, waiting, "window not ready");
        }
        Ok(report)
    }

    fn check_date(
        &mut self,
        window: &CollectionWindow,
        date: NaiveDate,
        jobs: &[JobStatus],
        available: &BTreeSet<NaiveDate>,
    ) -> Result<DateReadiness> {
        let key = generation::generation_description(&window.collection, date);
        let matching: Vec<&JobStatus> = jobs.iter().filter(|j| j.description.contains(&key)).collect();

        if let Some(job) = matching.iter().find(|j| !j.state.is_terminal()) {
            tracing::info!(%date, job_id = %job.id, state = %job.state, "generation in flight");
            return Ok(DateReadiness::InFlight {
                job_id: job.id.clone(),
            });
        }
        for job in &matching {
            if job.state.is_success() {
                self.completed.record(job)?;
            } else {
                tracing::debug!(%date, job_id = %job.id, state = %job.state, "ignoring failed generation");
            }
        }

        if available.contains(&date) {
            return Ok(DateReadiness::Asset);
        }
        if self.markers.contains(window.basename(), date) {
            return Ok(DateReadiness::EmptyMarker);
        }

        let outcome = window.generator.generate(
            self.compute,
            &window.base_collection,
            &window.collection,
            date,
            self.region,
            self.crs,
        )?;
        match outcome {
            GenerationOutcome::Submitted(job_id) => {
                tracing::info!(%date, job_id = %job_id, generator = %window.generator, "generation submitted");
                Ok(DateReadiness::GenerationSubmitted { job_id })
            }
            GenerationOutcome::NoSourceData => {
                tracing::warn!(%date, collection = %window.collection, "no source data; marking date empty");
                self.markers.mark(window.basename(), date)?;
                Ok(DateReadiness::NoSourceData)
            }
        }
    }

    /// Delete assets dated before `cutoff`, dropping them from `assets`.
    fn prune(&mut self, assets: &mut Vec<crate::compute::Asset>, cutoff: NaiveDate) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        let mut kept = Vec::with_capacity(assets.len());
        for asset in assets.drain(..) {
            if asset.date < cutoff {
                self.compute.delete_asset(&asset.id)?;
                tracing::info!(asset = %asset.id, date = %asset.date, "pruned asset");
                pruned.push(asset.id);
            } else {
                kept.push(asset);
            }
        }
        *assets = kept;
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use crate::testing::{d, ndvi_product, FakeCompute};
    use tempfile::TempDir;

    const X: &str = "projects/p/assets/X";

    struct Fixture {
        _dir: TempDir,
        completed: CompletedJobStore,
        markers: EmptyDateMarkers,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let completed = CompletedJobStore::load(&dir.path().join("completed.csv")).unwrap();
            let markers = EmptyDateMarkers::load(&dir.path().join("empty.csv")).unwrap();
            Self {
                _dir: dir,
                completed,
                markers,
            }
        }

        fn check(&mut self, compute: &FakeCompute, window: &CollectionWindow) -> WindowReport {
            ReadinessGate::new(
                compute,
                &mut self.completed,
                &mut self.markers,
                Region::new(0.0, 0.0, 1.0, 1.0),
                "EPSG:2056",
            )
            .check_window(window, d("2024-03-10"))
            .unwrap()
        }
    }

    fn window(coverage: u32, retention: Option<u32>) -> CollectionWindow {
        CollectionWindow {
            collection: X.to_string(),
            base_collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            coverage_days: coverage,
            retention_days: retention,
            generator: GenerationHandler::S2SrDailyMosaic,
            products: vec!["ndvi".to_string()],
        }
    }

    #[test]
    fn generation_then_ready_on_next_invocation() {
        let compute = FakeCompute::new();
        compute.add_asset(X, d("2024-03-08"));
        compute.add_asset(X, d("2024-03-09"));
        let mut fx = Fixture::new();

        let first = fx.check(&compute, &window(3, None));
        assert!(!first.is_ready());
        assert_eq!(first.start, d("2024-03-08"));
        let generations = compute.generations();
        assert_eq!(generations.len(), 1);
        assert_eq!(generations[0].date, d("2024-03-10"));
        assert_eq!(generations[0].description, "X_2024-03-10");
        let job_id = match &first.dates[2].readiness {
            DateReadiness::GenerationSubmitted { job_id } => job_id.clone(),
            other => panic!("unexpected readiness {other:?}"),
        };

        compute.set_state(&job_id, JobState::Succeeded);
        compute.add_asset(X, d("2024-03-10"));

        let second = fx.check(&compute, &window(3, None));
        assert!(second.is_ready());
        assert_eq!(compute.generations().len(), 1);
        assert!(fx.completed.contains(&job_id));
    }

    #[test]
    fn in_flight_job_is_not_ready_and_not_duplicated() {
        let compute = FakeCompute::new();
        compute.add_asset(X, d("2024-03-08"));
        compute.add_asset(X, d("2024-03-09"));
        compute.add_job("G7", "X_2024-03-10", JobState::Running);
        let mut fx = Fixture::new();

        let report = fx.check(&compute, &window(3, None));
        assert!(!report.is_ready());
        assert_eq!(
            report.dates[2].readiness,
            DateReadiness::InFlight {
                job_id: "G7".to_string()
            }
        );
        assert!(compute.generations().is_empty());
    }

    #[test]
    fn in_flight_job_blocks_even_when_asset_exists() {
        let compute = FakeCompute::new();
        for day in ["2024-03-08", "2024-03-09", "2024-03-10"] {
            compute.add_asset(X, d(day));
        }
        compute.add_job("G7", "X_2024-03-09", JobState::Pending);
        let mut fx = Fixture::new();

        assert!(!fx.check(&compute, &window(3, None)).is_ready());
    }

    #[test]
    fn empty_marker_satisfies_date() {
        let compute = FakeCompute::new();
        compute.add_asset(X, d("2024-03-08"));
        compute.add_asset(X, d("2024-03-10"));
        let mut fx = Fixture::new();
        fx.markers.mark("X", d("2024-03-09")).unwrap();

        let report = fx.check(&compute, &window(3, None));
        assert!(report.is_ready());
        assert_eq!(report.dates[1].readiness, DateReadiness::EmptyMarker);
        assert!(compute.generations().is_empty());
    }

    #[test]
    fn no_source_data_writes_marker_and_defers() {
        let compute = FakeCompute::new();
        compute.add_asset(X, d("2024-03-09"));
        compute.add_asset(X, d("2024-03-10"));
        compute.no_source_data(X, d("2024-03-08"));
        let mut fx = Fixture::new();

        let first = fx.check(&compute, &window(3, None));
        assert!(!first.is_ready());
        assert_eq!(first.dates[0].readiness, DateReadiness::NoSourceData);
        assert!(fx.markers.contains("X", d("2024-03-08")));

        assert!(fx.check(&compute, &window(3, None)).is_ready());
    }

    #[test]
    fn failed_generation_is_retried() {
        let compute = FakeCompute::new();
        compute.add_asset(X, d("2024-03-10"));
        compute.add_job("G1", "X_2024-03-09", JobState::Failed);
        let mut fx = Fixture::new();

        let report = fx.check(&compute, &window(2, None));
        assert!(matches!(
            report.dates[0].readiness,
            DateReadiness::GenerationSubmitted { .. }
        ));
        assert!(!fx.completed.contains("G1"));
    }

    #[test]
    fn pruning_stops_at_window_start() {
        let compute = FakeCompute::new();
        for day in ["2024-02-20", "2024-03-04", "2024-03-06", "2024-03-08", "2024-03-09", "2024-03-10"] {
            compute.add_asset(X, d(day));
        }
        let mut fx = Fixture::new();

        // as_of - 5 days = 03-05, earlier than the window start 03-08
        let report = fx.check(&compute, &window(3, Some(5)));
        assert_eq!(compute.deleted().len(), 2);
        assert_eq!(report.pruned.len(), 2);
        assert!(report.is_ready());

        // A horizon shorter than the window is clamped to the window start
        let report = fx.check(&compute, &window(3, Some(1)));
        assert_eq!(report.pruned, ["projects/p/assets/X/2024-03-06"]);
        assert!(report.is_ready());
    }

    #[test]
    fn window_uses_max_coverage_across_products() {
        let mut short = ndvi_product();
        short.temporal_coverage = 3;
        let mut long = ndvi_product();
        long.name = "mosaic".to_string();
        long.temporal_coverage = 10;
        let registry = ProductRegistry::new(vec![short, long]);
        let collections = crate::testing::sample_config("http://unused").collections;

        let windows = collection_windows(&registry, &collections).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].coverage_days, 10);
        assert_eq!(windows[0].products, ["ndvi", "mosaic"]);
        assert_eq!(windows[0].dates(d("2024-03-10")).len(), 10);
    }

    #[test]
    fn conflicting_base_collection_is_fatal() {
        let mut other = ndvi_product();
        other.name = "toa".to_string();
        other.image_collection = "COPERNICUS/S2_HARMONIZED".to_string();
        let registry = ProductRegistry::new(vec![ndvi_product(), other]);
        let collections = crate::testing::sample_config("http://unused").collections;

        let err = collection_windows(&registry, &collections).unwrap_err();
        assert!(matches!(err, SatromoError::InconsistentBaseCollection { .. }));
    }

    #[test]
    fn missing_collection_settings_is_an_error() {
        let registry = ProductRegistry::new(vec![ndvi_product()]);
        let err = collection_windows(&registry, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SatromoError::UnknownCollection(_)));
    }
}
