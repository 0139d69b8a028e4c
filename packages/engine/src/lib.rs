#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The routing engine.
//!
//! [`build_snapshot`] runs the startup pipeline; an [`Engine`] holds the
//! current [`Snapshot`] and answers queries against it. Queries clone the
//! snapshot's `Arc` and drop the lock before searching, so
//! [`Engine::publish`] never waits for a running query and never disturbs
//! one.

mod config;
mod pipeline;
mod snapshot;

pub use config::{CrimeFeed, EngineConfig, NetworkConfig};
pub use pipeline::build_snapshot;
pub use snapshot::{EngineStats, Snapshot};

use std::sync::{Arc, PoisonError, RwLock};

use saferoute_calibrate::CalibrationError;
use saferoute_graph::GraphBuildError;
use saferoute_network::NetworkError;
use saferoute_risk::RiskError;
use saferoute_route_models::{Algorithm, Coordinate, ModeDescription, RouteResult, Variant};
use saferoute_search::{RouteSearch, SearchConfig};
use saferoute_source::SourceError;
use saferoute_source::progress::ProgressCallback;
use tokio_util::sync::CancellationToken;

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration file could not be parsed.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Parser message.
        message: String,
    },

    /// Configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A crime feed failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The road network failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A risk surface failed.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Graph construction or validation failed.
    #[error(transparent)]
    Graph(#[from] GraphBuildError),

    /// Calibration failed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// A blocking build task panicked.
    #[error("Build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Serves route queries from the current snapshot.
#[derive(Debug)]
pub struct Engine {
    snapshot: RwLock<Arc<Snapshot>>,
    search: SearchConfig,
}

impl Engine {
    #[must_use]
    pub fn new(snapshot: Snapshot, search: SearchConfig) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            search,
        }
    }

    /// Runs the startup pipeline and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns any error from [`build_snapshot`].
    pub async fn build(
        config: &EngineConfig,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<Self, EngineError> {
        let snapshot = build_snapshot(config, progress).await?;
        Ok(Self::new(snapshot, config.search.clone()))
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the current snapshot, returning the previous one. Queries
    /// already running keep their own handle to the old snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        log::info!(
            "Publishing snapshot built at {} (coefficients {:?})",
            next.built_at,
            next.graphs.coefficients()
        );
        std::mem::replace(&mut *current, next)
    }

    /// Rebuilds from `config` and publishes the result. The current snapshot
    /// keeps serving until the new one is ready, and stays if the build
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns any error from [`build_snapshot`].
    pub async fn rebuild(
        &self,
        config: &EngineConfig,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<(), EngineError> {
        let snapshot = build_snapshot(config, progress).await?;
        self.publish(snapshot);
        Ok(())
    }

    #[must_use]
    pub const fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Finds one route.
    #[must_use]
    pub fn find_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variant: Variant,
        algorithm: Algorithm,
    ) -> RouteResult {
        self.find_route_with_cancel(
            origin,
            destination,
            variant,
            algorithm,
            &CancellationToken::new(),
        )
    }

    /// Finds one route, stopping early when `cancel` fires.
    #[must_use]
    pub fn find_route_with_cancel(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variant: Variant,
        algorithm: Algorithm,
        cancel: &CancellationToken,
    ) -> RouteResult {
        let snapshot = self.snapshot();
        RouteSearch::new(&snapshot.graphs, &self.search).find_route_with_cancel(
            origin,
            destination,
            variant,
            algorithm,
            cancel,
        )
    }

    /// Runs each of `variants` for the same endpoints against one snapshot.
    #[must_use]
    pub fn compare(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variants: &[Variant],
        algorithm: Algorithm,
        cancel: &CancellationToken,
    ) -> Vec<RouteResult> {
        let snapshot = self.snapshot();
        RouteSearch::new(&snapshot.graphs, &self.search).compare(
            origin,
            destination,
            variants,
            algorithm,
            cancel,
        )
    }

    /// Id, name and description of every variant.
    #[must_use]
    pub fn modes() -> Vec<ModeDescription> {
        Variant::all().iter().map(|v| v.describe()).collect()
    }

    /// Summary of the current snapshot.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.snapshot().stats()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use saferoute_network::{TagClassifier, build_network};
    use saferoute_network_models::RawWay;
    use saferoute_risk::RiskLookup;
    use saferoute_route_models::{CalibratedCoefficients, RouteError};
    use saferoute_source::fetch::DataLocation;
    use saferoute_source::progress::null_progress;
    use saferoute_source_models::DropReason;

    use super::*;

    // West Lafayette, inside the built-in city's bounding box.
    const LAT0: f64 = 40.42;
    const LON0: f64 = -86.92;
    const SPACING: f64 = 0.003;

    fn at(row: u32, col: u32) -> Coordinate {
        Coordinate::new(
            SPACING.mul_add(f64::from(row), LAT0),
            SPACING.mul_add(f64::from(col), LON0),
        )
    }

    struct NoRisk;

    impl RiskLookup for NoRisk {
        fn risk(&self, _lat: f64, _lon: f64) -> f64 {
            0.0
        }
    }

    fn grid_ways() -> Vec<RawWay> {
        let tags = |highway: &str| {
            [("highway".to_string(), highway.to_string())]
                .into_iter()
                .collect()
        };
        let mut ways = Vec::new();
        for i in 0..5_u32 {
            ways.push(RawWay {
                id: i64::from(i),
                tags: tags(if i == 4 { "cycleway" } else { "residential" }),
                coords: (0..5).map(|j| (at(i, j).lat, at(i, j).lon)).collect(),
            });
            ways.push(RawWay {
                id: 100 + i64::from(i),
                tags: tags("residential"),
                coords: (0..5).map(|j| (at(j, i).lat, at(j, i).lon)).collect(),
            });
        }
        ways
    }

    /// The grid as a GeoJSON FeatureCollection.
    fn grid_geojson() -> String {
        let features: Vec<String> = grid_ways()
            .iter()
            .map(|way| {
                let coords: Vec<String> = way
                    .coords
                    .iter()
                    .map(|(lat, lon)| format!("[{lon},{lat}]"))
                    .collect();
                format!(
                    r#"{{"type":"Feature","id":"way/{}","properties":{{"highway":"{}"}},"geometry":{{"type":"LineString","coordinates":[{}]}}}}"#,
                    way.id,
                    way.tags["highway"],
                    coords.join(",")
                )
            })
            .collect();
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    /// `count` theft reports at `spot`, ids `{prefix}0`, `{prefix}1`, ...
    fn theft_reports(prefix: &str, count: usize, spot: Coordinate) -> Vec<String> {
        (0..count)
            .map(|i| {
                format!(
                    r#"{{"id":"{prefix}{i}","parentIncidentType":"Theft","date":"2024-03-0{}T12:00:00.000Z","location":{{"type":"Point","coordinates":[{},{}]}}}}"#,
                    i % 9 + 1,
                    spot.lon,
                    spot.lat
                )
            })
            .collect()
    }

    fn city_protect_payload(incidents: &[String]) -> String {
        format!(
            r#"{{"result":{{"list":{{"incidents":[{}]}}}}}}"#,
            incidents.join(",")
        )
    }

    /// Theft reports clustered on the grid centre, plus one report whose
    /// category maps to nothing.
    fn incidents_json() -> String {
        let centre = at(2, 2);
        let mut incidents = theft_reports("t", 30, centre);
        incidents.push(format!(
            r#"{{"id":"x1","parentIncidentType":"Zzyzx","location":{{"type":"Point","coordinates":[{},{}]}}}}"#,
            centre.lon,
            centre.lat
        ));
        city_protect_payload(&incidents)
    }

    fn fixed_config(network: &Path, crime: Option<&Path>) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.network.location = DataLocation::Path(network.to_path_buf());
        config.retry = saferoute_source::retry::RetryPolicy::immediate(1);
        config.calibration.fixed = Some(CalibratedCoefficients::new(10.0, 2.0).unwrap());
        if let Some(crime) = crime {
            config.crime.push(CrimeFeed {
                city: "west_lafayette".to_string(),
                location: DataLocation::Path(crime.to_path_buf()),
            });
        }
        config
    }

    fn engine_without_risk() -> Engine {
        let network = build_network(grid_ways(), &TagClassifier).0;
        let mut config = EngineConfig::default();
        config.calibration.fixed = Some(CalibratedCoefficients::default());
        let snapshot = Snapshot::assemble(network, &NoRisk, &config).unwrap();
        Engine::new(snapshot, config.search)
    }

    #[test]
    fn modes_describe_every_variant() {
        let modes = Engine::modes();
        assert_eq!(modes.len(), 4);
        assert_eq!(modes[3].id, Variant::SafeBike);
        assert_eq!(modes[0].name, "Fastest Route");
    }

    #[test]
    fn queries_run_against_the_published_snapshot() {
        let engine = engine_without_risk();
        let result = engine.find_route(at(0, 0), at(4, 4), Variant::Fastest, Algorithm::Astar);
        assert!(result.is_ok());
        assert_eq!(result.node_count, 9);

        let far = engine.find_route(
            at(0, 0),
            Coordinate::new(LAT0 + 0.45, LON0),
            Variant::Fastest,
            Algorithm::Astar,
        );
        assert!(matches!(far.error, Some(RouteError::OutOfServiceArea { .. })));
    }

    #[test]
    fn publish_swaps_without_touching_old_holders() {
        let engine = engine_without_risk();
        let held = engine.snapshot();

        let network = build_network(grid_ways(), &TagClassifier).0;
        let mut config = EngineConfig::default();
        let replacement = CalibratedCoefficients::new(4.0, 1.0).unwrap();
        config.calibration.fixed = Some(replacement);
        let previous = engine.publish(Snapshot::assemble(network, &NoRisk, &config).unwrap());

        assert!(Arc::ptr_eq(&previous, &held));
        assert_eq!(*held.graphs.coefficients(), CalibratedCoefficients::default());
        assert_eq!(*engine.snapshot().graphs.coefficients(), replacement);
        assert_eq!(engine.stats().coefficients, replacement);
    }

    #[tokio::test]
    async fn builds_from_files_and_detours_around_crime() {
        let dir = tempfile::tempdir().unwrap();
        let network = dir.path().join("grid.geojson");
        let crime = dir.path().join("incidents.json");
        std::fs::write(&network, grid_geojson()).unwrap();
        std::fs::write(&crime, incidents_json()).unwrap();

        let config = fixed_config(&network, Some(&crime));
        let engine = Engine::build(&config, null_progress()).await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.network.edges, 80);
        assert_eq!(stats.ingest.len(), 1);
        assert_eq!(stats.ingest[0].accepted, 30);
        assert_eq!(stats.ingest[0].dropped[&DropReason::UnknownCategory], 1);
        assert_eq!(stats.ingest[0].dropped_total(), 1);
        assert_eq!(stats.surfaces.len(), 1);
        assert_eq!(stats.surfaces[0].incidents, 30);

        let results = engine.compare(
            at(2, 0),
            at(2, 4),
            Variant::all(),
            Algorithm::Dijkstra,
            &CancellationToken::new(),
        );
        let fastest = &results[Variant::Fastest.index()];
        let safe = &results[Variant::Safe.index()];
        assert!(fastest.is_ok() && safe.is_ok());
        assert!(safe.distance_m > fastest.distance_m);
        assert!(safe.safety_score > fastest.safety_score);
    }

    #[tokio::test]
    async fn feeds_for_the_same_city_share_one_surface() {
        let dir = tempfile::tempdir().unwrap();
        let network = dir.path().join("grid.geojson");
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        std::fs::write(&network, grid_geojson()).unwrap();
        std::fs::write(&first, incidents_json()).unwrap();

        // Ten new reports in the north-east corner, plus a repeat of `t0`.
        let corner = at(4, 4);
        let mut extra = theft_reports("u", 10, corner);
        extra.extend(theft_reports("t", 1, corner));
        std::fs::write(&second, city_protect_payload(&extra)).unwrap();

        let mut config = fixed_config(&network, Some(&first));
        config.crime.push(CrimeFeed {
            city: "west_lafayette".to_string(),
            location: DataLocation::Path(second),
        });
        let engine = Engine::build(&config, null_progress()).await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.ingest.len(), 1);
        assert_eq!(stats.ingest[0].accepted, 40);
        assert_eq!(stats.ingest[0].dropped[&DropReason::Duplicate], 1);
        assert_eq!(stats.surfaces.len(), 1);
        assert_eq!(stats.surfaces[0].incidents, 40);

        let snapshot = engine.snapshot();
        let graph = snapshot.graphs.network();
        let corner_risk = graph
            .edges()
            .iter()
            .filter(|edge| {
                let node = graph.node(edge.from);
                (node.lat - corner.lat).abs() < 1e-6 && (node.lon - corner.lon).abs() < 1e-6
            })
            .map(|edge| snapshot.graphs.features().risk(edge.id))
            .fold(0.0_f64, f64::max);
        assert!(corner_risk > 0.05, "corner risk {corner_risk}");
    }

    #[tokio::test]
    async fn missing_network_without_cache_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixed_config(&dir.path().join("missing.geojson"), None);
        let err = Engine::build(&config, null_progress()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Network(NetworkError::DataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn falls_back_to_the_cached_network() {
        let dir = tempfile::tempdir().unwrap();
        let network = dir.path().join("grid.geojson");
        std::fs::write(&network, grid_geojson()).unwrap();

        let mut config = fixed_config(&network, None);
        config.network.cache_path = Some(dir.path().join("network.msgpack"));
        let first = Engine::build(&config, null_progress()).await.unwrap();
        assert!(!first.stats().network_from_cache);

        std::fs::remove_file(&network).unwrap();
        first.rebuild(&config, null_progress()).await.unwrap();
        let stats = first.stats();
        assert!(stats.network_from_cache);
        assert_eq!(stats.network.edges, 80);
    }
}
