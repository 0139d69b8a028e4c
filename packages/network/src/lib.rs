#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road network loading and the routable [`InfrastructureGraph`].
//!
//! Raw ways come from a [`NetworkSource`] (a `GeoJSON` or OSM PBF file or
//! URL, or ways already in memory). They are filtered by access rules,
//! classified for bicycle infrastructure ([`classify`]) and split into a
//! directed multigraph ([`build`]). [`load_network`] wraps the read in
//! bounded retry and falls back to the last cached snapshot ([`cache`]) when
//! the source stays unavailable.

pub mod build;
pub mod cache;
pub mod classify;
pub mod geojson_ways;
mod graph;
pub mod pbf;
pub mod source;

use std::path::PathBuf;

use geo::{Distance, Haversine, Point};
use saferoute_source::SourceError;
use saferoute_source::retry::{RetryPolicy, Transient, with_retry};

pub use build::{BuildReport, build_network};
pub use classify::{Classification, InfrastructureClassifier, TagClassifier};
pub use graph::InfrastructureGraph;
pub use source::{LocationSource, NetworkFormat, NetworkSource, StaticSource};

/// Metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Errors raised while loading or assembling the road network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Reading the payload failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The payload is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The payload is not a valid OSM PBF extract.
    #[error("PBF error: {message}")]
    Pbf {
        /// Decoder message.
        message: String,
    },

    /// The payload decoded but has the wrong shape.
    #[error("Network format error: {message}")]
    Format {
        /// What is wrong.
        message: String,
    },

    /// Prebuilt nodes and edges are inconsistent.
    #[error("Invalid network snapshot: {message}")]
    InvalidSnapshot {
        /// What is wrong.
        message: String,
    },

    /// The snapshot cache could not be written or read.
    #[error("Network cache {path}: {reason}")]
    Cache {
        /// Cache file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The source produced no routable edges.
    #[error("Network from {location} has no routable edges")]
    Empty {
        /// Source description.
        location: String,
    },

    /// The source could not be read after all retries and no cached
    /// snapshot exists.
    #[error("Network data unavailable from {location}: {reason}")]
    DataUnavailable {
        /// Source description.
        location: String,
        /// Last error seen.
        reason: String,
    },
}

impl NetworkError {
    /// Whether retrying the read might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_transient())
    }
}

impl Transient for NetworkError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

/// Great-circle distance in metres.
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// How [`load_network`] retries and caches.
#[derive(Debug, Clone, Default)]
pub struct NetworkLoadOptions {
    /// Retry policy for the source read.
    pub retry: RetryPolicy,
    /// Snapshot file refreshed after each successful load and read back when
    /// the source is unavailable.
    pub cache_path: Option<PathBuf>,
}

/// A loaded network and how it was obtained.
#[derive(Debug, Clone)]
pub struct LoadedNetwork {
    /// The routable graph.
    pub graph: InfrastructureGraph,
    /// Build counts; empty when loaded from the cache.
    pub report: BuildReport,
    /// Whether the graph came from the snapshot cache.
    pub from_cache: bool,
}

/// Reads, classifies and assembles the road network.
///
/// # Errors
///
/// Returns [`NetworkError::DataUnavailable`] if the source fails after all
/// retries and no valid cached snapshot exists, or [`NetworkError::Empty`] if
/// the source yields no routable edges.
pub async fn load_network(
    source: &dyn NetworkSource,
    classifier: &dyn InfrastructureClassifier,
    options: &NetworkLoadOptions,
) -> Result<LoadedNetwork, NetworkError> {
    let label = source.describe();
    log::info!("Loading road network from {label}");

    let live = with_retry(&options.retry, &label, || source.read_ways()).await;
    let ways = match live {
        Ok(ways) => ways,
        Err(e) => return load_cached(&label, &e, options).await,
    };

    let (graph, report) = build_network(ways, classifier);
    if graph.edge_count() == 0 {
        return Err(NetworkError::Empty { location: label });
    }

    if let Some(path) = &options.cache_path
        && let Err(e) = cache::write_snapshot(path, &graph.to_snapshot()).await
    {
        log::warn!("Failed to refresh network cache: {e}");
    }

    Ok(LoadedNetwork {
        graph,
        report,
        from_cache: false,
    })
}

async fn load_cached(
    label: &str,
    error: &NetworkError,
    options: &NetworkLoadOptions,
) -> Result<LoadedNetwork, NetworkError> {
    let unavailable = || NetworkError::DataUnavailable {
        location: label.to_string(),
        reason: error.to_string(),
    };
    let Some(path) = &options.cache_path else {
        return Err(unavailable());
    };

    match cache::read_snapshot(path).await {
        Ok(snapshot) => {
            let (graph, _) = InfrastructureGraph::from_snapshot(snapshot)?;
            log::warn!(
                "{label}: unavailable ({error}), using cached network {} ({} nodes, {} edges)",
                path.display(),
                graph.node_count(),
                graph.edge_count()
            );
            Ok(LoadedNetwork {
                graph,
                report: BuildReport::default(),
                from_cache: true,
            })
        }
        Err(cache_error) => {
            log::debug!("{label}: no usable network cache: {cache_error}");
            Err(unavailable())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use saferoute_network_models::RawWay;

    use super::*;

    struct FlakySource {
        calls: AtomicU32,
        failures: u32,
        ways: Vec<RawWay>,
    }

    #[async_trait]
    impl NetworkSource for FlakySource {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        async fn read_ways(&self) -> Result<Vec<RawWay>, NetworkError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(NetworkError::Source(SourceError::HttpStatus {
                    status: 503,
                    url: "https://tiles.example.invalid/roads.pbf".to_string(),
                }))
            } else {
                Ok(self.ways.clone())
            }
        }
    }

    fn ways() -> Vec<RawWay> {
        vec![RawWay {
            id: 1,
            tags: [("highway".to_string(), "residential".to_string())]
                .into_iter()
                .collect(),
            coords: vec![(40.42, -86.90), (40.43, -86.90), (40.43, -86.91)],
        }]
    }

    fn flaky(failures: u32) -> FlakySource {
        FlakySource {
            calls: AtomicU32::new(0),
            failures,
            ways: ways(),
        }
    }

    #[test]
    fn haversine_is_in_metres() {
        let d = haversine_m(40.0, -86.0, 40.001, -86.0);
        assert!((d - 111.2).abs() < 0.5, "{d}");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let source = flaky(2);
        let options = NetworkLoadOptions {
            retry: RetryPolicy::immediate(3),
            cache_path: None,
        };
        let loaded = load_network(&source, &TagClassifier, &options).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(loaded.graph.edge_count(), 4);
        assert!(!loaded.from_cache);
    }

    #[tokio::test]
    async fn gives_up_without_cache() {
        let source = flaky(u32::MAX);
        let options = NetworkLoadOptions {
            retry: RetryPolicy::immediate(3),
            cache_path: None,
        };
        let err = load_network(&source, &TagClassifier, &options)
            .await
            .unwrap_err();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, NetworkError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn falls_back_to_cached_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let options = NetworkLoadOptions {
            retry: RetryPolicy::immediate(2),
            cache_path: Some(dir.path().join("network.msgpack")),
        };

        let fresh = load_network(&flaky(0), &TagClassifier, &options).await.unwrap();
        let cached = load_network(&flaky(u32::MAX), &TagClassifier, &options)
            .await
            .unwrap();

        assert!(cached.from_cache);
        assert_eq!(cached.graph.to_snapshot(), fresh.graph.to_snapshot());
    }

    #[tokio::test]
    async fn empty_network_is_an_error() {
        let source = StaticSource {
            ways: vec![RawWay {
                id: 1,
                tags: [("highway".to_string(), "motorway".to_string())]
                    .into_iter()
                    .collect(),
                coords: vec![(40.42, -86.90), (40.43, -86.90)],
            }],
        };
        assert!(matches!(
            load_network(&source, &TagClassifier, &NetworkLoadOptions::default()).await,
            Err(NetworkError::Empty { .. })
        ));
    }
}
