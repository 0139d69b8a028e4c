//! Engine configuration, loaded from a TOML file.
//!
//! ```toml
//! [network]
//! location = "data/west_lafayette.osm.pbf"
//! cache_path = "data/network.msgpack"
//!
//! [[crime]]
//! city = "west_lafayette"
//! location = "https://example.org/incidents.json"
//!
//! [calibration]
//! target_differentiation = 0.3
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use saferoute_calibrate::CalibrationConfig;
use saferoute_graph::GraphConfig;
use saferoute_network::NetworkFormat;
use saferoute_risk::SurfaceConfig;
use saferoute_search::SearchConfig;
use saferoute_source::fetch::DataLocation;
use saferoute_source::retry::RetryPolicy;
use serde::Deserialize;

use crate::EngineError;

/// Where the road network comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// GeoJSON or OSM PBF file or URL.
    pub location: DataLocation,
    /// Overrides the format inferred from the file extension.
    pub format: Option<NetworkFormat>,
    /// Snapshot refreshed on every successful load and used when the source
    /// is unavailable.
    pub cache_path: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            location: DataLocation::Path(PathBuf::from("data/network.geojson")),
            format: None,
            cache_path: None,
        }
    }
}

/// One city's crime feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrimeFeed {
    /// City definition id from the built-in registry.
    pub city: String,
    /// Raw feed file or URL.
    pub location: DataLocation,
}

/// Everything needed to build and serve routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub crime: Vec<CrimeFeed>,
    /// Directory for raw crime payloads fetched over HTTP.
    pub crime_cache_dir: Option<PathBuf>,
    /// Concurrent crime feed fetches.
    pub ingest_concurrency: usize,
    pub retry: RetryPolicy,
    pub risk: SurfaceConfig,
    pub graph: GraphConfig,
    pub calibration: CalibrationConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the document is not valid TOML or
    /// does not match the configuration schema.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config {
            message: e.to_string(),
        })
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be read, or
    /// [`EngineError::Config`] if it cannot be parsed.
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let text = tokio::fs::read_to_string(path).await?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Concurrency for crime feed fetches; zero means one.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.ingest_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert!(config.crime.is_empty());
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.search, SearchConfig::default());
        assert_eq!(config.effective_concurrency(), 1);
    }

    #[test]
    fn parses_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            ingest_concurrency = 4

            [network]
            location = "https://example.org/city.osm.pbf"
            format = "pbf"

            [[crime]]
            city = "indianapolis"
            location = "data/indy.csv"

            [retry]
            max_attempts = 2

            [risk]
            cell_size_m = 50.0

            [graph.sampling]
            mode = "uniform"
            samples = 3

            [calibration]
            fixed = { crimePenaltyScale = 2.0, bikeBonusScale = 1.0 }

            [search]
            max_snap_distance_m = 250.0
            "#,
        )
        .unwrap();

        assert_eq!(
            config.network.location,
            DataLocation::Url("https://example.org/city.osm.pbf".to_string())
        );
        assert_eq!(config.network.format, Some(NetworkFormat::Pbf));
        assert_eq!(config.crime[0].city, "indianapolis");
        assert_eq!(config.retry.max_attempts, 2);
        assert!((config.risk.cell_size_m - 50.0).abs() < f64::EPSILON);
        assert_eq!(
            config.graph.sampling,
            saferoute_graph::SamplingResolution::Uniform { samples: 3 }
        );
        assert!(config.calibration.fixed.is_some());
        assert!((config.search.max_snap_distance_m - 250.0).abs() < f64::EPSILON);
        assert_eq!(config.effective_concurrency(), 4);
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(matches!(
            EngineConfig::from_toml_str("crime = 3"),
            Err(EngineError::Config { .. })
        ));
    }
}
