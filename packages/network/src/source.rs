//! Where road networks come from.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use saferoute_network_models::RawWay;
use saferoute_source::fetch::{DataLocation, http_client, read_once};
use serde::Deserialize;

use crate::NetworkError;
use crate::geojson_ways::parse_geojson;
use crate::pbf::parse_pbf;

/// Encoding of a network payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFormat {
    /// `GeoJSON` `FeatureCollection` of line features.
    Geojson,
    /// OpenStreetMap protobuf extract.
    Pbf,
}

impl NetworkFormat {
    /// Guesses the format from a file name or URL.
    #[must_use]
    pub fn infer(location: &str) -> Option<Self> {
        let lower = location.to_ascii_lowercase();
        let path = Path::new(lower.split(['?', '#']).next().unwrap_or_default());
        match path.extension().and_then(|e| e.to_str()) {
            Some("geojson" | "json") => Some(Self::Geojson),
            Some("pbf") => Some(Self::Pbf),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Geojson => "geojson",
            Self::Pbf => "pbf",
        })
    }
}

/// A single-attempt reader of raw ways. Retry and cache fallback are
/// layered on top by [`crate::load_network`].
#[async_trait]
pub trait NetworkSource: Send + Sync {
    /// Human-readable origin, used in logs and errors.
    fn describe(&self) -> String;

    /// Reads every way once.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read or decoded. Transient
    /// errors (see [`NetworkError::is_transient`]) are retried by the
    /// caller.
    async fn read_ways(&self) -> Result<Vec<RawWay>, NetworkError>;
}

/// A network stored at a path or URL.
#[derive(Debug, Clone)]
pub struct LocationSource {
    location: DataLocation,
    format: NetworkFormat,
    client: reqwest::Client,
}

impl LocationSource {
    /// Creates a source for `location`. When `format` is omitted it is
    /// inferred from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Format`] if the format cannot be inferred, or
    /// an error if the HTTP client cannot be built.
    pub fn new(
        location: DataLocation,
        format: Option<NetworkFormat>,
    ) -> Result<Self, NetworkError> {
        let format = match format {
            Some(format) => format,
            None => NetworkFormat::infer(&location.to_string()).ok_or_else(|| {
                NetworkError::Format {
                    message: format!("cannot infer network format of {location}"),
                }
            })?,
        };
        Ok(Self {
            location,
            format,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl NetworkSource for LocationSource {
    fn describe(&self) -> String {
        format!("{} ({})", self.location, self.format)
    }

    async fn read_ways(&self) -> Result<Vec<RawWay>, NetworkError> {
        let bytes = read_once(&self.client, &self.location).await?;
        let format = self.format;
        // Decoding is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || match format {
            NetworkFormat::Geojson => parse_geojson(&bytes),
            NetworkFormat::Pbf => parse_pbf(&bytes),
        })
        .await
        .map_err(|e| NetworkError::Format {
            message: format!("decoder task failed: {e}"),
        })?
    }
}

/// Ways already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    /// The ways returned by every read.
    pub ways: Vec<RawWay>,
}

#[async_trait]
impl NetworkSource for StaticSource {
    fn describe(&self) -> String {
        format!("{} in-memory way(s)", self.ways.len())
    }

    async fn read_ways(&self) -> Result<Vec<RawWay>, NetworkError> {
        Ok(self.ways.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_format_from_extension() {
        assert_eq!(
            NetworkFormat::infer("data/west-lafayette.geojson"),
            Some(NetworkFormat::Geojson)
        );
        assert_eq!(
            NetworkFormat::infer("https://download.example.org/indiana-latest.osm.pbf?v=2"),
            Some(NetworkFormat::Pbf)
        );
        assert_eq!(NetworkFormat::infer("roads.shp"), None);
    }

    #[tokio::test]
    async fn reads_geojson_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"highway":"path"},"geometry":{"type":"LineString","coordinates":[[-86.9,40.4],[-86.9,40.41]]}}]}"#,
        )
        .unwrap();

        let source = LocationSource::new(DataLocation::Path(path), None).unwrap();
        let ways = source.read_ways().await.unwrap();
        assert_eq!(ways.len(), 1);
        assert_eq!(ways[0].tag("highway"), Some("path"));
    }

    #[test]
    fn unknown_extension_needs_explicit_format() {
        assert!(LocationSource::new(DataLocation::Path("roads.bin".into()), None).is_err());
        assert!(
            LocationSource::new(DataLocation::Path("roads.bin".into()), Some(NetworkFormat::Pbf))
                .is_ok()
        );
    }
}
