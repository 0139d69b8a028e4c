//! Config-driven city feed definitions.
//!
//! A [`CityDefinition`] captures everything that differs between city
//! feeds: the service-area bounding box, the raw encoding, and which fields
//! hold the id, crime type, date, and coordinates.

use std::fmt;

use saferoute_source_models::BoundingBox;
use serde::Deserialize;

use crate::SourceError;

/// A complete city feed definition, loaded from embedded TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct CityDefinition {
    /// Unique identifier (e.g., `"indianapolis"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Service area as `[west, south, east, north]`. Records outside it are
    /// dropped.
    pub bbox: BoundingBox,
    /// Raw encoding of the feed.
    pub format: RawFormat,
    /// Field name mappings for normalization.
    pub fields: FieldMapping,
}

impl CityDefinition {
    /// File name used when caching this city's raw payload.
    #[must_use]
    pub fn cache_file_name(&self) -> String {
        let extension = match self.format {
            RawFormat::CityProtect => "json",
            RawFormat::Csv { .. } => "csv",
        };
        format!("{}.{extension}", self.id)
    }
}

/// Raw encodings a city may publish.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawFormat {
    /// `CityProtect` export: records nested in `result.list.incidents`,
    /// `GeoJSON` `[lng, lat]` point under `location.coordinates`.
    CityProtect,
    /// Flat CSV with a header row.
    Csv {
        /// Field delimiter (default: comma).
        #[serde(default)]
        delimiter: Option<String>,
    },
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CityProtect => f.write_str("city_protect"),
            Self::Csv { .. } => f.write_str("csv"),
        }
    }
}

/// Field names used to extract an [`IncidentRecord`] from a raw row.
///
/// [`IncidentRecord`]: saferoute_source_models::IncidentRecord
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Incident id fields, tried in order.
    pub incident_id: Vec<String>,
    /// Crime type fields, tried in order. The first one that maps to the
    /// taxonomy wins.
    pub crime_type: Vec<String>,
    /// How to extract the occurrence timestamp, if the feed has one.
    #[serde(default)]
    pub occurred_at: Option<DateExtractor>,
    /// Latitude field (number or numeric string).
    pub lat: String,
    /// Longitude field (number or numeric string).
    pub lng: String,
}

/// How to extract the occurrence timestamp from a raw row.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DateExtractor {
    /// Single datetime field in any supported text format.
    Simple {
        /// Field name.
        field: String,
    },
    /// Separate date and time-of-day fields.
    DatePlusTime {
        /// Field holding the date.
        date_field: String,
        /// Field holding the time (`HH:MM[:SS]` or `HHMM`).
        time_field: String,
    },
    /// Epoch milliseconds.
    EpochMs {
        /// Field name.
        field: String,
    },
}

/// Parses a city definition from TOML.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or the bounding box is not a
/// valid WGS84 box.
pub fn parse_city_toml(toml_str: &str) -> Result<CityDefinition, SourceError> {
    let definition: CityDefinition = toml::from_str(toml_str)?;
    if !definition.bbox.is_valid() {
        return Err(SourceError::Normalization {
            message: format!("{}: invalid bounding box {:?}", definition.id, definition.bbox),
        });
    }
    if definition.fields.incident_id.is_empty() || definition.fields.crime_type.is_empty() {
        return Err(SourceError::Normalization {
            message: format!(
                "{}: incident_id and crime_type need at least one field",
                definition.id
            ),
        });
    }
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        id = "testville"
        name = "Testville"
        state = "IN"
        bbox = [-86.5, 40.0, -86.0, 40.5]

        [format]
        type = "csv"
        delimiter = ";"

        [fields]
        incident_id = ["ID"]
        crime_type = ["OFFENSE"]
        lat = "LAT"
        lng = "LON"
        occurred_at = { type = "date_plus_time", date_field = "DATE", time_field = "TIME" }
    "#;

    #[test]
    fn parses_csv_definition() {
        let def = parse_city_toml(MINIMAL).unwrap();
        assert_eq!(def.id, "testville");
        assert_eq!(
            def.format,
            RawFormat::Csv {
                delimiter: Some(";".to_string())
            }
        );
        assert!(matches!(
            def.fields.occurred_at,
            Some(DateExtractor::DatePlusTime { .. })
        ));
        assert_eq!(def.cache_file_name(), "testville.csv");
    }

    #[test]
    fn rejects_inverted_bbox() {
        let bad = MINIMAL.replace("[-86.5, 40.0, -86.0, 40.5]", "[-86.0, 40.0, -86.5, 40.5]");
        assert!(parse_city_toml(&bad).is_err());
    }
}
