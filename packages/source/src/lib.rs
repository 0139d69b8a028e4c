#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime incident feeds and normalization.
//!
//! Each city is described by a [`city_def::CityDefinition`] embedded in the
//! [`registry`]. Raw payloads are fetched from a path or URL with bounded
//! retry ([`fetch`], [`retry`]), decoded according to the city's raw format
//! ([`city_protect`], [`csv_rows`]) and normalized into
//! [`IncidentRecord`]s ([`normalize`]).

pub mod city_def;
pub mod city_protect;
pub mod csv_rows;
pub mod fetch;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod type_mapping;

use std::collections::HashSet;
use std::path::PathBuf;

use saferoute_source_models::{DropReason, IncidentRecord, IngestReport};

use crate::city_def::{CityDefinition, RawFormat};
use crate::fetch::{DataLocation, fetch_bytes};
use crate::retry::RetryPolicy;

/// Errors that can occur while loading crime or network source data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV decoding failed before any row could be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// City definition TOML is invalid.
    #[error("Invalid city definition: {0}")]
    Toml(#[from] toml::de::Error),

    /// Payload does not have the shape the city's format expects.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },

    /// Source could not be read after all retries and no cached copy exists.
    #[error("Data unavailable from {location}: {reason}")]
    DataUnavailable {
        /// Path or URL that was attempted.
        location: String,
        /// Last error seen.
        reason: String,
    },

    /// No city definition with the requested id.
    #[error("Unknown city: {id}")]
    UnknownCity {
        /// The requested id.
        id: String,
    },
}

impl SourceError {
    /// Whether retrying the same operation might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// How city feeds are fetched.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Retry policy for the raw fetch.
    pub retry: RetryPolicy,
    /// Directory where raw payloads fetched over HTTP are cached, and read
    /// back when the live fetch fails.
    pub cache_dir: Option<PathBuf>,
}

/// Normalized incidents for one city plus its ingestion summary.
#[derive(Debug, Clone)]
pub struct CityIncidents {
    /// City definition id.
    pub city: String,
    /// Accepted records.
    pub records: Vec<IncidentRecord>,
    /// Counts of accepted and dropped records.
    pub report: IngestReport,
}

impl CityIncidents {
    /// Appends another feed for the same city. Incident ids already present
    /// are dropped as duplicates, so the earlier feed wins.
    pub fn absorb(&mut self, other: Self) {
        let mut seen: HashSet<String> = self
            .records
            .iter()
            .map(|r| r.source_incident_id.clone())
            .collect();

        let report = &mut self.report;
        report.total += other.report.total - other.report.accepted;
        for (reason, count) in other.report.dropped {
            *report.dropped.entry(reason).or_default() += count;
        }
        report.from_cache |= other.report.from_cache;

        for record in other.records {
            if seen.insert(record.source_incident_id.clone()) {
                report.accept(record.subcategory);
                self.records.push(record);
            } else {
                report.drop_record(DropReason::Duplicate);
            }
        }
    }
}

/// Fetches and normalizes one city's feed.
///
/// # Errors
///
/// Returns [`SourceError::DataUnavailable`] if the feed cannot be read and
/// no cached copy exists, or a decoding error if the payload as a whole does
/// not match the city's raw format. Individual bad records never fail the
/// load.
pub async fn load_city(
    definition: &CityDefinition,
    location: &DataLocation,
    options: &LoadOptions,
) -> Result<CityIncidents, SourceError> {
    log::info!(
        "{}: loading incidents from {location} ({})",
        definition.name,
        definition.format
    );

    let cache_path = options
        .cache_dir
        .as_ref()
        .map(|dir| dir.join(definition.cache_file_name()));
    let fetched = fetch_bytes(location, &options.retry, cache_path.as_deref()).await?;

    let mut incidents = decode_city(definition, &fetched.bytes)?;
    incidents.report.from_cache = fetched.from_cache;
    Ok(incidents)
}

/// Decodes and normalizes a raw payload that has already been read.
///
/// # Errors
///
/// Returns an error if the payload as a whole cannot be decoded.
pub fn decode_city(
    definition: &CityDefinition,
    bytes: &[u8],
) -> Result<CityIncidents, SourceError> {
    let rows = match &definition.format {
        RawFormat::CityProtect => city_protect::parse_incidents(bytes)?,
        RawFormat::Csv { delimiter } => csv_rows::parse_rows(bytes, delimiter.as_deref())?,
    };

    let (records, report) = normalize::normalize_rows(definition, rows);

    log::info!(
        "{}: {} accepted, {} dropped of {} raw records",
        definition.name,
        report.accepted,
        report.dropped_total(),
        report.total
    );
    for (reason, count) in &report.dropped {
        log::debug!("{}:   dropped {count} ({reason})", definition.name);
    }

    Ok(CityIncidents {
        city: definition.id.clone(),
        records,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::city_by_id;

    #[test]
    fn http_status_transience() {
        let err = |status| SourceError::HttpStatus {
            status,
            url: "https://example.invalid".to_string(),
        };
        assert!(err(503).is_transient());
        assert!(err(429).is_transient());
        assert!(!err(404).is_transient());
    }

    #[test]
    fn missing_file_is_permanent() {
        let err = SourceError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_transient());
    }

    #[test]
    fn decodes_city_protect_payload_for_west_lafayette() {
        let definition = city_by_id("west_lafayette").unwrap();
        let payload = br#"{"result":{"list":{"incidents":[
            {"id":"a1","ccn":"23-1","date":"2023-04-02T18:20:00.000Z",
             "parentIncidentType":"Theft","incidentType":"Theft From Vehicle",
             "location":{"type":"Point","coordinates":[-86.9131,40.4259]}},
            {"id":"a2","parentIncidentType":"Zzyzx","incidentType":"",
             "location":{"type":"Point","coordinates":[-86.91,40.42]}}
        ]}}}"#;

        let incidents = decode_city(&definition, payload).unwrap();
        assert_eq!(incidents.records.len(), 1);
        assert_eq!(incidents.report.total, 2);
        assert_eq!(incidents.records[0].city, "west_lafayette");
    }

    #[test]
    fn absorbing_a_second_feed_keeps_the_first_copy_of_each_id() {
        let definition = city_by_id("west_lafayette").unwrap();
        let first = br#"{"result":{"list":{"incidents":[
            {"id":"a1","parentIncidentType":"Theft",
             "location":{"type":"Point","coordinates":[-86.9131,40.4259]}}
        ]}}}"#;
        let second = br#"{"result":{"list":{"incidents":[
            {"id":"a1","parentIncidentType":"Assault",
             "location":{"type":"Point","coordinates":[-86.90,40.43]}},
            {"id":"b1","parentIncidentType":"Burglary",
             "location":{"type":"Point","coordinates":[-86.90,40.43]}},
            {"id":"b2","parentIncidentType":"Zzyzx",
             "location":{"type":"Point","coordinates":[-86.90,40.43]}}
        ]}}}"#;

        let mut incidents = decode_city(&definition, first).unwrap();
        incidents.absorb(decode_city(&definition, second).unwrap());

        let ids: Vec<_> = incidents
            .records
            .iter()
            .map(|r| r.source_incident_id.as_str())
            .collect();
        assert_eq!(ids, ["a1", "b1"]);
        assert_eq!(
            incidents.records[0].subcategory,
            saferoute_crime_models::CrimeSubcategory::LarcenyTheft
        );

        let report = &incidents.report;
        assert_eq!(report.total, 4);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.dropped[&DropReason::Duplicate], 1);
        assert_eq!(report.dropped[&DropReason::UnknownCategory], 1);
        assert_eq!(report.total, report.accepted + report.dropped_total());
    }

    #[tokio::test]
    async fn load_city_reads_local_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indy.csv");
        std::fs::write(
            &path,
            "CASE,CRIME,DATE_,LATITUDE,LONGITUDE\n\
             IP1,ROBBERY,2023-01-05 10:00:00,39.7684,-86.1581\n\
             IP2,BURGLARY,2023-01-06 11:00:00,39.77,-86.16\n",
        )
        .unwrap();

        let definition = city_by_id("indianapolis").unwrap();
        let options = LoadOptions {
            retry: RetryPolicy::immediate(1),
            cache_dir: None,
        };
        let incidents = load_city(&definition, &DataLocation::Path(path), &options)
            .await
            .unwrap();
        assert_eq!(incidents.records.len(), 2);
        assert!(!incidents.report.from_cache);
    }
}
