#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical incident format and ingestion bookkeeping.
//!
//! Every city feed, whatever its raw encoding, produces [`IncidentRecord`]s
//! that conform to the taxonomy in [`saferoute_crime_models`]. Records that
//! cannot be normalized are counted in an [`IngestReport`] by
//! [`DropReason`] instead of failing the load.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use saferoute_crime_models::{CrimeSeverity, CrimeSubcategory};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A geographic bounding box in WGS84 degrees.
///
/// Serialized as `[west, south, east, north]`, matching the order used in
/// city definitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Whether the box has positive, finite extent on both axes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.west < self.east
            && self.south < self.north
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
            && (-180.0..=180.0).contains(&self.west)
            && (-180.0..=180.0).contains(&self.east)
    }

    /// Whether the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Clamps a point onto the box, returning `(lat, lon)`.
    #[must_use]
    pub fn clamp(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            lat.clamp(self.south, self.north),
            lon.clamp(self.west, self.east),
        )
    }

    /// Centre of the box as `(lat, lon)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.south, self.north),
            f64::midpoint(self.west, self.east),
        )
    }

    /// Smallest box covering both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Builds the tightest box around a set of `(lat, lon)` points.
    ///
    /// Returns `None` for an empty iterator.
    #[must_use]
    pub fn around<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (lat, lon)| {
            let point = Self::new(lon, lat, lon, lat);
            Some(acc.map_or(point, |b: Self| b.union(&point)))
        })
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([west, south, east, north]: [f64; 4]) -> Self {
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

/// A crime incident normalized to the canonical schema.
///
/// Unlike raw feed rows, a record always has a valid location inside its
/// city's bounding box and a mapped subcategory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Original incident ID from the feed (used for deduplication).
    pub source_incident_id: String,
    /// City definition id this record was loaded for.
    pub city: String,
    /// Mapped crime subcategory.
    pub subcategory: CrimeSubcategory,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// When the crime occurred. `None` when the feed's date is missing or
    /// unparseable; the location is still usable.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl IncidentRecord {
    /// Severity derived from the subcategory.
    #[must_use]
    pub const fn severity(&self) -> CrimeSeverity {
        self.subcategory.severity()
    }
}

/// Why a raw record was rejected during normalization.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DropReason {
    /// Row could not be decoded at all (bad CSV row, non-object JSON entry).
    Unreadable,
    /// No usable incident id field.
    MissingId,
    /// Coordinates missing, unparseable, or zero.
    InvalidCoordinates,
    /// Crime type missing or not mappable to the taxonomy.
    UnknownCategory,
    /// Coordinates outside the city's bounding box.
    OutOfBounds,
    /// Incident id already seen for this city.
    Duplicate,
}

/// Summary of one city's ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// City definition id.
    pub city: String,
    /// Raw records seen.
    pub total: u64,
    /// Records that became [`IncidentRecord`]s.
    pub accepted: u64,
    /// Rejected records by reason.
    pub dropped: BTreeMap<DropReason, u64>,
    /// Accepted records per subcategory.
    pub categories: BTreeMap<CrimeSubcategory, u64>,
    /// Whether the records came from a cached copy after the live fetch
    /// failed.
    pub from_cache: bool,
}

impl IngestReport {
    /// Creates an empty report for `city`.
    #[must_use]
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            ..Self::default()
        }
    }

    /// Records an accepted incident.
    pub fn accept(&mut self, subcategory: CrimeSubcategory) {
        self.total += 1;
        self.accepted += 1;
        *self.categories.entry(subcategory).or_default() += 1;
    }

    /// Records a rejected raw record.
    pub fn drop_record(&mut self, reason: DropReason) {
        self.total += 1;
        *self.dropped.entry(reason).or_default() += 1;
    }

    /// Total rejected records across all reasons.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    /// The `n` most frequent subcategories, most frequent first.
    #[must_use]
    pub fn top_categories(&self, n: usize) -> Vec<(CrimeSubcategory, u64)> {
        let mut counts: Vec<_> = self.categories.iter().map(|(k, v)| (*k, *v)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }
}
