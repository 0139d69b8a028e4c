#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route variants, search algorithms, calibrated coefficients and the
//! per-query [`RouteResult`].
//!
//! Query-time failures are never raised; they are carried as a typed
//! [`RouteError`] inside the result so a caller comparing several variants
//! gets one answer per variant.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One of the four weightings of the shared road network.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    /// Plain length.
    Fastest,
    /// Length plus a crime-exposure penalty.
    Safe,
    /// Length minus a bicycle-infrastructure bonus.
    Bike,
    /// Both adjustments.
    SafeBike,
}

impl Variant {
    /// All variants, in table order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Fastest, Self::Safe, Self::Bike, Self::SafeBike]
    }

    /// Position in [`Self::all`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether the weighting includes the crime penalty.
    #[must_use]
    pub const fn uses_risk(self) -> bool {
        matches!(self, Self::Safe | Self::SafeBike)
    }

    /// Whether the weighting includes the bicycle bonus.
    #[must_use]
    pub const fn uses_bike(self) -> bool {
        matches!(self, Self::Bike | Self::SafeBike)
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fastest => "Fastest Route",
            Self::Safe => "Safe Route",
            Self::Bike => "Bike Route",
            Self::SafeBike => "Safe + Bike Route",
        }
    }

    /// One-line description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Fastest => "Shortest distance route without penalties",
            Self::Safe => "Avoids high-crime areas using crime data analysis",
            Self::Bike => "Prioritizes bike lanes and cycling infrastructure",
            Self::SafeBike => "Balances safety and bike infrastructure preferences",
        }
    }

    /// Id, name and description.
    #[must_use]
    pub fn describe(self) -> ModeDescription {
        ModeDescription {
            id: self,
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Shortest-path algorithm.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Algorithm {
    /// Uniform-cost search.
    #[default]
    Dijkstra,
    /// Goal-directed search with a scaled great-circle heuristic.
    Astar,
}

/// A routing mode as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDescription {
    /// Variant id, e.g. `safe_bike`.
    pub id: Variant,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Checks that both components are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRequest`] naming the bad component.
    pub fn validate(&self) -> Result<(), RouteError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(RouteError::InvalidRequest {
                message: format!("latitude {} is outside [-90, 90]", self.lat),
            });
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(RouteError::InvalidRequest {
                message: format!("longitude {} is outside [-180, 180]", self.lon),
            });
        }
        Ok(())
    }
}

/// Global scales feeding the `safe`, `bike` and `safe_bike` weightings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibratedCoefficients {
    /// Multiplier on `risk × length`.
    pub crime_penalty_scale: f64,
    /// Rate of the saturating bike bonus.
    pub bike_bonus_scale: f64,
}

impl CalibratedCoefficients {
    /// Creates coefficients, rejecting negative or non-finite scales.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRequest`] naming the bad scale.
    pub fn new(crime_penalty_scale: f64, bike_bonus_scale: f64) -> Result<Self, RouteError> {
        let coefficients = Self {
            crime_penalty_scale,
            bike_bonus_scale,
        };
        if coefficients.is_valid() {
            Ok(coefficients)
        } else {
            Err(RouteError::InvalidRequest {
                message: format!(
                    "coefficients must be finite and non-negative \
                     (crime {crime_penalty_scale}, bike {bike_bonus_scale})"
                ),
            })
        }
    }

    /// Both scales finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.crime_penalty_scale, self.bike_bonus_scale]
            .iter()
            .all(|s| s.is_finite() && *s >= 0.0)
    }
}

impl Default for CalibratedCoefficients {
    fn default() -> Self {
        Self {
            crime_penalty_scale: 1.0,
            bike_bonus_scale: std::f64::consts::LN_2,
        }
    }
}

/// Why a query produced no route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteError {
    /// No usable node lies within the snapping radius of a query point.
    #[error("({lat}, {lon}) is more than {max_distance_m} m from the road network")]
    OutOfServiceArea {
        /// Query latitude.
        lat: f64,
        /// Query longitude.
        lon: f64,
        /// Snapping radius in metres.
        #[serde(rename = "maxDistanceM")]
        max_distance_m: f64,
    },

    /// Origin and destination are disconnected for this variant.
    #[error("No route found after {attempts} snapping attempt(s)")]
    NoRouteFound {
        /// Candidate pairs tried.
        attempts: usize,
    },

    /// The visited-node or wall-clock budget ran out. Safe to retry.
    #[error("Search budget exceeded after visiting {visited_nodes} node(s)")]
    SearchTimeout {
        /// Nodes settled before giving up.
        #[serde(rename = "visitedNodes")]
        visited_nodes: usize,
    },

    /// The caller cancelled the query.
    #[error("Route search cancelled")]
    Cancelled,

    /// The query itself is invalid.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What is wrong.
        message: String,
    },
}

impl RouteError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::OutOfServiceArea { .. } => "OUT_OF_SERVICE_AREA",
            Self::NoRouteFound { .. } => "NO_ROUTE_FOUND",
            Self::SearchTimeout { .. } => "SEARCH_TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
        }
    }
}

/// Warning attached to a calibration that stopped before reaching its
/// differentiation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error(
    "calibration stopped after {iterations} iteration(s) with quality {quality:.3} \
     (target {target:.3})"
)]
pub struct CalibrationIncomplete {
    /// Iterations run.
    pub iterations: u32,
    /// Lowest per-variant differentiation fraction of the kept coefficients.
    pub quality: f64,
    /// Required fraction.
    pub target: f64,
}

/// Outcome of one route query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    /// `(lat, lon)` of every node on the path, origin first.
    pub points: Vec<(f64, f64)>,
    /// Path length in metres.
    pub distance_m: f64,
    /// Sum of base edge travel times in seconds.
    pub estimated_time_s: f64,
    /// `100 × (1 − length-weighted mean edge risk)`.
    pub safety_score: f64,
    /// Share of path length on bicycle infrastructure, in percent.
    pub bike_coverage_percent: f64,
    /// Nodes on the path.
    pub node_count: usize,
    /// Variant searched.
    pub variant: Variant,
    /// Algorithm used.
    pub algorithm: Algorithm,
    /// Nodes settled by the search, over all attempts.
    pub visited_nodes: usize,
    /// Wall-clock time of the query in milliseconds.
    pub compute_time_ms: f64,
    /// Set when no route was produced; all metrics are then zero.
    pub error: Option<RouteError>,
}

impl RouteResult {
    /// A failed result: empty path, zero metrics.
    #[must_use]
    pub const fn failed(
        variant: Variant,
        algorithm: Algorithm,
        error: RouteError,
        visited_nodes: usize,
        compute_time_ms: f64,
    ) -> Self {
        Self {
            points: Vec::new(),
            distance_m: 0.0,
            estimated_time_s: 0.0,
            safety_score: 0.0,
            bike_coverage_percent: 0.0,
            node_count: 0,
            variant,
            algorithm,
            visited_nodes,
            compute_time_ms,
            error: Some(error),
        }
    }

    /// Whether a route was found.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Estimated travel time in minutes.
    #[must_use]
    pub fn estimated_time_minutes(&self) -> f64 {
        self.estimated_time_s / 60.0
    }
}
