#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the saferoute server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine types so the API contract can evolve independently.
//! Variant and algorithm names arrive as plain strings and are checked here,
//! so an unknown name becomes a typed `INVALID_REQUEST` rather than a
//! deserializer message.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use saferoute_route_models::{
    Algorithm, Coordinate, ModeDescription, RouteError, RouteResult, Variant,
};
use serde::{Deserialize, Serialize};

/// `POST /api/route` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRouteRequest {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    /// `fastest`, `safe`, `bike` or `safe_bike`.
    pub route_type: String,
    /// `dijkstra` (default) or `astar`.
    pub algorithm: Option<String>,
}

/// `POST /api/route/compare` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCompareRequest {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    /// Variants to run; all four when absent.
    pub route_types: Option<Vec<String>>,
    pub algorithm: Option<String>,
}

/// A validated route query.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub variants: Vec<Variant>,
    pub algorithm: Algorithm,
}

impl ApiRouteRequest {
    /// Validates coordinates and names.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRequest`] for out-of-range coordinates or
    /// an unknown variant or algorithm.
    pub fn validate(&self) -> Result<RouteQuery, RouteError> {
        validate(
            (self.start_lat, self.start_lon),
            (self.end_lat, self.end_lon),
            Some(std::slice::from_ref(&self.route_type)),
            self.algorithm.as_deref(),
        )
    }
}

impl ApiCompareRequest {
    /// Validates coordinates and names.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRequest`] for out-of-range coordinates,
    /// an unknown variant or algorithm, or an empty variant list.
    pub fn validate(&self) -> Result<RouteQuery, RouteError> {
        validate(
            (self.start_lat, self.start_lon),
            (self.end_lat, self.end_lon),
            self.route_types.as_deref(),
            self.algorithm.as_deref(),
        )
    }
}

fn validate(
    start: (f64, f64),
    end: (f64, f64),
    route_types: Option<&[String]>,
    algorithm: Option<&str>,
) -> Result<RouteQuery, RouteError> {
    let origin = Coordinate::new(start.0, start.1);
    let destination = Coordinate::new(end.0, end.1);
    origin.validate()?;
    destination.validate()?;

    let variants = match route_types {
        None => Variant::all().to_vec(),
        Some([]) => {
            return Err(RouteError::InvalidRequest {
                message: "routeTypes must not be empty".to_string(),
            });
        }
        Some(names) => names
            .iter()
            .map(|name| {
                name.trim().parse::<Variant>().map_err(|_| RouteError::InvalidRequest {
                    message: format!(
                        "unknown route type '{name}' \
                         (expected one of fastest, safe, bike, safe_bike)"
                    ),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let algorithm = match algorithm {
        None => Algorithm::default(),
        Some(name) => name.trim().parse().map_err(|_| RouteError::InvalidRequest {
            message: format!("unknown algorithm '{name}' (expected dijkstra or astar)"),
        })?,
    };

    Ok(RouteQuery {
        origin,
        destination,
        variants,
        algorithm,
    })
}

/// One route as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoute {
    /// `[lat, lon]` pairs, origin first.
    pub route: Vec<[f64; 2]>,
    pub distance_meters: f64,
    pub estimated_time_minutes: f64,
    /// 0 to 100; higher is safer.
    pub safety_score: f64,
    pub bike_coverage_percent: f64,
    pub route_type: Variant,
    pub algorithm_used: Algorithm,
    pub calculation_time_ms: f64,
    pub node_count: usize,
    pub visited_nodes: usize,
    /// Typed failure, when no route was produced.
    pub error: Option<RouteError>,
    /// Human-readable form of `error`.
    pub error_message: Option<String>,
}

impl From<RouteResult> for ApiRoute {
    fn from(result: RouteResult) -> Self {
        Self {
            route: result.points.iter().map(|&(lat, lon)| [lat, lon]).collect(),
            distance_meters: result.distance_m,
            estimated_time_minutes: result.estimated_time_minutes(),
            safety_score: result.safety_score,
            bike_coverage_percent: result.bike_coverage_percent,
            route_type: result.variant,
            algorithm_used: result.algorithm,
            calculation_time_ms: result.compute_time_ms,
            node_count: result.node_count,
            visited_nodes: result.visited_nodes,
            error_message: result.error.as_ref().map(ToString::to_string),
            error: result.error,
        }
    }
}

/// `POST /api/route/compare` response, keyed by variant id.
pub type ApiCompareResponse = BTreeMap<Variant, ApiRoute>;

/// `GET /api/modes` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiModes {
    pub modes: Vec<ModeDescription>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version string.
    pub version: String,
    /// When the serving snapshot was built.
    pub snapshot_built_at: DateTime<Utc>,
    /// Set when calibration stopped short of its target.
    pub warnings: Vec<String>,
}

/// Body of a 4xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: RouteError,
    pub message: String,
}

impl From<RouteError> for ApiError {
    fn from(error: RouteError) -> Self {
        Self {
            message: error.to_string(),
            error,
        }
    }
}
