#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime risk surfaces.
//!
//! A [`CrimeSurface`] turns one city's incidents into a continuous risk
//! function over its bounding box: incidents are weighted by severity,
//! binned into a metric grid, smoothed with a Gaussian kernel and normalized
//! by the densest cell, so every city's values land in `[0, 1]`. A
//! [`RiskField`] combines the per-city surfaces behind the [`RiskLookup`]
//! trait used by the graph builder.

mod field;
mod kernel;
mod surface;

pub use field::{RiskField, SurfaceInput};
pub use surface::{CrimeSurface, SurfaceStats};

use saferoute_crime_models::SeverityWeights;
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Largest grid a single city may allocate.
pub const MAX_CELLS: usize = 16_000_000;

/// Errors raised while building risk surfaces.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// Configuration values are out of range.
    #[error("Invalid risk configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// A city's bounding box has no usable extent.
    #[error("Invalid bounding box for {city}")]
    InvalidBoundingBox {
        /// City id.
        city: String,
    },

    /// The configured cell size would need too many cells.
    #[error("{city}: grid of {cells} cells exceeds the limit of {MAX_CELLS}")]
    GridTooLarge {
        /// City id.
        city: String,
        /// Cells that would be needed.
        cells: usize,
    },
}

/// A deterministic map from coordinates to risk in `[0, 1]`.
pub trait RiskLookup: Send + Sync {
    /// Risk at `(lat, lon)`. Never fails; points outside the covered area
    /// take the value at the nearest boundary.
    fn risk(&self, lat: f64, lon: f64) -> f64;
}

/// Parameters for building risk surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Grid cell edge length in metres.
    pub cell_size_m: f64,
    /// Gaussian kernel standard deviation in metres. Zero disables smoothing.
    pub bandwidth_m: f64,
    /// Per-severity incident weights.
    pub severity_weights: SeverityWeights,
    /// When set, incidents lose half their weight for every this many days
    /// they are older than the newest incident in the same city.
    pub recency_half_life_days: Option<f64>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            cell_size_m: 75.0,
            bandwidth_m: 150.0,
            severity_weights: SeverityWeights::default(),
            recency_half_life_days: None,
        }
    }
}

impl SurfaceConfig {
    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), RiskError> {
        let invalid = |message: &str| {
            Err(RiskError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if !(self.cell_size_m.is_finite() && self.cell_size_m > 0.0) {
            return invalid("cell_size_m must be positive");
        }
        if !(self.bandwidth_m.is_finite() && self.bandwidth_m >= 0.0) {
            return invalid("bandwidth_m must be non-negative");
        }
        if !self.severity_weights.is_valid() {
            return invalid("severity weights must be non-negative and non-decreasing");
        }
        if let Some(half_life) = self.recency_half_life_days
            && !(half_life.is_finite() && half_life > 0.0)
        {
            return invalid("recency_half_life_days must be positive");
        }
        Ok(())
    }
}
