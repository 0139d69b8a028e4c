#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weight calibration.
//!
//! The crime penalty and bike bonus scales start from values derived from
//! the data (the 90th percentile of edge risk, the mean bike quality) and
//! are grown until every non-`fastest` variant produces a route different
//! from `fastest` on a target share of trial pairs.

mod calibrator;
mod pairs;

pub use calibrator::{WeightCalibrator, initial_coefficients};
pub use pairs::{generate_pairs, snap_pairs};

use std::collections::BTreeMap;

use saferoute_graph::GraphBuildError;
use saferoute_route_models::{CalibratedCoefficients, CalibrationIncomplete, Coordinate, Variant};
use serde::{Deserialize, Serialize};

/// Errors raised while calibrating.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// A trial graph could not be built.
    #[error(transparent)]
    Graph(#[from] GraphBuildError),

    /// Configuration values are out of range.
    #[error("Invalid calibration configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },
}

/// Calibration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Skip calibration and use these coefficients.
    pub fixed: Option<CalibratedCoefficients>,
    /// Explicit trial routes. When empty, pairs are drawn from the network.
    pub pairs: Vec<(Coordinate, Coordinate)>,
    /// Pairs drawn when none are given.
    pub trial_pairs: usize,
    /// Minimum straight-line separation of drawn pairs.
    pub min_pair_distance_m: f64,
    /// Share of routable pairs on which each variant must differ from
    /// `fastest`.
    pub target_differentiation: f64,
    /// Distance difference that counts as a different route when the node
    /// sequences match.
    pub min_distance_delta_m: f64,
    /// Multiplier applied to the scales of under-differentiated variants.
    pub growth_factor: f64,
    /// Upper bound on either scale.
    pub max_scale: f64,
    /// Iteration budget.
    pub max_iterations: u32,
    /// Node budget for each trial search.
    pub max_visited_nodes: usize,
    /// Seed for drawing pairs.
    pub seed: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            fixed: None,
            pairs: Vec::new(),
            trial_pairs: 48,
            min_pair_distance_m: 800.0,
            target_differentiation: 0.3,
            min_distance_delta_m: 10.0,
            growth_factor: 2.0,
            max_scale: 10_000.0,
            max_iterations: 8,
            max_visited_nodes: 500_000,
            seed: 0x5AFE_2024,
        }
    }
}

impl CalibrationConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let invalid = |message: &str| {
            Err(CalibrationError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if let Some(fixed) = &self.fixed
            && !fixed.is_valid()
        {
            return invalid("fixed coefficients must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&self.target_differentiation) {
            return invalid("target_differentiation must be in [0, 1]");
        }
        if !(self.growth_factor.is_finite() && self.growth_factor > 1.0) {
            return invalid("growth_factor must be greater than 1");
        }
        if !(self.max_scale.is_finite() && self.max_scale > 0.0) {
            return invalid("max_scale must be positive");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        if !(self.min_distance_delta_m >= 0.0 && self.min_pair_distance_m >= 0.0) {
            return invalid("distances must be non-negative");
        }
        Ok(())
    }
}

/// What a calibration run settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    /// Coefficients to publish.
    pub coefficients: CalibratedCoefficients,
    /// Iterations run.
    pub iterations: u32,
    /// Share of routable pairs on which each variant differed from `fastest`,
    /// for the kept coefficients.
    pub differentiation: BTreeMap<Variant, f64>,
    /// Lowest of the `differentiation` values.
    pub quality: f64,
    /// Trial pairs used.
    pub sampled_pairs: usize,
    /// Trial pairs `fastest` could route.
    pub routable_pairs: usize,
    /// Set when the run stopped short of the target.
    pub incomplete: Option<CalibrationIncomplete>,
}

impl CalibrationReport {
    /// A report for coefficients supplied by configuration.
    #[must_use]
    pub fn fixed(coefficients: CalibratedCoefficients) -> Self {
        Self {
            coefficients,
            iterations: 0,
            differentiation: BTreeMap::new(),
            quality: 0.0,
            sampled_pairs: 0,
            routable_pairs: 0,
            incomplete: None,
        }
    }
}
