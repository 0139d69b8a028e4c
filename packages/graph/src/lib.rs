#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Variant routing graphs.
//!
//! All four variants share one [`saferoute_network::InfrastructureGraph`];
//! only their per-edge weights differ. Risk is sampled along each edge once
//! ([`EdgeFeatures`]) and reused for every set of coefficients, which keeps
//! calibration trials cheap.

mod builder;
mod features;
mod weights;

pub use builder::{GraphBuilder, GraphConfig, RoutingGraphs, ValidationConfig, ValidationReport};
pub use features::{EdgeFeatures, SamplingResolution};
pub use weights::{VariantWeights, edge_weight};

use saferoute_route_models::{CalibratedCoefficients, Variant};

/// Errors raised while building variant graphs.
#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    /// Builder configuration is out of range.
    #[error("Invalid graph configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// Coefficients are negative or non-finite.
    #[error("Invalid coefficients: {coefficients:?}")]
    InvalidCoefficients {
        /// The rejected coefficients.
        coefficients: CalibratedCoefficients,
    },

    /// A built graph failed its structural checks.
    #[error("{variant} graph failed validation: {message}")]
    Validation {
        /// Variant whose table failed.
        variant: Variant,
        /// What failed.
        message: String,
    },
}
