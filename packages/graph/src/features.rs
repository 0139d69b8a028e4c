//! Per-edge inputs to the weight formulas: sampled crime risk and bicycle
//! quality factor.

use rayon::prelude::*;
use saferoute_network::InfrastructureGraph;
use saferoute_network_models::{EdgeId, RoadEdge};
use saferoute_risk::RiskLookup;
use serde::{Deserialize, Serialize};

use crate::GraphBuildError;

/// Where along an edge the risk surface is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingResolution {
    /// The edge midpoint only.
    Midpoint,
    /// A fixed number of evenly spaced samples per edge.
    Uniform {
        /// Samples per edge.
        samples: usize,
    },
    /// Roughly one sample every `meters`, between one and `max_samples`.
    Spacing {
        /// Target spacing in metres.
        meters: f64,
        /// Upper bound per edge.
        max_samples: usize,
    },
}

impl Default for SamplingResolution {
    fn default() -> Self {
        Self::Spacing {
            meters: 25.0,
            max_samples: 16,
        }
    }
}

impl SamplingResolution {
    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::InvalidConfig`] for zero sample counts or a
    /// non-positive spacing.
    pub fn validate(&self) -> Result<(), GraphBuildError> {
        let ok = match *self {
            Self::Midpoint => true,
            Self::Uniform { samples } => samples > 0,
            Self::Spacing {
                meters,
                max_samples,
            } => meters.is_finite() && meters > 0.0 && max_samples > 0,
        };
        if ok {
            Ok(())
        } else {
            Err(GraphBuildError::InvalidConfig {
                message: format!("invalid sampling resolution {self:?}"),
            })
        }
    }

    /// Number of samples for an edge of `length_m`.
    #[must_use]
    pub fn sample_count(&self, length_m: f64) -> usize {
        match *self {
            Self::Midpoint => 1,
            Self::Uniform { samples } => samples.max(1),
            Self::Spacing {
                meters,
                max_samples,
            } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let wanted = (length_m / meters).ceil().max(1.0) as usize;
                wanted.clamp(1, max_samples.max(1))
            }
        }
    }
}

/// Sampled risk and quality factor for every edge, indexed by edge id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeFeatures {
    risk: Vec<f64>,
    quality: Vec<f64>,
}

impl EdgeFeatures {
    /// Samples `risk` along every edge in parallel.
    #[must_use]
    pub fn compute(
        network: &InfrastructureGraph,
        risk: &dyn RiskLookup,
        resolution: SamplingResolution,
    ) -> Self {
        let risk = network
            .edges()
            .par_iter()
            .map(|edge| mean_edge_risk(network, edge, risk, resolution))
            .collect::<Vec<_>>();
        let quality = network
            .edges()
            .iter()
            .map(|edge| {
                if edge.is_bike_infrastructure() {
                    edge.quality.factor()
                } else {
                    0.0
                }
            })
            .collect();

        let risky = risk.iter().filter(|r| **r > 0.0).count();
        log::info!(
            "Sampled risk on {} edge(s) ({risky} with non-zero risk)",
            network.edge_count()
        );
        Self { risk, quality }
    }

    /// Builds features from precomputed values.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::InvalidConfig`] if the lengths differ or a
    /// value is outside `[0, 1]`.
    pub fn from_values(risk: Vec<f64>, quality: Vec<f64>) -> Result<Self, GraphBuildError> {
        let in_range = |v: &f64| (0.0..=1.0).contains(v);
        if risk.len() != quality.len()
            || !risk.iter().all(in_range)
            || !quality.iter().all(in_range)
        {
            return Err(GraphBuildError::InvalidConfig {
                message: "edge features must have equal lengths and values in [0, 1]".to_string(),
            });
        }
        Ok(Self { risk, quality })
    }

    /// Mean sampled risk of an edge.
    #[must_use]
    pub fn risk(&self, edge: EdgeId) -> f64 {
        self.risk[edge]
    }

    /// Quality factor of an edge (0 without infrastructure).
    #[must_use]
    pub fn quality_factor(&self, edge: EdgeId) -> f64 {
        self.quality[edge]
    }

    /// Risk of every edge.
    #[must_use]
    pub fn risks(&self) -> &[f64] {
        &self.risk
    }

    /// Quality factor of every edge.
    #[must_use]
    pub fn quality_factors(&self) -> &[f64] {
        &self.quality
    }

    /// Number of edges covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.risk.len()
    }

    /// Whether no edges are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.risk.is_empty()
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_edge_risk(
    network: &InfrastructureGraph,
    edge: &RoadEdge,
    risk: &dyn RiskLookup,
    resolution: SamplingResolution,
) -> f64 {
    let from = network.node(edge.from);
    let to = network.node(edge.to);
    let samples = resolution.sample_count(edge.length_m);

    let total: f64 = (0..samples)
        .map(|i| {
            let t = (i as f64 + 0.5) / samples as f64;
            let lat = t.mul_add(to.lat - from.lat, from.lat);
            let lon = t.mul_add(to.lon - from.lon, from.lon);
            risk.risk(lat, lon).clamp(0.0, 1.0)
        })
        .sum();

    total / samples as f64
}
