//! Building and validating the four variant graphs.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use saferoute_network::InfrastructureGraph;
use saferoute_network_models::NodeId;
use saferoute_risk::RiskLookup;
use saferoute_route_models::{CalibratedCoefficients, Variant};
use serde::{Deserialize, Serialize};

use crate::{EdgeFeatures, GraphBuildError, SamplingResolution, VariantWeights};

/// Reachability check run before a build is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Node pairs sampled.
    pub sample_pairs: usize,
    /// Share of sampled pairs that must be mutually reachable.
    pub min_reachable_fraction: f64,
    /// RNG seed for pair sampling.
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_pairs: 200,
            min_reachable_fraction: 0.5,
            seed: 0x5AFE,
        }
    }
}

/// Parameters of the variant graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Where edges are sampled for risk.
    pub sampling: SamplingResolution,
    /// Lower bound on bike-adjusted weights, as a fraction of edge length.
    pub min_weight_fraction: f64,
    /// Pre-publish reachability check.
    pub validation: ValidationConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingResolution::default(),
            min_weight_fraction: 0.05,
            validation: ValidationConfig::default(),
        }
    }
}

/// Outcome of [`GraphBuilder::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Pairs sampled.
    pub sampled_pairs: usize,
    /// Pairs mutually reachable.
    pub reachable_pairs: usize,
    /// `reachable_pairs / sampled_pairs`; 1 when nothing was sampled.
    pub reachable_fraction: f64,
}

/// The shared network with one weight table per variant.
#[derive(Debug, Clone)]
pub struct RoutingGraphs {
    network: Arc<InfrastructureGraph>,
    features: Arc<EdgeFeatures>,
    coefficients: CalibratedCoefficients,
    variants: Vec<VariantWeights>,
}

impl RoutingGraphs {
    /// The shared topology.
    #[must_use]
    pub fn network(&self) -> &InfrastructureGraph {
        &self.network
    }

    /// Shared handle to the topology.
    #[must_use]
    pub fn network_arc(&self) -> Arc<InfrastructureGraph> {
        Arc::clone(&self.network)
    }

    /// Sampled edge features.
    #[must_use]
    pub fn features(&self) -> &EdgeFeatures {
        &self.features
    }

    /// Shared handle to the features.
    #[must_use]
    pub fn features_arc(&self) -> Arc<EdgeFeatures> {
        Arc::clone(&self.features)
    }

    /// Coefficients the tables were built with.
    #[must_use]
    pub const fn coefficients(&self) -> &CalibratedCoefficients {
        &self.coefficients
    }

    /// Weight table for `variant`.
    #[must_use]
    pub fn weights(&self, variant: Variant) -> &VariantWeights {
        &self.variants[variant.index()]
    }
}

/// Builds [`RoutingGraphs`] from a network, a risk lookup and coefficients.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    /// Creates a builder.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::InvalidConfig`] if the sampling resolution
    /// or minimum weight fraction is unusable.
    pub fn new(config: GraphConfig) -> Result<Self, GraphBuildError> {
        config.sampling.validate()?;
        if !(config.min_weight_fraction > 0.0 && config.min_weight_fraction < 1.0) {
            return Err(GraphBuildError::InvalidConfig {
                message: format!(
                    "min_weight_fraction must be in (0, 1), got {}",
                    config.min_weight_fraction
                ),
            });
        }
        if !(0.0..=1.0).contains(&config.validation.min_reachable_fraction) {
            return Err(GraphBuildError::InvalidConfig {
                message: "validation.min_reachable_fraction must be in [0, 1]".to_string(),
            });
        }
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Samples edge risk and quality factors.
    #[must_use]
    pub fn features(&self, network: &InfrastructureGraph, risk: &dyn RiskLookup) -> EdgeFeatures {
        EdgeFeatures::compute(network, risk, self.config.sampling)
    }

    /// Computes all four weight tables without validating them. Used for
    /// calibration trials.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::InvalidCoefficients`] for negative or
    /// non-finite coefficients, or [`GraphBuildError::InvalidConfig`] if the
    /// features do not cover the network.
    pub fn weigh(
        &self,
        network: Arc<InfrastructureGraph>,
        features: Arc<EdgeFeatures>,
        coefficients: CalibratedCoefficients,
    ) -> Result<RoutingGraphs, GraphBuildError> {
        if !coefficients.is_valid() {
            return Err(GraphBuildError::InvalidCoefficients { coefficients });
        }
        if features.len() != network.edge_count() {
            return Err(GraphBuildError::InvalidConfig {
                message: format!(
                    "features cover {} edge(s), network has {}",
                    features.len(),
                    network.edge_count()
                ),
            });
        }

        let variants = Variant::all()
            .iter()
            .map(|&variant| {
                VariantWeights::compute(
                    variant,
                    &network,
                    &features,
                    &coefficients,
                    self.config.min_weight_fraction,
                )
            })
            .collect();

        Ok(RoutingGraphs {
            network,
            features,
            coefficients,
            variants,
        })
    }

    /// Computes and validates all four weight tables.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::Validation`] if any table fails the
    /// structural checks, or the errors of [`Self::weigh`].
    pub fn build(
        &self,
        network: Arc<InfrastructureGraph>,
        features: Arc<EdgeFeatures>,
        coefficients: CalibratedCoefficients,
    ) -> Result<(RoutingGraphs, ValidationReport), GraphBuildError> {
        let graphs = self.weigh(network, features, coefficients)?;
        let report = self.validate(&graphs)?;
        log::info!(
            "Built variant graphs (crime scale {:.3}, bike scale {:.3}); {}/{} sampled pairs reachable",
            coefficients.crime_penalty_scale,
            coefficients.bike_bonus_scale,
            report.reachable_pairs,
            report.sampled_pairs
        );
        Ok((graphs, report))
    }

    /// Structural checks on built tables:
    ///
    /// * every variant has exactly one weight per network edge;
    /// * every weight is finite and positive;
    /// * the configured share of sampled node pairs is mutually reachable.
    ///
    /// Once every weight is finite and positive each variant can traverse
    /// every edge, so reachability is computed once on the shared topology.
    ///
    /// # Errors
    ///
    /// Returns [`GraphBuildError::Validation`] describing the first failure.
    pub fn validate(&self, graphs: &RoutingGraphs) -> Result<ValidationReport, GraphBuildError> {
        let edge_count = graphs.network().edge_count();
        for &variant in Variant::all() {
            let table = graphs.weights(variant);
            if table.variant() != variant || table.weights().len() != edge_count {
                return Err(GraphBuildError::Validation {
                    variant,
                    message: format!(
                        "weight table has {} entries for {edge_count} edge(s)",
                        table.weights().len()
                    ),
                });
            }
            if let Some((edge, weight)) = table
                .weights()
                .iter()
                .enumerate()
                .find(|(_, w)| !(w.is_finite() && **w > 0.0))
            {
                return Err(GraphBuildError::Validation {
                    variant,
                    message: format!("edge {edge} has weight {weight}"),
                });
            }
        }

        let report = reachability(graphs.network(), &self.config.validation);
        if report.reachable_fraction < self.config.validation.min_reachable_fraction {
            return Err(GraphBuildError::Validation {
                variant: Variant::Fastest,
                message: format!(
                    "only {}/{} sampled node pairs are mutually reachable (need {:.0}%)",
                    report.reachable_pairs,
                    report.sampled_pairs,
                    self.config.validation.min_reachable_fraction * 100.0
                ),
            });
        }
        Ok(report)
    }
}

fn reachability(network: &InfrastructureGraph, config: &ValidationConfig) -> ValidationReport {
    let candidates: Vec<NodeId> = (0..network.node_count())
        .filter(|&n| network.degree(n) > 0)
        .collect();
    if candidates.len() < 2 || config.sample_pairs == 0 {
        return ValidationReport {
            sampled_pairs: 0,
            reachable_pairs: 0,
            reachable_fraction: 1.0,
        };
    }

    let components = network.strongly_connected_components();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let reachable_pairs = (0..config.sample_pairs)
        .filter(|_| {
            let a = candidates[rng.gen_range(0..candidates.len())];
            let b = candidates[rng.gen_range(0..candidates.len())];
            components[a] == components[b]
        })
        .count();

    #[allow(clippy::cast_precision_loss)]
    let reachable_fraction = reachable_pairs as f64 / config.sample_pairs as f64;
    ValidationReport {
        sampled_pairs: config.sample_pairs,
        reachable_pairs,
        reachable_fraction,
    }
}

#[cfg(test)]
mod tests {
    use saferoute_network::{TagClassifier, build_network};
    use saferoute_network_models::RawWay;

    use super::*;

    /// Risk 1 inside a box around the grid centre, 0 elsewhere.
    struct CentreHotspot;

    impl RiskLookup for CentreHotspot {
        fn risk(&self, lat: f64, lon: f64) -> f64 {
            if (lat - 40.002).abs() < 0.0006 && (lon + 86.002).abs() < 0.0006 {
                1.0
            } else {
                0.0
            }
        }
    }

    /// A 5×5 two-way street grid at 0.001° spacing with one cycleway row.
    fn grid() -> Arc<InfrastructureGraph> {
        let mut ways = Vec::new();
        let tags = |highway: &str| {
            [("highway".to_string(), highway.to_string())]
                .into_iter()
                .collect()
        };
        for i in 0..5 {
            let lat = 0.001_f64.mul_add(f64::from(i), 40.0);
            let highway = if i == 4 { "cycleway" } else { "residential" };
            ways.push(RawWay {
                id: i64::from(i),
                tags: tags(highway),
                coords: (0..5)
                    .map(|j| (lat, 0.001_f64.mul_add(f64::from(j), -86.004)))
                    .collect(),
            });
            let lon = 0.001_f64.mul_add(f64::from(i), -86.004);
            ways.push(RawWay {
                id: 100 + i64::from(i),
                tags: tags("residential"),
                coords: (0..5)
                    .map(|j| (0.001_f64.mul_add(f64::from(j), 40.0), lon))
                    .collect(),
            });
        }
        Arc::new(build_network(ways, &TagClassifier).0)
    }

    fn built(coefficients: CalibratedCoefficients) -> (RoutingGraphs, ValidationReport) {
        let builder = GraphBuilder::default();
        let network = grid();
        let features = Arc::new(builder.features(&network, &CentreHotspot));
        builder.build(network, features, coefficients).unwrap()
    }

    #[test]
    fn all_variants_share_topology() {
        let (graphs, report) = built(CalibratedCoefficients::default());
        let edges = graphs.network().edge_count();
        assert_eq!(edges, 80);
        for &variant in Variant::all() {
            assert_eq!(graphs.weights(variant).weights().len(), edges);
        }
        assert!((report.reachable_fraction - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weights_are_ordered_and_positive() {
        let (graphs, _) = built(CalibratedCoefficients::new(3.0, 2.0).unwrap());
        let fastest = graphs.weights(Variant::Fastest).weights();
        let safe = graphs.weights(Variant::Safe).weights();
        let bike = graphs.weights(Variant::Bike).weights();
        let safe_bike = graphs.weights(Variant::SafeBike).weights();
        for e in 0..fastest.len() {
            assert!(bike[e] <= fastest[e] && fastest[e] <= safe[e]);
            assert!(safe_bike[e] <= safe[e]);
            assert!(bike[e] > 0.0 && safe_bike[e] > 0.0);
        }
        assert!(safe.iter().zip(fastest).any(|(s, f)| s > f));
        assert!(bike.iter().zip(fastest).any(|(b, f)| b < f));
    }

    #[test]
    fn heuristic_scales_are_admissible() {
        let (graphs, _) = built(CalibratedCoefficients::new(3.0, 2.0).unwrap());
        let network = graphs.network();
        for &variant in Variant::all() {
            let table = graphs.weights(variant);
            let scale = table.heuristic_scale();
            assert!(scale > 0.0 && scale <= 1.0);
            for edge in network.edges() {
                let straight = network.node_distance_m(edge.from, edge.to);
                assert!(scale * straight <= table.weight(edge.id) + 1e-9);
            }
        }
        assert!(graphs.weights(Variant::Bike).heuristic_scale() < 1.0);
        assert!((graphs.weights(Variant::Safe).heuristic_scale() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_coefficients() {
        let builder = GraphBuilder::default();
        let network = grid();
        let features = Arc::new(builder.features(&network, &CentreHotspot));
        let bad = CalibratedCoefficients {
            crime_penalty_scale: -1.0,
            bike_bonus_scale: 1.0,
        };
        assert!(matches!(
            builder.weigh(network, features, bad),
            Err(GraphBuildError::InvalidCoefficients { .. })
        ));
    }

    #[test]
    fn disconnected_networks_fail_validation() {
        // Keep only eastbound and northbound edges: nothing is mutually
        // reachable.
        let network = grid();
        let one_way = Arc::new(network.retain_edges(|e| {
            let (a, b) = (network.node(e.from), network.node(e.to));
            b.lat > a.lat || b.lon > a.lon
        }));
        let builder = GraphBuilder::new(GraphConfig {
            validation: ValidationConfig {
                min_reachable_fraction: 0.9,
                ..ValidationConfig::default()
            },
            ..GraphConfig::default()
        })
        .unwrap();
        let features = Arc::new(builder.features(&one_way, &CentreHotspot));
        assert!(matches!(
            builder.build(one_way, features, CalibratedCoefficients::default()),
            Err(GraphBuildError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_bad_config() {
        assert!(
            GraphBuilder::new(GraphConfig {
                min_weight_fraction: 0.0,
                ..GraphConfig::default()
            })
            .is_err()
        );
        assert!(
            GraphBuilder::new(GraphConfig {
                sampling: SamplingResolution::Uniform { samples: 0 },
                ..GraphConfig::default()
            })
            .is_err()
        );
    }
}
