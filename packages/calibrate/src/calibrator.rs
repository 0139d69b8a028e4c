use std::collections::BTreeMap;
use std::f64::consts::LN_2;
use std::sync::Arc;

use rayon::prelude::*;
use saferoute_graph::{EdgeFeatures, GraphBuilder, RoutingGraphs};
use saferoute_network::InfrastructureGraph;
use saferoute_network_models::NodeId;
use saferoute_route_models::{Algorithm, CalibratedCoefficients, CalibrationIncomplete, Variant};
use saferoute_search::{PathFound, PathOutcome, SearchLimits, shortest_path};
use tokio_util::sync::CancellationToken;

use crate::{CalibrationConfig, CalibrationError, CalibrationReport, generate_pairs};

const ADJUSTED: [Variant; 3] = [Variant::Safe, Variant::Bike, Variant::SafeBike];

/// Starting scales derived from the features alone.
///
/// The crime scale is `1 / p90` of the non-zero edge risks, so a typical
/// risky edge costs about twice its length under `safe`. The bike scale is
/// `ln 2 / mean quality factor` of infrastructure edges, so a typical bike
/// edge gets half the maximum bonus. Both fall back to the values for a
/// factor of one when there is nothing to measure.
#[must_use]
pub fn initial_coefficients(features: &EdgeFeatures) -> CalibratedCoefficients {
    let mut risks: Vec<f64> = features.risks().iter().copied().filter(|r| *r > 0.0).collect();
    risks.sort_by(f64::total_cmp);
    let crime_penalty_scale = percentile(&risks, 0.9).map_or(1.0, |p90| 1.0 / p90);

    let bike: Vec<f64> = features
        .quality_factors()
        .iter()
        .copied()
        .filter(|q| *q > 0.0)
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let bike_bonus_scale = if bike.is_empty() {
        LN_2
    } else {
        LN_2 / (bike.iter().sum::<f64>() / bike.len() as f64)
    };

    CalibratedCoefficients {
        crime_penalty_scale,
        bike_bonus_scale,
    }
}

/// Nearest-rank percentile of sorted values.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

/// One evaluated set of coefficients.
#[derive(Debug, Clone)]
struct Trial {
    coefficients: CalibratedCoefficients,
    differentiation: BTreeMap<Variant, f64>,
    quality: f64,
    routable_pairs: usize,
}

/// Finds coefficients under which `safe`, `bike` and `safe_bike` all
/// produce routes distinct from `fastest`.
#[derive(Debug, Clone)]
pub struct WeightCalibrator {
    builder: GraphBuilder,
    config: CalibrationConfig,
}

impl WeightCalibrator {
    /// Creates a calibrator that builds trial graphs with `builder`.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(builder: GraphBuilder, config: CalibrationConfig) -> Result<Self, CalibrationError> {
        config.validate()?;
        Ok(Self { builder, config })
    }

    /// Calibrates over `pairs`, or over pairs drawn from the network when
    /// `pairs` is empty.
    ///
    /// Running out of iterations is not an error: the best coefficients seen
    /// are returned with [`CalibrationReport::incomplete`] set.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::Graph`] if a trial graph cannot be built.
    pub fn calibrate(
        &self,
        network: &Arc<InfrastructureGraph>,
        features: &Arc<EdgeFeatures>,
        pairs: &[(NodeId, NodeId)],
    ) -> Result<CalibrationReport, CalibrationError> {
        if let Some(fixed) = self.config.fixed {
            log::info!("Using fixed coefficients {fixed:?}");
            return Ok(CalibrationReport::fixed(fixed));
        }

        let pairs = if pairs.is_empty() {
            generate_pairs(
                network,
                self.config.trial_pairs,
                self.config.min_pair_distance_m,
                self.config.seed,
            )
        } else {
            pairs.to_vec()
        };

        let mut coefficients = self.clamp(initial_coefficients(features));
        log::info!(
            "Calibrating over {} pair(s) from crime scale {:.3}, bike scale {:.3}",
            pairs.len(),
            coefficients.crime_penalty_scale,
            coefficients.bike_bonus_scale
        );

        let target = self.config.target_differentiation;
        let mut best: Option<Trial> = None;
        let mut iterations = 0;
        let mut reached = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let graphs =
                self.builder
                    .weigh(Arc::clone(network), Arc::clone(features), coefficients)?;
            let trial = self.evaluate(&graphs, &pairs, coefficients);
            log::debug!(
                "Iteration {iterations}: {:?} -> quality {:.3}",
                trial.coefficients,
                trial.quality
            );

            let under: Vec<Variant> = ADJUSTED
                .into_iter()
                .filter(|v| trial.differentiation.get(v).copied().unwrap_or(0.0) < target)
                .collect();
            if best.as_ref().is_none_or(|b| trial.quality > b.quality) {
                best = Some(trial);
            }
            if under.is_empty() {
                reached = true;
                break;
            }

            let next = self.grow(coefficients, &under);
            if next == coefficients {
                log::debug!("Both scales at their cap; stopping");
                break;
            }
            coefficients = next;
        }

        let Some(best) = best else {
            // Zero iterations cannot happen after validation.
            return Ok(CalibrationReport::fixed(coefficients));
        };

        let incomplete = (!reached).then(|| CalibrationIncomplete {
            iterations,
            quality: best.quality,
            target,
        });
        if let Some(warning) = &incomplete {
            log::warn!("{warning}");
        } else {
            log::info!(
                "Calibrated after {iterations} iteration(s): crime scale {:.3}, bike scale {:.3}",
                best.coefficients.crime_penalty_scale,
                best.coefficients.bike_bonus_scale
            );
        }

        Ok(CalibrationReport {
            coefficients: best.coefficients,
            iterations,
            differentiation: best.differentiation,
            quality: best.quality,
            sampled_pairs: pairs.len(),
            routable_pairs: best.routable_pairs,
            incomplete,
        })
    }

    fn clamp(&self, coefficients: CalibratedCoefficients) -> CalibratedCoefficients {
        CalibratedCoefficients {
            crime_penalty_scale: coefficients.crime_penalty_scale.min(self.config.max_scale),
            bike_bonus_scale: coefficients.bike_bonus_scale.min(self.config.max_scale),
        }
    }

    fn grow(&self, current: CalibratedCoefficients, under: &[Variant]) -> CalibratedCoefficients {
        let mut next = current;
        if under.iter().any(|v| v.uses_risk()) {
            next.crime_penalty_scale *= self.config.growth_factor;
        }
        if under.iter().any(|v| v.uses_bike()) {
            next.bike_bonus_scale *= self.config.growth_factor;
        }
        self.clamp(next)
    }

    fn evaluate(
        &self,
        graphs: &RoutingGraphs,
        pairs: &[(NodeId, NodeId)],
        coefficients: CalibratedCoefficients,
    ) -> Trial {
        let limits = SearchLimits {
            max_visited_nodes: self.config.max_visited_nodes,
            deadline: None,
        };
        let cancel = CancellationToken::new();
        let route = |variant: Variant, source: NodeId, target: NodeId| {
            let mut visited = 0;
            match shortest_path(
                graphs.network(),
                graphs.weights(variant),
                source,
                target,
                Algorithm::Dijkstra,
                &limits,
                &cancel,
                &mut visited,
            ) {
                Ok(PathOutcome::Found(path)) => Some(path),
                Ok(PathOutcome::Unreachable) | Err(_) => None,
            }
        };

        // One entry per pair, in pair order: None when fastest cannot route
        // it, otherwise whether each adjusted variant differs.
        let outcomes: Vec<Option<[bool; 3]>> = pairs
            .par_iter()
            .map(|&(source, target)| {
                let fastest = route(Variant::Fastest, source, target)?;
                Some(ADJUSTED.map(|variant| {
                    route(variant, source, target)
                        .is_some_and(|path| self.differs(graphs, &fastest, &path))
                }))
            })
            .collect();

        let routable: Vec<[bool; 3]> = outcomes.into_iter().flatten().collect();
        let routable_pairs = routable.len();
        let differentiation: BTreeMap<Variant, f64> = ADJUSTED
            .iter()
            .enumerate()
            .map(|(i, &variant)| {
                let differing = routable.iter().filter(|o| o[i]).count();
                #[allow(clippy::cast_precision_loss)]
                let fraction = if routable_pairs == 0 {
                    0.0
                } else {
                    differing as f64 / routable_pairs as f64
                };
                (variant, fraction)
            })
            .collect();
        let quality = differentiation.values().copied().fold(1.0, f64::min);

        Trial {
            coefficients,
            differentiation,
            quality,
            routable_pairs,
        }
    }

    fn differs(&self, graphs: &RoutingGraphs, fastest: &PathFound, other: &PathFound) -> bool {
        let length = |path: &PathFound| {
            path.edges
                .iter()
                .map(|&e| graphs.network().edge(e).length_m)
                .sum::<f64>()
        };
        fastest.nodes != other.nodes
            || (length(fastest) - length(other)).abs() > self.config.min_distance_delta_m
    }
}

#[cfg(test)]
mod tests {
    use saferoute_graph::GraphConfig;
    use saferoute_network::{TagClassifier, build_network};
    use saferoute_network_models::RawWay;
    use saferoute_risk::RiskLookup;
    use saferoute_route_models::Coordinate;

    use super::*;
    use crate::snap_pairs;

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

    fn at(row: u32, col: u32) -> Coordinate {
        Coordinate::new(
            0.001_f64.mul_add(f64::from(row), 40.0),
            0.001_f64.mul_add(f64::from(col), -86.004),
        )
    }

    /// A 5×5 two-way grid with a cycleway along the top row.
    fn grid() -> Arc<InfrastructureGraph> {
        let tags = |highway: &str| {
            [("highway".to_string(), highway.to_string())]
                .into_iter()
                .collect()
        };
        let mut ways = Vec::new();
        for i in 0..5_u32 {
            ways.push(RawWay {
                id: i64::from(i),
                tags: tags(if i == 4 { "cycleway" } else { "residential" }),
                coords: (0..5).map(|j| (at(i, j).lat, at(i, j).lon)).collect(),
            });
            ways.push(RawWay {
                id: 100 + i64::from(i),
                tags: tags("residential"),
                coords: (0..5).map(|j| (at(j, i).lat, at(j, i).lon)).collect(),
            });
        }
        Arc::new(build_network(ways, &TagClassifier).0)
    }

    fn calibrator(config: CalibrationConfig) -> WeightCalibrator {
        WeightCalibrator::new(GraphBuilder::new(GraphConfig::default()).unwrap(), config).unwrap()
    }

    #[test]
    fn initial_scales_follow_the_data() {
        let features =
            EdgeFeatures::from_values(vec![0.0, 0.1, 0.2, 0.5], vec![0.0, 1.0 / 3.0, 1.0, 0.0])
                .unwrap();
        let c = initial_coefficients(&features);
        assert!((c.crime_penalty_scale - 2.0).abs() < 1e-12);
        assert!((c.bike_bonus_scale - LN_2 / (2.0 / 3.0)).abs() < 1e-12);

        let empty = initial_coefficients(&EdgeFeatures::from_values(vec![0.0], vec![0.0]).unwrap());
        assert!((empty.crime_penalty_scale - 1.0).abs() < f64::EPSILON);
        assert!((empty.bike_bonus_scale - LN_2).abs() < f64::EPSILON);
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.9), Some(9.0));
        assert_eq!(percentile(&values, 1.0), Some(10.0));
        assert_eq!(percentile(&[], 0.9), None);
    }

    #[test]
    fn grows_scales_until_every_variant_differs() {
        let network = grid();
        let builder = GraphBuilder::default();
        let features = Arc::new(builder.features(&network, &CentreHotspot));
        let pairs = snap_pairs(
            &network,
            &[(at(2, 0), at(2, 4)), (at(3, 0), at(3, 4))],
            1.0,
        );
        assert_eq!(pairs.len(), 2);

        let calibrator = calibrator(CalibrationConfig {
            target_differentiation: 0.5,
            ..CalibrationConfig::default()
        });
        let report = calibrator.calibrate(&network, &features, &pairs).unwrap();

        assert!(report.incomplete.is_none(), "{report:?}");
        assert_eq!(report.routable_pairs, 2);
        assert!(report.quality >= 0.5);
        let initial = initial_coefficients(&features);
        assert!(report.coefficients.crime_penalty_scale > initial.crime_penalty_scale);
        assert!(report.coefficients.bike_bonus_scale > initial.bike_bonus_scale);
    }

    #[test]
    fn calibration_is_deterministic() {
        let network = grid();
        let builder = GraphBuilder::default();
        let features = Arc::new(builder.features(&network, &CentreHotspot));
        let calibrator = calibrator(CalibrationConfig {
            min_pair_distance_m: 200.0,
            trial_pairs: 12,
            ..CalibrationConfig::default()
        });
        let first = calibrator.calibrate(&network, &features, &[]).unwrap();
        let second = calibrator.calibrate(&network, &features, &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sampled_pairs, 12);
    }

    #[test]
    fn unreachable_targets_report_incomplete() {
        let network = grid();
        // No risk anywhere: `safe` can never differ from `fastest`.
        let quality: Vec<f64> = network
            .edges()
            .iter()
            .map(|e| if e.is_bike_infrastructure() { 1.0 } else { 0.0 })
            .collect();
        let features = Arc::new(
            EdgeFeatures::from_values(vec![0.0; network.edge_count()], quality).unwrap(),
        );
        let calibrator = calibrator(CalibrationConfig {
            min_pair_distance_m: 200.0,
            max_iterations: 3,
            ..CalibrationConfig::default()
        });
        let report = calibrator.calibrate(&network, &features, &[]).unwrap();

        let warning = report.incomplete.expect("incomplete");
        assert_eq!(warning.iterations, 3);
        assert_eq!(report.iterations, 3);
        assert!(report.quality.abs() < f64::EPSILON);
        assert!(report.differentiation[&Variant::Safe].abs() < f64::EPSILON);
        // Every trial ties at zero quality; the first is kept.
        assert!((report.coefficients.crime_penalty_scale - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fixed_coefficients_skip_calibration() {
        let network = grid();
        let features = Arc::new(GraphBuilder::default().features(&network, &CentreHotspot));
        let fixed = CalibratedCoefficients::new(3.0, 1.0).unwrap();
        let calibrator = calibrator(CalibrationConfig {
            fixed: Some(fixed),
            ..CalibrationConfig::default()
        });
        let report = calibrator.calibrate(&network, &features, &[]).unwrap();
        assert_eq!(report.coefficients, fixed);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn rejects_bad_config() {
        let config = CalibrationConfig {
            growth_factor: 1.0,
            ..CalibrationConfig::default()
        };
        assert!(WeightCalibrator::new(GraphBuilder::default(), config).is_err());
    }
}
