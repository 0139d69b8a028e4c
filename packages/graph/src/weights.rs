//! Variant weight formulas.
//!
//! With `L` the edge length, `r` its mean risk and `q` its quality factor:
//!
//! | variant     | weight                           |
//! |-------------|----------------------------------|
//! | `fastest`   | `L`                              |
//! | `safe`      | `L + P`                          |
//! | `bike`      | `max(L − B, F)`                  |
//! | `safe_bike` | `max(L + P − B, F)`              |
//!
//! where `P = crime_penalty_scale × r × L`,
//! `B = L × (1 − f) × (1 − e^(−bike_bonus_scale × q))` and `F = L × f` for
//! the minimum weight fraction `f`. The bonus saturates below `L − F`, so
//! bike weights fall strictly as the bike scale grows but never reach the
//! floor.

use rayon::prelude::*;
use saferoute_network::InfrastructureGraph;
use saferoute_route_models::{CalibratedCoefficients, Variant};

use crate::EdgeFeatures;

/// Weight of one edge under `variant`.
#[must_use]
pub fn edge_weight(
    variant: Variant,
    length_m: f64,
    risk: f64,
    quality_factor: f64,
    coefficients: &CalibratedCoefficients,
    min_weight_fraction: f64,
) -> f64 {
    let penalty = if variant.uses_risk() {
        coefficients.crime_penalty_scale * risk * length_m
    } else {
        0.0
    };
    if !variant.uses_bike() {
        return length_m + penalty;
    }

    let saturation = 1.0 - (-coefficients.bike_bonus_scale * quality_factor).exp();
    let bonus = length_m * (1.0 - min_weight_fraction) * saturation;
    let floor = length_m * min_weight_fraction;
    (length_m + penalty - bonus).max(floor)
}

/// One variant's weight table and A* heuristic scale.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantWeights {
    variant: Variant,
    weights: Vec<f64>,
    heuristic_scale: f64,
}

impl VariantWeights {
    /// Computes the table for `variant` over every edge.
    #[must_use]
    pub fn compute(
        variant: Variant,
        network: &InfrastructureGraph,
        features: &EdgeFeatures,
        coefficients: &CalibratedCoefficients,
        min_weight_fraction: f64,
    ) -> Self {
        let weights: Vec<f64> = network
            .edges()
            .par_iter()
            .map(|edge| {
                edge_weight(
                    variant,
                    edge.length_m,
                    features.risk(edge.id),
                    features.quality_factor(edge.id),
                    coefficients,
                    min_weight_fraction,
                )
            })
            .collect();
        let heuristic_scale = heuristic_scale(network, &weights);
        Self {
            variant,
            weights,
            heuristic_scale,
        }
    }

    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    /// Weight of every edge, indexed by edge id.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight of one edge.
    #[must_use]
    pub fn weight(&self, edge: usize) -> f64 {
        self.weights[edge]
    }

    /// Factor applied to the great-circle distance so the A* heuristic never
    /// overestimates remaining cost.
    #[must_use]
    pub const fn heuristic_scale(&self) -> f64 {
        self.heuristic_scale
    }
}

/// `min(1, min over edges of weight / endpoint distance)`.
///
/// Edges whose endpoints coincide (within a millimetre) place no bound.
fn heuristic_scale(network: &InfrastructureGraph, weights: &[f64]) -> f64 {
    network
        .edges()
        .par_iter()
        .filter_map(|edge| {
            let straight = network.node_distance_m(edge.from, edge.to);
            (straight > 1e-3).then(|| weights[edge.id] / straight)
        })
        .reduce(|| 1.0, f64::min)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: f64 = 0.05;

    fn coefficients(crime: f64, bike: f64) -> CalibratedCoefficients {
        CalibratedCoefficients {
            crime_penalty_scale: crime,
            bike_bonus_scale: bike,
        }
    }

    #[test]
    fn fastest_is_length() {
        let w = edge_weight(Variant::Fastest, 120.0, 0.9, 1.0, &coefficients(5.0, 5.0), FLOOR);
        assert!((w - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ordering_bike_fastest_safe() {
        let c = coefficients(2.0, 1.5);
        let cases = [
            (0.0, 0.0),
            (0.4, 0.0),
            (0.0, 1.0),
            (0.7, 2.0 / 3.0),
            (1.0, 1.0),
        ];
        for (risk, quality) in cases {
            let fastest = edge_weight(Variant::Fastest, 80.0, risk, quality, &c, FLOOR);
            let safe = edge_weight(Variant::Safe, 80.0, risk, quality, &c, FLOOR);
            let bike = edge_weight(Variant::Bike, 80.0, risk, quality, &c, FLOOR);
            let safe_bike = edge_weight(Variant::SafeBike, 80.0, risk, quality, &c, FLOOR);
            assert!(bike <= fastest && fastest <= safe, "{risk} {quality}");
            assert!(safe_bike <= safe);
            assert!(bike > 0.0 && safe_bike > 0.0);
        }
    }

    #[test]
    fn crime_scale_strictly_increases_risky_edges() {
        let mut last = 0.0;
        for scale in [0.0, 0.5, 1.0, 4.0, 20.0] {
            let w = edge_weight(Variant::Safe, 50.0, 0.3, 0.0, &coefficients(scale, 1.0), FLOOR);
            assert!(w > last);
            last = w;
        }
    }

    #[test]
    fn bike_scale_strictly_decreases_bike_edges_above_floor() {
        let mut last = f64::INFINITY;
        for scale in [0.0, 0.25, 1.0, 3.0, 10.0] {
            let c = coefficients(1.0, scale);
            let w = edge_weight(Variant::Bike, 50.0, 0.0, 1.0 / 3.0, &c, FLOOR);
            assert!(w < last, "scale {scale}: {w} !< {last}");
            assert!(w > 50.0 * FLOOR);
            last = w;
        }
    }

    #[test]
    fn safe_bike_never_drops_below_floor() {
        let w = edge_weight(
            Variant::SafeBike,
            10.0,
            0.0,
            1.0,
            &coefficients(0.0, 1_000.0),
            FLOOR,
        );
        assert!(w >= 10.0 * FLOOR);
    }
}
