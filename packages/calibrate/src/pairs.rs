//! Origin/destination pairs used as calibration trials.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use saferoute_network::InfrastructureGraph;
use saferoute_network_models::NodeId;
use saferoute_route_models::Coordinate;

/// Draws attempts per wanted pair before giving up.
const DRAWS_PER_PAIR: usize = 64;

/// Draws up to `count` node pairs that are mutually reachable and at least
/// `min_distance_m` apart. The same seed always yields the same pairs.
#[must_use]
pub fn generate_pairs(
    network: &InfrastructureGraph,
    count: usize,
    min_distance_m: f64,
    seed: u64,
) -> Vec<(NodeId, NodeId)> {
    let candidates: Vec<NodeId> = (0..network.node_count())
        .filter(|&n| network.degree(n) > 0)
        .collect();
    if candidates.len() < 2 || count == 0 {
        return Vec::new();
    }

    let components = network.strongly_connected_components();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count.saturating_mul(DRAWS_PER_PAIR) {
        if pairs.len() >= count {
            break;
        }
        let a = candidates[rng.gen_range(0..candidates.len())];
        let b = candidates[rng.gen_range(0..candidates.len())];
        if a != b
            && components[a] == components[b]
            && network.node_distance_m(a, b) >= min_distance_m
        {
            pairs.push((a, b));
        }
    }

    if pairs.len() < count {
        log::warn!(
            "Only found {}/{count} calibration pair(s) at least {min_distance_m:.0} m apart",
            pairs.len()
        );
    }
    pairs
}

/// Snaps caller-provided endpoints to their nearest nodes, skipping pairs
/// with an endpoint farther than `max_distance_m` from the network.
#[must_use]
pub fn snap_pairs(
    network: &InfrastructureGraph,
    pairs: &[(Coordinate, Coordinate)],
    max_distance_m: f64,
) -> Vec<(NodeId, NodeId)> {
    let nearest = |point: &Coordinate| {
        network
            .nearest_nodes(point.lat, point.lon, max_distance_m, 1)
            .first()
            .map(|&(node, _)| node)
    };
    pairs
        .iter()
        .filter_map(|(origin, destination)| {
            let snapped = nearest(origin).zip(nearest(destination));
            if snapped.is_none() {
                log::warn!(
                    "Skipping calibration pair ({}, {}) -> ({}, {}): off the network",
                    origin.lat,
                    origin.lon,
                    destination.lat,
                    destination.lon
                );
            }
            snapped
        })
        .collect()
}
