//! Turning raw ways into the routable graph.

use std::collections::{BTreeMap, HashMap};

use saferoute_network_models::{NodeId, RawWay, RoadEdge, RoadNode};
use serde::Serialize;

use crate::classify::{InfrastructureClassifier, WayDropReason, class_speed_kmh, way_access};
use crate::graph::InfrastructureGraph;
use crate::haversine_m;

/// Coordinates closer than this many degrees share a node.
const NODE_PRECISION: f64 = 1e-7;

/// Counts from one network build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    /// Ways read from the source.
    pub ways_read: usize,
    /// Ways that produced at least one edge.
    pub ways_used: usize,
    /// Ways dropped, by reason.
    pub ways_dropped: BTreeMap<String, usize>,
    /// Segments dropped as self-loops or zero length.
    pub malformed_edges: usize,
}

impl BuildReport {
    fn drop_way(&mut self, reason: WayDropReason) {
        *self.ways_dropped.entry(reason.to_string()).or_default() += 1;
    }
}

/// Builds the routable graph from raw ways.
///
/// Ways are processed in id order so the result does not depend on source
/// order. Every vertex becomes a node (shared between ways when the
/// coordinates match) and every consecutive vertex pair becomes one edge per
/// permitted direction.
#[must_use]
pub fn build_network(
    mut ways: Vec<RawWay>,
    classifier: &dyn InfrastructureClassifier,
) -> (InfrastructureGraph, BuildReport) {
    ways.sort_by_key(|w| w.id);

    let mut report = BuildReport {
        ways_read: ways.len(),
        ..BuildReport::default()
    };
    let mut nodes: Vec<RoadNode> = Vec::new();
    let mut node_ids: HashMap<(i64, i64), NodeId> = HashMap::new();
    let mut edges: Vec<RoadEdge> = Vec::new();

    for way in &ways {
        let direction = match way_access(way) {
            Ok(direction) => direction,
            Err(reason) => {
                log::debug!("Way {}: dropped ({reason})", way.id);
                report.drop_way(reason);
                continue;
            }
        };

        let vertices: Vec<NodeId> = way
            .coords
            .iter()
            .filter(|(lat, lon)| valid_coordinate(*lat, *lon))
            .map(|&(lat, lon)| intern_node(&mut nodes, &mut node_ids, lat, lon))
            .collect();
        if vertices.len() < 2 {
            report.drop_way(WayDropReason::TooShort);
            continue;
        }

        let classification = classifier.classify(way);
        let highway = way.tag("highway").unwrap_or_default().to_string();
        let name = way.tag("name").map(str::to_string);
        let speed_mps = class_speed_kmh(&highway) / 3.6;

        let before = edges.len();
        for pair in vertices.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let length_m = haversine_m(nodes[a].lat, nodes[a].lon, nodes[b].lat, nodes[b].lon);
            if a == b || !(length_m.is_finite() && length_m > 0.0) {
                report.malformed_edges += 1;
                continue;
            }
            let directed = [(direction.forward(), a, b), (direction.backward(), b, a)];
            for (from, to) in directed
                .into_iter()
                .filter_map(|(allowed, from, to)| allowed.then_some((from, to)))
            {
                edges.push(RoadEdge {
                    id: edges.len(),
                    from,
                    to,
                    length_m,
                    base_travel_time_s: length_m / speed_mps,
                    infrastructure: classification.infrastructure,
                    quality: classification.quality,
                    highway: highway.clone(),
                    name: name.clone(),
                });
            }
        }
        if edges.len() > before {
            report.ways_used += 1;
        }
    }

    log::info!(
        "Built network: {} nodes, {} edges from {}/{} ways",
        nodes.len(),
        edges.len(),
        report.ways_used,
        report.ways_read
    );
    if report.malformed_edges > 0 {
        log::debug!("Dropped {} malformed segment(s)", report.malformed_edges);
    }

    (InfrastructureGraph::from_parts(nodes, edges), report)
}

fn valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

#[allow(clippy::cast_possible_truncation)]
fn intern_node(
    nodes: &mut Vec<RoadNode>,
    node_ids: &mut HashMap<(i64, i64), NodeId>,
    lat: f64,
    lon: f64,
) -> NodeId {
    let key = (
        (lat / NODE_PRECISION).round() as i64,
        (lon / NODE_PRECISION).round() as i64,
    );
    *node_ids.entry(key).or_insert_with(|| {
        let id = nodes.len();
        nodes.push(RoadNode { id, lat, lon });
        id
    })
}
