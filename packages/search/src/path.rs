//! Single-pair shortest path over one variant's weights.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use saferoute_graph::VariantWeights;
use saferoute_network::InfrastructureGraph;
use saferoute_network_models::{EdgeId, NodeId};
use saferoute_route_models::{Algorithm, RouteError};
use tokio_util::sync::CancellationToken;

/// The deadline is only consulted every this many expansions.
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Per-query search budgets.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Expansions allowed over the whole query.
    pub max_visited_nodes: usize,
    /// Wall-clock deadline.
    pub deadline: Option<Instant>,
}

/// A found path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathFound {
    /// Nodes from source to target.
    pub nodes: Vec<NodeId>,
    /// Edges between consecutive nodes.
    pub edges: Vec<EdgeId>,
    /// Total variant weight.
    pub cost: f64,
}

/// Outcome of one source/target search.
#[derive(Debug, Clone, PartialEq)]
pub enum PathOutcome {
    Found(PathFound),
    Unreachable,
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    priority: f64,
    cost: f64,
    seq: u64,
    node: NodeId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed for a min-heap; earlier insertions win ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Finds the cheapest path from `source` to `target` under `weights`.
///
/// `visited` accumulates expansions so budgets span fallback attempts.
///
/// # Errors
///
/// * [`RouteError::SearchTimeout`] once `visited` exceeds the node budget or
///   the deadline passes
/// * [`RouteError::Cancelled`] as soon as `cancel` fires
#[allow(clippy::too_many_arguments)]
pub fn shortest_path(
    network: &InfrastructureGraph,
    weights: &VariantWeights,
    source: NodeId,
    target: NodeId,
    algorithm: Algorithm,
    limits: &SearchLimits,
    cancel: &CancellationToken,
    visited: &mut usize,
) -> Result<PathOutcome, RouteError> {
    if source == target {
        return Ok(PathOutcome::Found(PathFound {
            nodes: vec![source],
            edges: Vec::new(),
            cost: 0.0,
        }));
    }

    let goal = network.node(target);
    let heuristic = |node: NodeId| match algorithm {
        Algorithm::Dijkstra => 0.0,
        Algorithm::Astar => {
            let n = network.node(node);
            weights.heuristic_scale()
                * saferoute_network::haversine_m(n.lat, n.lon, goal.lat, goal.lon)
        }
    };

    let n = network.node_count();
    let mut best = vec![f64::INFINITY; n];
    let mut via: Vec<Option<EdgeId>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0_u64;

    best[source] = 0.0;
    heap.push(QueueEntry {
        priority: heuristic(source),
        cost: 0.0,
        seq,
        node: source,
    });

    let mut expansions = 0_usize;
    while let Some(QueueEntry { cost, node, .. }) = heap.pop() {
        if cost > best[node] {
            continue;
        }
        if node == target {
            return Ok(PathOutcome::Found(reconstruct(
                network, &via, source, target, cost,
            )));
        }

        *visited += 1;
        expansions += 1;
        if *visited > limits.max_visited_nodes {
            return Err(RouteError::SearchTimeout {
                visited_nodes: *visited,
            });
        }
        if expansions % DEADLINE_CHECK_INTERVAL == 0
            && let Some(deadline) = limits.deadline
            && Instant::now() >= deadline
        {
            return Err(RouteError::SearchTimeout {
                visited_nodes: *visited,
            });
        }

        for &edge_id in network.outgoing(node) {
            if cancel.is_cancelled() {
                return Err(RouteError::Cancelled);
            }
            let head = network.edge(edge_id).to;
            let next = cost + weights.weight(edge_id);
            if next < best[head] {
                best[head] = next;
                via[head] = Some(edge_id);
                seq += 1;
                heap.push(QueueEntry {
                    priority: next + heuristic(head),
                    cost: next,
                    seq,
                    node: head,
                });
            }
        }
    }

    Ok(PathOutcome::Unreachable)
}

fn reconstruct(
    network: &InfrastructureGraph,
    via: &[Option<EdgeId>],
    source: NodeId,
    target: NodeId,
    cost: f64,
) -> PathFound {
    let mut edges = Vec::new();
    let mut node = target;
    while node != source
        && let Some(edge_id) = via[node]
    {
        edges.push(edge_id);
        node = network.edge(edge_id).from;
    }
    edges.reverse();

    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(source);
    nodes.extend(edges.iter().map(|&e| network.edge(e).to));

    PathFound { nodes, edges, cost }
}
