#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route queries over the variant graphs.
//!
//! A query snaps both endpoints to nearby nodes, searches the requested
//! variant with Dijkstra or A*, and falls back to alternative snapped nodes
//! when the nearest pair is disconnected. Every failure is reported inside
//! the returned [`RouteResult`], never as a best-guess route.

mod path;

pub use path::{PathFound, PathOutcome, SearchLimits, shortest_path};

use std::time::{Duration, Instant};

use rayon::prelude::*;
use saferoute_graph::RoutingGraphs;
use saferoute_network_models::NodeId;
use saferoute_route_models::{Algorithm, Coordinate, RouteError, RouteResult, Variant};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Query-time parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query points farther than this from every node are out of service.
    pub max_snap_distance_m: f64,
    /// Snapped candidates considered per endpoint.
    pub snap_candidates: usize,
    /// Candidate pairs tried after the nearest pair fails.
    pub fallback_attempts: usize,
    /// Expansions allowed per query.
    pub max_visited_nodes: usize,
    /// Wall-clock budget per query in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_snap_distance_m: 500.0,
            snap_candidates: 5,
            fallback_attempts: 8,
            max_visited_nodes: 2_000_000,
            timeout_ms: 10_000,
        }
    }
}

/// Runs queries against one set of [`RoutingGraphs`].
#[derive(Debug, Clone, Copy)]
pub struct RouteSearch<'a> {
    graphs: &'a RoutingGraphs,
    config: &'a SearchConfig,
}

impl<'a> RouteSearch<'a> {
    #[must_use]
    pub const fn new(graphs: &'a RoutingGraphs, config: &'a SearchConfig) -> Self {
        Self { graphs, config }
    }

    /// Finds a route without a cancellation handle.
    #[must_use]
    pub fn find_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variant: Variant,
        algorithm: Algorithm,
    ) -> RouteResult {
        self.find_route_with_cancel(
            origin,
            destination,
            variant,
            algorithm,
            &CancellationToken::new(),
        )
    }

    /// Finds a route, giving up when `cancel` fires.
    #[must_use]
    pub fn find_route_with_cancel(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variant: Variant,
        algorithm: Algorithm,
        cancel: &CancellationToken,
    ) -> RouteResult {
        let started = Instant::now();
        let mut visited = 0;
        let outcome = self.search(
            origin,
            destination,
            variant,
            algorithm,
            started,
            cancel,
            &mut visited,
        );
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        match outcome {
            Ok(path) => {
                log::debug!(
                    "{variant}/{algorithm}: {} node(s), {visited} visited in {elapsed_ms:.1}ms",
                    path.nodes.len()
                );
                self.assemble(&path, variant, algorithm, visited, elapsed_ms)
            }
            Err(error) => {
                log::debug!("{variant}/{algorithm}: {error}");
                RouteResult::failed(variant, algorithm, error, visited, elapsed_ms)
            }
        }
    }

    /// Runs every variant in `variants` for the same endpoints, returning
    /// results in the same order.
    #[must_use]
    pub fn compare(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variants: &[Variant],
        algorithm: Algorithm,
        cancel: &CancellationToken,
    ) -> Vec<RouteResult> {
        variants
            .par_iter()
            .map(|&variant| {
                self.find_route_with_cancel(origin, destination, variant, algorithm, cancel)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        variant: Variant,
        algorithm: Algorithm,
        started: Instant,
        cancel: &CancellationToken,
        visited: &mut usize,
    ) -> Result<PathFound, RouteError> {
        origin.validate()?;
        destination.validate()?;
        if cancel.is_cancelled() {
            return Err(RouteError::Cancelled);
        }

        let origins = self.snap(origin)?;
        let destinations = self.snap(destination)?;

        let limits = SearchLimits {
            max_visited_nodes: self.config.max_visited_nodes,
            deadline: started.checked_add(Duration::from_millis(self.config.timeout_ms)),
        };
        let network = self.graphs.network();
        let weights = self.graphs.weights(variant);

        let mut attempts = 0;
        for (from, to) in candidate_pairs(&origins, &destinations)
            .into_iter()
            .take(self.config.fallback_attempts.saturating_add(1))
        {
            attempts += 1;
            match shortest_path(
                network, weights, from, to, algorithm, &limits, cancel, visited,
            )? {
                PathOutcome::Found(path) => {
                    if attempts > 1 {
                        log::debug!("Routed {from} -> {to} on attempt {attempts}");
                    }
                    return Ok(path);
                }
                PathOutcome::Unreachable => {}
            }
        }

        Err(RouteError::NoRouteFound { attempts })
    }

    fn snap(&self, point: Coordinate) -> Result<Vec<NodeId>, RouteError> {
        let candidates = self.graphs.network().nearest_nodes(
            point.lat,
            point.lon,
            self.config.max_snap_distance_m,
            self.config.snap_candidates.max(1),
        );
        if candidates.is_empty() {
            return Err(RouteError::OutOfServiceArea {
                lat: point.lat,
                lon: point.lon,
                max_distance_m: self.config.max_snap_distance_m,
            });
        }
        Ok(candidates.into_iter().map(|(node, _)| node).collect())
    }

    fn assemble(
        &self,
        path: &PathFound,
        variant: Variant,
        algorithm: Algorithm,
        visited_nodes: usize,
        compute_time_ms: f64,
    ) -> RouteResult {
        let network = self.graphs.network();
        let features = self.graphs.features();

        let mut distance_m = 0.0;
        let mut estimated_time_s = 0.0;
        let mut risk_length = 0.0;
        let mut bike_length = 0.0;
        for &edge_id in &path.edges {
            let edge = network.edge(edge_id);
            distance_m += edge.length_m;
            estimated_time_s += edge.base_travel_time_s;
            risk_length += features.risk(edge_id) * edge.length_m;
            if edge.is_bike_infrastructure() {
                bike_length += edge.length_m;
            }
        }

        let (safety_score, bike_coverage_percent) = if distance_m > 0.0 {
            (
                (100.0 * (1.0 - risk_length / distance_m)).clamp(0.0, 100.0),
                (100.0 * bike_length / distance_m).clamp(0.0, 100.0),
            )
        } else {
            (100.0, 0.0)
        };

        RouteResult {
            points: path
                .nodes
                .iter()
                .map(|&n| {
                    let node = network.node(n);
                    (node.lat, node.lon)
                })
                .collect(),
            distance_m,
            estimated_time_s,
            safety_score,
            bike_coverage_percent,
            node_count: path.nodes.len(),
            variant,
            algorithm,
            visited_nodes,
            compute_time_ms,
            error: None,
        }
    }
}

/// Every origin/destination candidate pair, ordered by combined rank and
/// then by origin rank.
fn candidate_pairs(origins: &[NodeId], destinations: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    let mut ranked: Vec<(usize, usize)> = (0..origins.len())
        .flat_map(|i| (0..destinations.len()).map(move |j| (i, j)))
        .collect();
    ranked.sort_by_key(|&(i, j)| (i + j, i));
    ranked
        .into_iter()
        .map(|(i, j)| (origins[i], destinations[j]))
        .collect()
}
