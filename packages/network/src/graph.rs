//! Immutable routable network with CSR adjacency and a spatial node index.

use rstar::RTree;
use rstar::primitives::GeomWithData;
use saferoute_network_models::{
    EdgeId, NetworkSnapshot, NetworkStats, NodeId, RoadEdge, RoadNode,
};

use crate::{METERS_PER_DEGREE, NetworkError, haversine_m};

type IndexedNode = GeomWithData<[f64; 2], NodeId>;

/// The shared directed multigraph every route variant is weighted over.
///
/// Node and edge ids are dense indices. Adjacency is stored in compressed
/// sparse row form in both directions; edges leaving (or entering) a node are
/// listed in id order. Only nodes with at least one incident edge are
/// indexed for snapping.
#[derive(Debug, Clone)]
pub struct InfrastructureGraph {
    nodes: Vec<RoadNode>,
    edges: Vec<RoadEdge>,
    out_offsets: Vec<usize>,
    out_edges: Vec<EdgeId>,
    in_offsets: Vec<usize>,
    in_edges: Vec<EdgeId>,
    index: RTree<IndexedNode>,
    lon_scale: f64,
}

impl InfrastructureGraph {
    /// Builds a graph from prebuilt nodes and edges.
    ///
    /// Self-loops and edges with a non-positive or non-finite length are
    /// dropped and the remaining edges renumbered; the number dropped is
    /// returned alongside the graph.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidSnapshot`] if node ids are not dense
    /// or an edge references a missing node.
    pub fn from_snapshot(snapshot: NetworkSnapshot) -> Result<(Self, usize), NetworkError> {
        let NetworkSnapshot { nodes, edges } = snapshot;
        if let Some((index, node)) = nodes.iter().enumerate().find(|(i, n)| n.id != *i) {
            return Err(NetworkError::InvalidSnapshot {
                message: format!("node at index {index} has id {}", node.id),
            });
        }
        if let Some(node) = nodes
            .iter()
            .find(|n| !(n.lat.is_finite() && n.lon.is_finite()))
        {
            return Err(NetworkError::InvalidSnapshot {
                message: format!("node {} has invalid coordinates", node.id),
            });
        }
        if let Some(edge) = edges
            .iter()
            .find(|e| e.from >= nodes.len() || e.to >= nodes.len())
        {
            return Err(NetworkError::InvalidSnapshot {
                message: format!("edge {} references a missing node", edge.id),
            });
        }

        let total = edges.len();
        let edges: Vec<RoadEdge> = edges
            .into_iter()
            .filter(|e| e.from != e.to && e.length_m.is_finite() && e.length_m > 0.0)
            .enumerate()
            .map(|(id, edge)| RoadEdge { id, ..edge })
            .collect();
        let dropped = total - edges.len();
        if dropped > 0 {
            log::debug!("Dropped {dropped} malformed edge(s) (self-loops or zero length)");
        }

        Ok((Self::from_parts(nodes, edges), dropped))
    }

    /// Assembles the graph from already-validated parts.
    pub(crate) fn from_parts(nodes: Vec<RoadNode>, edges: Vec<RoadEdge>) -> Self {
        let (out_offsets, out_edges) = csr(nodes.len(), &edges, |e| e.from);
        let (in_offsets, in_edges) = csr(nodes.len(), &edges, |e| e.to);

        #[allow(clippy::cast_precision_loss)]
        let mean_lat = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|n| n.lat).sum::<f64>() / nodes.len() as f64
        };
        let lon_scale = mean_lat.to_radians().cos().max(0.01);

        let points = nodes
            .iter()
            .filter(|n| {
                out_offsets[n.id + 1] > out_offsets[n.id] || in_offsets[n.id + 1] > in_offsets[n.id]
            })
            .map(|n| GeomWithData::new([n.lon * lon_scale, n.lat], n.id))
            .collect();

        Self {
            nodes,
            edges,
            out_offsets,
            out_edges,
            in_offsets,
            in_edges,
            index: RTree::bulk_load(points),
            lon_scale,
        }
    }

    /// All nodes, indexed by id.
    #[must_use]
    pub fn nodes(&self) -> &[RoadNode] {
        &self.nodes
    }

    /// All edges, indexed by id.
    #[must_use]
    pub fn edges(&self) -> &[RoadEdge] {
        &self.edges
    }

    /// Node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &RoadNode {
        &self.nodes[id]
    }

    /// Edge by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> &RoadEdge {
        &self.edges[id]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving `node`.
    #[must_use]
    pub fn outgoing(&self, node: NodeId) -> &[EdgeId] {
        &self.out_edges[self.out_offsets[node]..self.out_offsets[node + 1]]
    }

    /// Edges entering `node`.
    #[must_use]
    pub fn incoming(&self, node: NodeId) -> &[EdgeId] {
        &self.in_edges[self.in_offsets[node]..self.in_offsets[node + 1]]
    }

    /// Number of incident edges in either direction.
    #[must_use]
    pub fn degree(&self, node: NodeId) -> usize {
        self.outgoing(node).len() + self.incoming(node).len()
    }

    /// Straight-line distance between two nodes in metres.
    #[must_use]
    pub fn node_distance_m(&self, a: NodeId, b: NodeId) -> f64 {
        let (a, b) = (&self.nodes[a], &self.nodes[b]);
        haversine_m(a.lat, a.lon, b.lat, b.lon)
    }

    /// Non-isolated nodes within `max_distance_m` of `(lat, lon)`, nearest
    /// first (ties by id), at most `limit` of them.
    #[must_use]
    pub fn nearest_nodes(
        &self,
        lat: f64,
        lon: f64,
        max_distance_m: f64,
        limit: usize,
    ) -> Vec<(NodeId, f64)> {
        if limit == 0 || !lat.is_finite() || !lon.is_finite() {
            return Vec::new();
        }
        // The index squeezes longitude by the network's mean latitude. Away
        // from that latitude, planar east-west offsets overstate the true
        // ones by up to `lon_scale / cos(lat)`, so stretch the scan radius by
        // that ratio and filter on great-circle distance.
        let stretch = (self.lon_scale / lat.to_radians().cos().max(0.01)).max(1.0);
        let scan_limit_m = (max_distance_m * stretch).mul_add(1.05, 1.0);
        let query = [lon * self.lon_scale, lat];

        let mut candidates: Vec<(NodeId, f64)> = Vec::new();
        for point in self.index.nearest_neighbor_iter(&query) {
            let [x, y] = *point.geom();
            let planar_m = (x - query[0]).hypot(y - query[1]) * METERS_PER_DEGREE;
            if planar_m > scan_limit_m || candidates.len() >= limit.saturating_mul(2) {
                break;
            }
            let node = &self.nodes[point.data];
            let distance = haversine_m(lat, lon, node.lat, node.lon);
            if distance <= max_distance_m {
                candidates.push((node.id, distance));
            }
        }

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        candidates.truncate(limit);
        candidates
    }

    /// Strongly connected component of every node; two nodes are mutually
    /// reachable exactly when their ids match. Components are numbered in
    /// discovery order, so the result is deterministic.
    #[must_use]
    pub fn strongly_connected_components(&self) -> Vec<usize> {
        let n = self.nodes.len();

        let mut visited = vec![false; n];
        let mut finished = Vec::with_capacity(n);
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push((start, 0));
            while let Some((node, next)) = stack.last_mut() {
                let out = self.outgoing(*node);
                if *next < out.len() {
                    let head = self.edges[out[*next]].to;
                    *next += 1;
                    if !visited[head] {
                        visited[head] = true;
                        stack.push((head, 0));
                    }
                } else {
                    finished.push(*node);
                    stack.pop();
                }
            }
        }

        let mut component = vec![usize::MAX; n];
        let mut count = 0;
        let mut pending = Vec::new();
        for &root in finished.iter().rev() {
            if component[root] != usize::MAX {
                continue;
            }
            component[root] = count;
            pending.push(root);
            while let Some(node) = pending.pop() {
                for &edge in self.incoming(node) {
                    let tail = self.edges[edge].from;
                    if component[tail] == usize::MAX {
                        component[tail] = count;
                        pending.push(tail);
                    }
                }
            }
            count += 1;
        }
        component
    }

    /// A copy keeping only the edges `keep` accepts, renumbered.
    #[must_use]
    pub fn retain_edges(&self, keep: impl Fn(&RoadEdge) -> bool) -> Self {
        let edges = self
            .edges
            .iter()
            .filter(|e| keep(e))
            .enumerate()
            .map(|(id, e)| RoadEdge { id, ..e.clone() })
            .collect();
        Self::from_parts(self.nodes.clone(), edges)
    }

    /// Plain node and edge lists for caching.
    #[must_use]
    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Size and infrastructure summary.
    #[must_use]
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            isolated_nodes: (0..self.nodes.len()).filter(|&n| self.degree(n) == 0).count(),
            ..NetworkStats::default()
        };
        for edge in &self.edges {
            stats.total_length_m += edge.length_m;
            if edge.is_bike_infrastructure() {
                stats.bike_edges += 1;
            }
            *stats.by_infrastructure.entry(edge.infrastructure).or_default() += 1;
        }
        stats
    }
}

/// Offsets and edge ids grouped by `key`, in edge id order within a group.
fn csr(
    node_count: usize,
    edges: &[RoadEdge],
    key: impl Fn(&RoadEdge) -> NodeId,
) -> (Vec<usize>, Vec<EdgeId>) {
    let mut offsets = vec![0; node_count + 1];
    for edge in edges {
        offsets[key(edge) + 1] += 1;
    }
    for i in 0..node_count {
        offsets[i + 1] += offsets[i];
    }
    let mut cursor = offsets.clone();
    let mut ids = vec![0; edges.len()];
    for edge in edges {
        let slot = &mut cursor[key(edge)];
        ids[*slot] = edge.id;
        *slot += 1;
    }
    (offsets, ids)
}

#[cfg(test)]
mod tests {
    use saferoute_network_models::{BikeInfrastructure, InfrastructureQuality};

    use super::*;

    fn node(id: NodeId, lat: f64, lon: f64) -> RoadNode {
        RoadNode { id, lat, lon }
    }

    fn edge(id: EdgeId, from: NodeId, to: NodeId, length_m: f64) -> RoadEdge {
        RoadEdge {
            id,
            from,
            to,
            length_m,
            base_travel_time_s: length_m / 5.0,
            infrastructure: BikeInfrastructure::None,
            quality: InfrastructureQuality::None,
            highway: "residential".to_string(),
            name: None,
        }
    }

    fn snapshot() -> NetworkSnapshot {
        NetworkSnapshot {
            nodes: vec![
                node(0, 40.000, -86.000),
                node(1, 40.001, -86.000),
                node(2, 40.001, -86.001),
                node(3, 40.010, -86.010),
            ],
            edges: vec![
                edge(0, 0, 1, 111.0),
                edge(1, 1, 0, 111.0),
                edge(2, 1, 2, 85.0),
                edge(3, 2, 2, 10.0),
                edge(4, 2, 1, 0.0),
            ],
        }
    }

    #[test]
    fn drops_self_loops_and_zero_length_edges() {
        let (graph, dropped) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.edges().iter().enumerate().all(|(i, e)| e.id == i));
    }

    #[test]
    fn adjacency_in_both_directions() {
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();
        assert_eq!(graph.outgoing(1), &[1, 2]);
        assert_eq!(graph.incoming(1), &[0]);
        assert_eq!(graph.incoming(2), &[2]);
        assert!(graph.outgoing(2).is_empty());
        assert_eq!(graph.degree(3), 0);
    }

    #[test]
    fn rejects_dangling_edges() {
        let mut snapshot = snapshot();
        snapshot.edges.push(edge(5, 0, 9, 10.0));
        assert!(matches!(
            InfrastructureGraph::from_snapshot(snapshot),
            Err(NetworkError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn nearest_nodes_far_from_the_mean_latitude() {
        // Two clusters at the equator and at 60°N; the index scale is
        // cos(30°) while the true east-west scale at 60°N is cos(60°).
        let snapshot = NetworkSnapshot {
            nodes: vec![
                node(0, 0.0, 10.0),
                node(1, 0.0, 10.001),
                node(2, 60.0, 10.0),
                node(3, 60.0, 10.0072),
            ],
            edges: vec![edge(0, 0, 1, 111.0), edge(1, 2, 3, 400.0)],
        };
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot).unwrap();

        let near = graph.nearest_nodes(60.0, 10.0, 500.0, 5);
        let ids: Vec<_> = near.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [2, 3]);
        assert!((near[1].1 - 400.0).abs() < 5.0, "distance {}", near[1].1);
    }

    #[test]
    fn nearest_nodes_skip_isolated() {
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();

        let near = graph.nearest_nodes(40.0001, -86.0, 500.0, 5);
        assert_eq!(near.first().map(|(id, _)| *id), Some(0));
        assert!(near.windows(2).all(|w| w[0].1 <= w[1].1));

        // Node 3 has no edges and must never be returned.
        let far = graph.nearest_nodes(40.010, -86.010, 50.0, 5);
        assert!(far.is_empty());
    }

    #[test]
    fn components_follow_directed_reachability() {
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();
        let scc = graph.strongly_connected_components();
        // 0 <-> 1 form a cycle; 2 is only reachable from 1; 3 is isolated.
        assert_eq!(scc[0], scc[1]);
        assert_ne!(scc[1], scc[2]);
        assert_ne!(scc[3], scc[0]);
        assert_ne!(scc[3], scc[2]);
    }

    #[test]
    fn retain_edges_renumbers() {
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();
        let trimmed = graph.retain_edges(|e| e.from != 1);
        assert_eq!(trimmed.edge_count(), 1);
        assert!(trimmed.outgoing(1).is_empty());
        assert_eq!(trimmed.edge(0).from, 0);
    }

    #[test]
    fn stats_count_isolated_nodes() {
        let (graph, _) = InfrastructureGraph::from_snapshot(snapshot()).unwrap();
        let stats = graph.stats();
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.isolated_nodes, 1);
        assert_eq!(stats.bike_edges, 0);
        assert!((stats.total_length_m - 307.0).abs() < 1e-9);
    }
}
