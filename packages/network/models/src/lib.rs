#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road network data model.
//!
//! The routable network is a directed multigraph of [`RoadNode`]s joined by
//! [`RoadEdge`]s. Each edge carries its length, a base cycling travel time
//! and the bicycle infrastructure it offers, classified into a
//! [`BikeInfrastructure`] kind and an ordinal [`InfrastructureQuality`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Dense node index into [`NetworkSnapshot::nodes`].
pub type NodeId = usize;

/// Dense edge index into [`NetworkSnapshot::edges`].
pub type EdgeId = usize;

/// A routable intersection or shape point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    /// Dense id; equal to the node's index.
    pub id: NodeId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// Kind of bicycle infrastructure on an edge.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BikeInfrastructure {
    /// Ordinary road or footway.
    #[default]
    None,
    /// Sharrows or a shared bus lane.
    SharedLane,
    /// Painted on-street lane.
    PaintedLane,
    /// Multi-use path open to cyclists.
    SharedPath,
    /// Physically separated cycle track or cycleway.
    DedicatedTrack,
}

impl BikeInfrastructure {
    /// Whether the edge counts as bicycle infrastructure.
    #[must_use]
    pub const fn is_infrastructure(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Ordinal quality of an edge's bicycle infrastructure.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InfrastructureQuality {
    /// No infrastructure.
    #[default]
    None,
    /// Shared or degraded infrastructure.
    Low,
    /// Painted lanes and shared paths.
    Medium,
    /// Separated or designated cycle facilities.
    High,
}

impl InfrastructureQuality {
    /// Weight of the quality in the bike bonus: 0, 1/3, 2/3 or 1.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 1.0 / 3.0,
            Self::Medium => 2.0 / 3.0,
            Self::High => 1.0,
        }
    }

    /// One step lower, stopping at [`Self::Low`]. [`Self::None`] stays
    /// `None`.
    #[must_use]
    pub const fn downgrade(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Low | Self::Medium => Self::Low,
            Self::High => Self::Medium,
        }
    }

    /// All levels in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::None, Self::Low, Self::Medium, Self::High]
    }
}

/// A directed traversable segment between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    /// Dense id; equal to the edge's index.
    pub id: EdgeId,
    /// Tail node.
    pub from: NodeId,
    /// Head node.
    pub to: NodeId,
    /// Great-circle length in metres. Always positive.
    pub length_m: f64,
    /// Cycling time at the class speed, in seconds.
    pub base_travel_time_s: f64,
    /// Infrastructure kind.
    pub infrastructure: BikeInfrastructure,
    /// Infrastructure quality; `None` exactly when `infrastructure` is.
    pub quality: InfrastructureQuality,
    /// OSM `highway` class of the source way.
    pub highway: String,
    /// Street name, when tagged.
    pub name: Option<String>,
}

impl RoadEdge {
    /// Whether the edge carries bicycle infrastructure.
    #[must_use]
    pub const fn is_bike_infrastructure(&self) -> bool {
        self.infrastructure.is_infrastructure()
    }
}

/// A way as read from a network source: ordered `(lat, lon)` coordinates
/// plus OSM-style tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWay {
    /// Source id (OSM way id, or feature index).
    pub id: i64,
    /// Tag key to value.
    pub tags: BTreeMap<String, String>,
    /// Ordered `(lat, lon)` vertices.
    pub coords: Vec<(f64, f64)>,
}

impl RawWay {
    /// Tag value, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Plain node and edge lists, used for caching and for building graphs
/// from prebuilt data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Nodes, indexed by id.
    pub nodes: Vec<RoadNode>,
    /// Edges, indexed by id.
    pub edges: Vec<RoadEdge>,
}

/// Summary of a built network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    /// Node count.
    pub nodes: usize,
    /// Directed edge count.
    pub edges: usize,
    /// Edges carrying bicycle infrastructure.
    pub bike_edges: usize,
    /// Nodes with no incident edges.
    pub isolated_nodes: usize,
    /// Sum of edge lengths in metres.
    pub total_length_m: f64,
    /// Edges per infrastructure kind.
    pub by_infrastructure: BTreeMap<BikeInfrastructure, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_ordered() {
        let all = InfrastructureQuality::all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].factor() < pair[1].factor());
        }
        assert!((InfrastructureQuality::High.factor() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn downgrade_stops_at_low() {
        assert_eq!(
            InfrastructureQuality::High.downgrade(),
            InfrastructureQuality::Medium
        );
        assert_eq!(
            InfrastructureQuality::Medium.downgrade(),
            InfrastructureQuality::Low
        );
        assert_eq!(
            InfrastructureQuality::Low.downgrade(),
            InfrastructureQuality::Low
        );
        assert_eq!(
            InfrastructureQuality::None.downgrade(),
            InfrastructureQuality::None
        );
    }

    #[test]
    fn infrastructure_names() {
        assert_eq!(BikeInfrastructure::PaintedLane.to_string(), "PAINTED_LANE");
        assert_eq!(
            "DEDICATED_TRACK".parse::<BikeInfrastructure>().unwrap(),
            BikeInfrastructure::DedicatedTrack
        );
        assert!(!BikeInfrastructure::None.is_infrastructure());
        assert_eq!(
            serde_json::to_string(&InfrastructureQuality::Medium).unwrap(),
            "\"MEDIUM\""
        );
    }
}
