//! Way access rules, bicycle infrastructure classification and class
//! speeds.

use saferoute_network_models::{BikeInfrastructure, InfrastructureQuality, RawWay};
use strum_macros::{AsRefStr, Display, EnumString};

/// Highway classes no pedestrian or cyclist may use.
const EXCLUDED_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "construction",
    "proposed",
    "abandoned",
    "raceway",
    "bus_guideway",
];

/// Surfaces that cost a quality step.
const UNPAVED_SURFACES: &[&str] = &[
    "unpaved",
    "gravel",
    "fine_gravel",
    "pebblestone",
    "dirt",
    "earth",
    "ground",
    "grass",
    "mud",
    "sand",
    "woodchips",
];

/// Tags that describe on-street cycle facilities.
const CYCLEWAY_KEYS: &[&str] = &[
    "cycleway",
    "cycleway:both",
    "cycleway:left",
    "cycleway:right",
];

/// Why a way was not turned into edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum WayDropReason {
    /// No `highway` tag.
    NoHighway,
    /// Motorway-class or otherwise closed to non-motorized traffic.
    ExcludedHighway,
    /// `access`, `foot` and `bicycle` tags forbid use.
    NoAccess,
    /// Fewer than two usable vertices.
    TooShort,
}

/// Directions in which a way may be traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Both ways.
    Both,
    /// Along the vertex order only.
    Forward,
    /// Against the vertex order only.
    Backward,
}

impl Direction {
    /// Whether travel along the vertex order is allowed.
    #[must_use]
    pub const fn forward(self) -> bool {
        matches!(self, Self::Both | Self::Forward)
    }

    /// Whether travel against the vertex order is allowed.
    #[must_use]
    pub const fn backward(self) -> bool {
        matches!(self, Self::Both | Self::Backward)
    }
}

/// Decides whether a way is usable and in which directions.
///
/// # Errors
///
/// Returns the reason the way must be dropped.
pub fn way_access(way: &RawWay) -> Result<Direction, WayDropReason> {
    let highway = way.tag("highway").ok_or(WayDropReason::NoHighway)?;
    if EXCLUDED_HIGHWAYS.contains(&highway) {
        return Err(WayDropReason::ExcludedHighway);
    }

    let foot = way.tag("foot");
    let bicycle = way.tag("bicycle");
    let explicitly_allowed = |value: Option<&str>| {
        matches!(value, Some("yes" | "designated" | "permissive"))
    };
    if matches!(way.tag("access"), Some("no" | "private"))
        && !explicitly_allowed(foot)
        && !explicitly_allowed(bicycle)
    {
        return Err(WayDropReason::NoAccess);
    }
    if foot == Some("no") && matches!(bicycle, Some("no" | "dismount")) {
        return Err(WayDropReason::NoAccess);
    }

    if way.tag("oneway:bicycle") == Some("no") {
        return Ok(Direction::Both);
    }
    Ok(match way.tag("oneway") {
        Some("yes" | "true" | "1") => Direction::Forward,
        Some("-1" | "reverse") => Direction::Backward,
        _ if way.tag("junction") == Some("roundabout") => Direction::Forward,
        _ => Direction::Both,
    })
}

/// Cycling speed for a highway class, in km/h.
#[must_use]
pub fn class_speed_kmh(highway: &str) -> f64 {
    match highway {
        "cycleway" => 20.0,
        "primary" | "primary_link" | "secondary" | "secondary_link" | "tertiary"
        | "tertiary_link" | "residential" | "unclassified" | "road" => 18.0,
        "track" => 12.0,
        _ => 15.0,
    }
}

/// Infrastructure assigned to one way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// Infrastructure kind.
    pub infrastructure: BikeInfrastructure,
    /// Quality; [`InfrastructureQuality::None`] exactly when the kind is
    /// [`BikeInfrastructure::None`].
    pub quality: InfrastructureQuality,
}

impl Classification {
    const NONE: Self = Self {
        infrastructure: BikeInfrastructure::None,
        quality: InfrastructureQuality::None,
    };
}

/// Assigns bicycle infrastructure to ways.
pub trait InfrastructureClassifier: Send + Sync {
    /// Classifies one way from its tags.
    fn classify(&self, way: &RawWay) -> Classification;
}

/// Classifier driven by OSM `highway`, `cycleway*`, `bicycle` and `surface`
/// tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagClassifier;

impl TagClassifier {
    fn base(way: &RawWay) -> Classification {
        let highway = way.tag("highway").unwrap_or_default();
        let cycleway = |wanted: &[&str]| {
            CYCLEWAY_KEYS
                .iter()
                .filter_map(|key| way.tag(key))
                .any(|value| wanted.contains(&value))
        };
        let of = |infrastructure, quality| Classification {
            infrastructure,
            quality,
        };

        if highway == "cycleway" || cycleway(&["track", "separate"]) {
            return of(BikeInfrastructure::DedicatedTrack, InfrastructureQuality::High);
        }
        if cycleway(&["lane"]) {
            return of(BikeInfrastructure::PaintedLane, InfrastructureQuality::Medium);
        }
        if matches!(highway, "path" | "footway" | "pedestrian") {
            match way.tag("bicycle") {
                Some("designated") => {
                    return of(BikeInfrastructure::SharedPath, InfrastructureQuality::High);
                }
                Some("yes" | "permissive") => {
                    return of(BikeInfrastructure::SharedPath, InfrastructureQuality::Medium);
                }
                _ => {}
            }
        }
        if cycleway(&["shared_lane", "share_busway"]) {
            return of(BikeInfrastructure::SharedLane, InfrastructureQuality::Low);
        }
        Classification::NONE
    }
}

impl InfrastructureClassifier for TagClassifier {
    fn classify(&self, way: &RawWay) -> Classification {
        let mut classification = Self::base(way);
        if let Some(surface) = way.tag("surface")
            && UNPAVED_SURFACES.contains(&surface)
        {
            classification.quality = classification.quality.downgrade();
        }
        classification
    }
}
