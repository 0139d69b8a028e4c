//! Multi-city risk lookup.

use rayon::prelude::*;
use saferoute_source_models::{BoundingBox, IncidentRecord};

use crate::{CrimeSurface, RiskError, RiskLookup, SurfaceConfig, SurfaceStats};

/// One city's input to [`RiskField::build`].
#[derive(Debug, Clone, Copy)]
pub struct SurfaceInput<'a> {
    /// City id.
    pub city: &'a str,
    /// Declared service area.
    pub bbox: BoundingBox,
    /// Normalized incidents for the city.
    pub records: &'a [IncidentRecord],
}

/// The set of per-city surfaces.
///
/// Lookups use the surface whose box contains the point; points outside
/// every box use the nearest box, clamped to its boundary.
#[derive(Debug, Clone, Default)]
pub struct RiskField {
    surfaces: Vec<CrimeSurface>,
}

impl RiskField {
    /// Wraps prebuilt surfaces. Order decides which surface wins when boxes
    /// overlap, so surfaces are sorted by city id.
    #[must_use]
    pub fn new(mut surfaces: Vec<CrimeSurface>) -> Self {
        surfaces.sort_by(|a, b| a.city().cmp(b.city()));
        Self { surfaces }
    }

    /// Builds every city's surface in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered, in city order.
    pub fn build(inputs: &[SurfaceInput<'_>], config: &SurfaceConfig) -> Result<Self, RiskError> {
        let surfaces = inputs
            .par_iter()
            .map(|input| CrimeSurface::build(input.city, input.bbox, input.records, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(surfaces))
    }

    /// All surfaces, ordered by city id.
    #[must_use]
    pub fn surfaces(&self) -> &[CrimeSurface] {
        &self.surfaces
    }

    /// Per-city summaries.
    #[must_use]
    pub fn stats(&self) -> Vec<SurfaceStats> {
        self.surfaces.iter().map(CrimeSurface::stats).collect()
    }

    /// The surface responsible for `(lat, lon)`.
    #[must_use]
    pub fn surface_for(&self, lat: f64, lon: f64) -> Option<&CrimeSurface> {
        self.surfaces
            .iter()
            .find(|s| s.bbox().contains(lat, lon))
            .or_else(|| {
                self.surfaces
                    .iter()
                    .map(|s| (s, box_distance_sq(s.bbox(), lat, lon)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(s, _)| s)
            })
    }
}

impl RiskLookup for RiskField {
    fn risk(&self, lat: f64, lon: f64) -> f64 {
        self.surface_for(lat, lon).map_or(0.0, |s| s.risk(lat, lon))
    }
}

/// Squared equirectangular distance (in degrees of latitude) from a point to
/// the nearest point of `bbox`.
fn box_distance_sq(bbox: &BoundingBox, lat: f64, lon: f64) -> f64 {
    let (clat, clon) = bbox.clamp(lat, lon);
    let dlat = lat - clat;
    let dlon = (lon - clon) * lat.to_radians().cos();
    dlat.mul_add(dlat, dlon * dlon)
}
