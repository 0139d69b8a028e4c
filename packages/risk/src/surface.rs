//! Per-city risk grid.

use saferoute_source_models::{BoundingBox, IncidentRecord};
use serde::Serialize;

use crate::kernel::{gaussian_kernel, smooth};
use crate::{METERS_PER_DEGREE, MAX_CELLS, RiskError, RiskLookup, SurfaceConfig};

/// Immutable, normalized risk grid over one city's bounding box.
///
/// Values are stored at cell centres and interpolated bilinearly, so risk
/// varies continuously between cells.
#[derive(Debug, Clone)]
pub struct CrimeSurface {
    city: String,
    bbox: BoundingBox,
    rows: usize,
    cols: usize,
    cell_lat_deg: f64,
    cell_lon_deg: f64,
    values: Vec<f64>,
    incidents: usize,
    skipped: usize,
}

/// Summary of a built surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceStats {
    /// City id.
    pub city: String,
    /// Grid rows (south to north).
    pub rows: usize,
    /// Grid columns (west to east).
    pub cols: usize,
    /// Incidents binned into the grid.
    pub incidents: usize,
    /// Incidents ignored because they fell outside the bounding box.
    pub skipped: usize,
    /// Mean risk over all cells.
    pub mean_risk: f64,
    /// `(lat, lon)` of the cell with the highest risk, if any cell is
    /// non-zero.
    pub hotspot: Option<(f64, f64)>,
}

impl CrimeSurface {
    /// Builds the surface for `city` from its incidents.
    ///
    /// An empty record set yields a uniform zero surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or bounding box is invalid, or
    /// the grid would exceed [`MAX_CELLS`].
    pub fn build(
        city: &str,
        bbox: BoundingBox,
        records: &[IncidentRecord],
        config: &SurfaceConfig,
    ) -> Result<Self, RiskError> {
        config.validate()?;
        let mut surface = Self::allocate(city, bbox, config)?;

        let weights = incident_weights(records, config);
        let mut density = vec![0.0; surface.rows * surface.cols];
        for (record, weight) in records.iter().zip(weights) {
            match surface.cell_of(record.latitude, record.longitude) {
                Some(index) => {
                    density[index] += weight;
                    surface.incidents += 1;
                }
                None => surface.skipped += 1,
            }
        }
        if surface.skipped > 0 {
            log::warn!(
                "{city}: {} incident(s) outside the bounding box were ignored",
                surface.skipped
            );
        }

        let kernel = gaussian_kernel(config.bandwidth_m / config.cell_size_m);
        let smoothed = smooth(&density, surface.rows, surface.cols, &kernel);

        let max = smoothed.iter().copied().fold(0.0_f64, f64::max);
        surface.values = if max > 0.0 {
            smoothed.into_iter().map(|v| (v / max).clamp(0.0, 1.0)).collect()
        } else {
            smoothed.into_iter().map(|_| 0.0).collect()
        };

        log::info!(
            "{city}: risk surface {}x{} cells from {} incident(s)",
            surface.rows,
            surface.cols,
            surface.incidents
        );
        Ok(surface)
    }

    /// A surface with zero risk everywhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or bounding box is invalid.
    pub fn empty(city: &str, bbox: BoundingBox, config: &SurfaceConfig) -> Result<Self, RiskError> {
        Self::build(city, bbox, &[], config)
    }

    fn allocate(city: &str, bbox: BoundingBox, config: &SurfaceConfig) -> Result<Self, RiskError> {
        if !bbox.is_valid() {
            return Err(RiskError::InvalidBoundingBox {
                city: city.to_string(),
            });
        }
        let (center_lat, _) = bbox.center();
        let cell_lat_deg = config.cell_size_m / METERS_PER_DEGREE;
        let cell_lon_deg =
            config.cell_size_m / (METERS_PER_DEGREE * center_lat.to_radians().cos().max(0.01));

        let rows = cells_along(bbox.north - bbox.south, cell_lat_deg);
        let cols = cells_along(bbox.east - bbox.west, cell_lon_deg);
        let cells = rows.saturating_mul(cols);
        if cells > MAX_CELLS {
            return Err(RiskError::GridTooLarge {
                city: city.to_string(),
                cells,
            });
        }

        Ok(Self {
            city: city.to_string(),
            bbox,
            rows,
            cols,
            cell_lat_deg,
            cell_lon_deg,
            values: Vec::new(),
            incidents: 0,
            skipped: 0,
        })
    }

    /// Row-major index of the cell containing the point, or `None` outside
    /// the box.
    fn cell_of(&self, lat: f64, lon: f64) -> Option<usize> {
        if !self.bbox.contains(lat, lon) {
            return None;
        }
        let row = grid_index((lat - self.bbox.south) / self.cell_lat_deg, self.rows);
        let col = grid_index((lon - self.bbox.west) / self.cell_lon_deg, self.cols);
        Some(row * self.cols + col)
    }

    /// City id.
    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }

    /// Bounding box the grid covers.
    #[must_use]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Grid dimensions as `(rows, cols)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Normalized value of one cell.
    #[must_use]
    pub fn cell_value(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.values[row * self.cols + col])
    }

    /// Summary for reporting.
    #[must_use]
    pub fn stats(&self) -> SurfaceStats {
        #[allow(clippy::cast_precision_loss)]
        let mean_risk = if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        };
        let hotspot = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(index, _)| self.cell_center(index / self.cols, index % self.cols));

        SurfaceStats {
            city: self.city.clone(),
            rows: self.rows,
            cols: self.cols,
            incidents: self.incidents,
            skipped: self.skipped,
            mean_risk,
            hotspot,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            (row as f64 + 0.5).mul_add(self.cell_lat_deg, self.bbox.south),
            (col as f64 + 0.5).mul_add(self.cell_lon_deg, self.bbox.west),
        )
    }
}

impl RiskLookup for CrimeSurface {
    #[allow(clippy::cast_precision_loss)]
    fn risk(&self, lat: f64, lon: f64) -> f64 {
        if self.values.is_empty() || !lat.is_finite() || !lon.is_finite() {
            return 0.0;
        }
        let (lat, lon) = self.bbox.clamp(lat, lon);

        let (r0, r1, tr) = bracket((lat - self.bbox.south) / self.cell_lat_deg, self.rows);
        let (c0, c1, tc) = bracket((lon - self.bbox.west) / self.cell_lon_deg, self.cols);

        let at = |r: usize, c: usize| self.values[r * self.cols + c];
        let south = (1.0 - tc).mul_add(at(r0, c0), tc * at(r0, c1));
        let north = (1.0 - tc).mul_add(at(r1, c0), tc * at(r1, c1));
        (1.0 - tr).mul_add(south, tr * north).clamp(0.0, 1.0)
    }
}

/// Number of cells needed to cover `extent` degrees.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cells_along(extent: f64, cell: f64) -> usize {
    ((extent / cell).ceil() as usize).max(1)
}

/// Cell index for a fractional grid position, clamped to the grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grid_index(position: f64, len: usize) -> usize {
    (position.max(0.0).floor() as usize).min(len - 1)
}

/// The two cell-centre indices bracketing a fractional grid position and the
/// interpolation weight of the upper one.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bracket(position: f64, len: usize) -> (usize, usize, f64) {
    let centred = (position - 0.5).clamp(0.0, (len - 1) as f64);
    let lower = centred.floor() as usize;
    let upper = (lower + 1).min(len - 1);
    (lower, upper, centred - lower as f64)
}

/// Severity weights with optional recency decay relative to the newest
/// dated incident.
fn incident_weights(records: &[IncidentRecord], config: &SurfaceConfig) -> Vec<f64> {
    let newest = records.iter().filter_map(|r| r.occurred_at).max();

    records
        .iter()
        .map(|record| {
            let base = config.severity_weights.weight(record.severity());
            match (config.recency_half_life_days, newest, record.occurred_at) {
                (Some(half_life), Some(newest), Some(occurred)) => {
                    #[allow(clippy::cast_precision_loss)]
                    let age_days = (newest - occurred).num_seconds() as f64 / 86_400.0;
                    base * 0.5_f64.powf(age_days / half_life)
                }
                _ => base,
            }
        })
        .collect()
}
