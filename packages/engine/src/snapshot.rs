//! The immutable unit the engine publishes.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use saferoute_calibrate::{CalibrationReport, WeightCalibrator, snap_pairs};
use saferoute_graph::{GraphBuilder, RoutingGraphs, ValidationReport};
use saferoute_network::{BuildReport, InfrastructureGraph};
use saferoute_network_models::NetworkStats;
use saferoute_risk::{RiskLookup, SurfaceStats};
use saferoute_route_models::CalibratedCoefficients;
use saferoute_source_models::IngestReport;
use serde::Serialize;

use crate::{EngineConfig, EngineError};

/// Built graphs plus everything reported about how they were built.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub graphs: RoutingGraphs,
    pub calibration: CalibrationReport,
    pub validation: ValidationReport,
    pub network_report: BuildReport,
    pub network_from_cache: bool,
    pub ingest: Vec<IngestReport>,
    pub surfaces: Vec<SurfaceStats>,
    pub built_at: DateTime<Utc>,
    pub build_time_ms: f64,
}

impl Snapshot {
    /// Samples risk, calibrates and builds the validated variant graphs for
    /// an already loaded network. Ingestion details are left empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Graph`] or [`EngineError::Calibration`] if the
    /// graphs cannot be built or fail validation.
    pub fn assemble(
        network: InfrastructureGraph,
        risk: &dyn RiskLookup,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let started = Instant::now();
        let builder = GraphBuilder::new(config.graph.clone())?;
        let network = Arc::new(network);
        let features = Arc::new(builder.features(&network, risk));

        let calibrator = WeightCalibrator::new(builder.clone(), config.calibration.clone())?;
        let pairs = snap_pairs(
            &network,
            &config.calibration.pairs,
            config.search.max_snap_distance_m,
        );
        let calibration = calibrator.calibrate(&network, &features, &pairs)?;

        let (graphs, validation) = builder.build(network, features, calibration.coefficients)?;

        Ok(Self {
            graphs,
            calibration,
            validation,
            network_report: BuildReport::default(),
            network_from_cache: false,
            ingest: Vec::new(),
            surfaces: Vec::new(),
            built_at: Utc::now(),
            build_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
        })
    }

    /// Serializable summary.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            network: self.graphs.network().stats(),
            network_report: self.network_report.clone(),
            network_from_cache: self.network_from_cache,
            coefficients: *self.graphs.coefficients(),
            calibration: self.calibration.clone(),
            validation: self.validation,
            ingest: self.ingest.clone(),
            surfaces: self.surfaces.clone(),
            built_at: self.built_at,
            build_time_ms: self.build_time_ms,
        }
    }
}

/// What `GET /api/stats` reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub network: NetworkStats,
    pub network_report: BuildReport,
    pub network_from_cache: bool,
    pub coefficients: CalibratedCoefficients,
    pub calibration: CalibrationReport,
    pub validation: ValidationReport,
    pub ingest: Vec<IngestReport>,
    pub surfaces: Vec<SurfaceStats>,
    pub built_at: DateTime<Utc>,
    pub build_time_ms: f64,
}
