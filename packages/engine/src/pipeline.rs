//! Startup pipeline: crime feeds and road network in, validated snapshot out.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use saferoute_network::{
    LoadedNetwork, LocationSource, NetworkLoadOptions, TagClassifier, load_network,
};
use saferoute_risk::{RiskField, SurfaceInput};
use saferoute_source::progress::ProgressCallback;
use saferoute_source::registry::city_by_id;
use saferoute_source::{CityIncidents, LoadOptions, load_city};
use saferoute_source_models::BoundingBox;

use crate::{EngineConfig, EngineError, Snapshot};

/// Runs every startup stage and returns the snapshot to publish.
///
/// Stages run one after another; within a stage, crime feeds are fetched
/// concurrently and surfaces, edge features and calibration trials are
/// computed on the rayon pool.
///
/// # Errors
///
/// Returns the first fatal error: an unknown city, a feed or network that is
/// unavailable with no cache, an invalid configuration, or graphs that fail
/// validation.
pub async fn build_snapshot(
    config: &EngineConfig,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Snapshot, EngineError> {
    let started = Instant::now();

    progress.set_total(config.crime.len() as u64 + 2);
    progress.set_message("Loading crime feeds".to_string());
    let cities = ingest(config, &progress).await?;

    progress.set_message("Loading road network".to_string());
    let source = LocationSource::new(config.network.location.clone(), config.network.format)?;
    let options = NetworkLoadOptions {
        retry: config.retry.clone(),
        cache_path: config.network.cache_path.clone(),
    };
    let LoadedNetwork {
        graph,
        report,
        from_cache,
    } = load_network(&source, &TagClassifier, &options).await?;
    progress.inc(1);

    progress.set_message("Building routing graphs".to_string());
    let config = config.clone();
    let mut snapshot = tokio::task::spawn_blocking(move || {
        let inputs = cities
            .iter()
            .map(|(bbox, incidents)| SurfaceInput {
                city: &incidents.city,
                bbox: *bbox,
                records: &incidents.records,
            })
            .collect::<Vec<_>>();
        let field = RiskField::build(&inputs, &config.risk)?;

        let mut snapshot = Snapshot::assemble(graph, &field, &config)?;
        snapshot.surfaces = field.stats();
        snapshot.ingest = cities.into_iter().map(|(_, c)| c.report).collect();
        Ok::<_, EngineError>(snapshot)
    })
    .await??;
    progress.inc(1);

    snapshot.network_report = report;
    snapshot.network_from_cache = from_cache;
    snapshot.build_time_ms = started.elapsed().as_secs_f64() * 1_000.0;

    let stats = snapshot.graphs.network().stats();
    progress.finish(format!(
        "Built {} nodes, {} edges in {:.1}s",
        stats.nodes,
        stats.edges,
        snapshot.build_time_ms / 1_000.0
    ));
    log::info!(
        "Snapshot ready: {} nodes, {} edges ({} bike), {} city feed(s), {:.0}ms",
        stats.nodes,
        stats.edges,
        stats.bike_edges,
        snapshot.ingest.len(),
        snapshot.build_time_ms
    );
    Ok(snapshot)
}

/// Fetches and normalizes every configured feed, in configuration order.
/// Feeds naming the same city are merged into one entry so each city gets a
/// single surface built from all of its incidents.
async fn ingest(
    config: &EngineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<(BoundingBox, CityIncidents)>, EngineError> {
    let options = LoadOptions {
        retry: config.retry.clone(),
        cache_dir: config.crime_cache_dir.clone(),
    };

    let loaded: Vec<(BoundingBox, CityIncidents)> = stream::iter(config.crime.iter().map(|feed| {
        let options = &options;
        async move {
            let definition = city_by_id(&feed.city)?;
            let incidents = load_city(&definition, &feed.location, options).await?;
            progress.inc(1);
            Ok::<_, EngineError>((definition.bbox, incidents))
        }
    }))
    .buffered(config.effective_concurrency())
    .try_collect()
    .await?;

    Ok(merge_by_city(loaded))
}

fn merge_by_city(
    loaded: Vec<(BoundingBox, CityIncidents)>,
) -> Vec<(BoundingBox, CityIncidents)> {
    let mut merged: Vec<(BoundingBox, CityIncidents)> = Vec::with_capacity(loaded.len());
    for (bbox, incidents) in loaded {
        if let Some((_, existing)) = merged.iter_mut().find(|(_, c)| c.city == incidents.city) {
            log::info!(
                "{}: merging another feed ({} records)",
                incidents.city,
                incidents.records.len()
            );
            existing.absorb(incidents);
        } else {
            merged.push((bbox, incidents));
        }
    }
    merged
}
