#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for saferoute.
//!
//! Every subcommand that needs routing data builds a snapshot from the
//! engine configuration first, drawing pipeline progress with
//! [`saferoute_cli_utils::IndicatifProgress`]. Results print as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use saferoute_cli_utils::{IndicatifProgress, MultiProgress};
use saferoute_engine::{Engine, EngineConfig};
use saferoute_route_models::{Algorithm, Coordinate, Variant};
use saferoute_server_models::{ApiCompareResponse, ApiModes, ApiRoute};
use saferoute_source::registry::all_cities;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "saferoute", about = "Crime-aware walking and cycling routes")]
struct Cli {
    /// Engine configuration file
    #[arg(
        long,
        global = true,
        env = "SAFEROUTE_CONFIG",
        default_value = "saferoute.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the routing snapshot and print its statistics
    Build,
    /// Find one route
    Route {
        /// Origin as `lat,lon`
        #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
        origin: Coordinate,
        /// Destination as `lat,lon`
        #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
        destination: Coordinate,
        /// `fastest`, `safe`, `bike` or `safe_bike`
        #[arg(long, default_value = "safe", value_parser = parse_variant)]
        variant: Variant,
        /// `dijkstra` or `astar`
        #[arg(long, default_value = "dijkstra", value_parser = parse_algorithm)]
        algorithm: Algorithm,
    },
    /// Run several variants for the same endpoints
    Compare {
        /// Origin as `lat,lon`
        #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
        origin: Coordinate,
        /// Destination as `lat,lon`
        #[arg(value_parser = parse_coordinate, allow_hyphen_values = true)]
        destination: Coordinate,
        /// Comma-separated variants (default: all four)
        #[arg(long, value_delimiter = ',', value_parser = parse_variant)]
        variants: Vec<Variant>,
        /// `dijkstra` or `astar`
        #[arg(long, default_value = "dijkstra", value_parser = parse_algorithm)]
        algorithm: Algorithm,
    },
    /// List the route variants
    Modes,
    /// List the built-in crime feeds
    Cities,
    /// Build the snapshot and serve the HTTP API on `BIND_ADDR`:`PORT`
    Serve,
}

fn parse_coordinate(s: &str) -> Result<Coordinate, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'lat,lon', got '{s}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    let coordinate = Coordinate::new(lat, lon);
    coordinate.validate().map_err(|e| e.to_string())?;
    Ok(coordinate)
}

fn parse_variant(s: &str) -> Result<Variant, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("unknown variant '{s}' (expected fastest, safe, bike or safe_bike)"))
}

fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("unknown algorithm '{s}' (expected dijkstra or astar)"))
}

async fn build_engine(
    config_path: &Path,
    multi: &MultiProgress,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let config = EngineConfig::load(config_path).await?;
    let progress = IndicatifProgress::stages(multi, "Building snapshot");
    let engine = Engine::build(&config, progress).await?;

    let snapshot = engine.snapshot();
    if let Some(incomplete) = &snapshot.calibration.incomplete {
        log::warn!("{incomplete}");
    }
    Ok(engine)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = saferoute_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build => {
            let engine = build_engine(&cli.config, &multi).await?;
            print_json(&engine.stats())?;
        }
        Commands::Route {
            origin,
            destination,
            variant,
            algorithm,
        } => {
            let engine = build_engine(&cli.config, &multi).await?;
            let result = engine.find_route(origin, destination, variant, algorithm);
            if let Some(error) = &result.error {
                log::warn!("{variant}: {error}");
            }
            print_json(&ApiRoute::from(result))?;
        }
        Commands::Compare {
            origin,
            destination,
            variants,
            algorithm,
        } => {
            let variants = if variants.is_empty() {
                Variant::all().to_vec()
            } else {
                variants
            };
            let engine = build_engine(&cli.config, &multi).await?;
            let response: ApiCompareResponse = engine
                .compare(
                    origin,
                    destination,
                    &variants,
                    algorithm,
                    &CancellationToken::new(),
                )
                .into_iter()
                .map(|result| (result.variant, ApiRoute::from(result)))
                .collect();
            print_json(&response)?;
        }
        Commands::Modes => {
            print_json(&ApiModes {
                modes: Engine::modes(),
            })?;
        }
        Commands::Cities => {
            for city in all_cities() {
                println!(
                    "{:<16} {}, {}  [{:.4}, {:.4}, {:.4}, {:.4}]",
                    city.id,
                    city.name,
                    city.state,
                    city.bbox.west,
                    city.bbox.south,
                    city.bbox.east,
                    city.bbox.north,
                );
            }
        }
        Commands::Serve => {
            let engine = Arc::new(build_engine(&cli.config, &multi).await?);
            let (bind_addr, port) = saferoute_server::bind_from_env();
            // actix-web needs its own system runtime rather than a nested
            // tokio one.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new()
                    .block_on(saferoute_server::run_server(engine, bind_addr, port))
            })
            .await??;
        }
    }

    Ok(())
}
