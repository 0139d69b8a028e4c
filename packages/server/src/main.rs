#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone saferoute API server.
//!
//! Reads the engine configuration from `SAFEROUTE_CONFIG` (default
//! `saferoute.toml`), builds the routing snapshot, then serves on
//! `BIND_ADDR`:`PORT`.

use std::path::PathBuf;
use std::sync::Arc;

use saferoute_engine::{Engine, EngineConfig};
use saferoute_source::progress::null_progress;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config_path = std::env::var("SAFEROUTE_CONFIG")
        .map_or_else(|_| PathBuf::from("saferoute.toml"), PathBuf::from);
    let config = EngineConfig::load(&config_path).await?;

    log::info!("Building routing snapshot...");
    let engine = Arc::new(Engine::build(&config, null_progress()).await?);

    let (bind_addr, port) = saferoute_server::bind_from_env();
    saferoute_server::run_server(engine, bind_addr, port).await?;
    Ok(())
}
