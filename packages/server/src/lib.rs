#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for saferoute.
//!
//! Serves route queries, mode descriptions, statistics and health under
//! `/api`. The engine is built before the server binds; requests only read
//! its published snapshot.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use saferoute_engine::Engine;

/// Shared application state.
pub struct AppState {
    /// Routing engine holding the published snapshot.
    pub engine: Arc<Engine>,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/modes", web::get().to(handlers::modes))
            .route("/stats", web::get().to(handlers::stats))
            .route("/route", web::post().to(handlers::route))
            .route("/route/compare", web::post().to(handlers::compare)),
    );
}

/// Bind address and port from `BIND_ADDR` and `PORT`, defaulting to
/// `127.0.0.1:8080`.
#[must_use]
pub fn bind_from_env() -> (String, u16) {
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    (bind_addr, port)
}

/// Serves `engine` until the server stops. The caller provides the async
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
pub async fn run_server(engine: Arc<Engine>, bind_addr: String, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(AppState { engine });

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use saferoute_engine::{EngineConfig, Snapshot};
    use saferoute_network::{TagClassifier, build_network};
    use saferoute_network_models::RawWay;
    use saferoute_risk::RiskLookup;
    use saferoute_route_models::CalibratedCoefficients;
    use saferoute_server_models::{ApiCompareResponse, ApiHealth, ApiModes, ApiRoute};

    use super::*;

    struct NoRisk;

    impl RiskLookup for NoRisk {
        fn risk(&self, _lat: f64, _lon: f64) -> f64 {
            0.0
        }
    }

    /// A 3×3 two-way grid at 0.001° spacing.
    fn engine() -> Arc<Engine> {
        let tags = || {
            [("highway".to_string(), "residential".to_string())]
                .into_iter()
                .collect()
        };
        let mut ways = Vec::new();
        for i in 0..3 {
            let offset = 0.001 * f64::from(i);
            ways.push(RawWay {
                id: i64::from(i),
                tags: tags(),
                coords: (0..3)
                    .map(|j| (40.42 + offset, 0.001_f64.mul_add(f64::from(j), -86.92)))
                    .collect(),
            });
            ways.push(RawWay {
                id: 10 + i64::from(i),
                tags: tags(),
                coords: (0..3)
                    .map(|j| (0.001_f64.mul_add(f64::from(j), 40.42), -86.92 + offset))
                    .collect(),
            });
        }
        let network = build_network(ways, &TagClassifier).0;
        let mut config = EngineConfig::default();
        config.calibration.fixed = Some(CalibratedCoefficients::default());
        let snapshot = Snapshot::assemble(network, &NoRisk, &config).unwrap();
        Arc::new(Engine::new(snapshot, config.search))
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState { engine: engine() }))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_and_modes() {
        let app = app!();

        let request = test::TestRequest::get().uri("/api/health").to_request();
        let health: ApiHealth = test::call_and_read_body_json(&app, request).await;
        assert!(health.healthy);

        let request = test::TestRequest::get().uri("/api/modes").to_request();
        let modes: ApiModes = test::call_and_read_body_json(&app, request).await;
        assert_eq!(modes.modes.len(), 4);
    }

    #[actix_web::test]
    async fn routes_between_grid_corners() {
        let app = app!();
        let request = test::TestRequest::post()
            .uri("/api/route")
            .set_json(serde_json::json!({
                "startLat": 40.42, "startLon": -86.92,
                "endLat": 40.422, "endLon": -86.918,
                "routeType": "fastest", "algorithm": "astar"
            }))
            .to_request();
        let route: ApiRoute = test::call_and_read_body_json(&app, request).await;
        assert!(route.error.is_none());
        assert_eq!(route.node_count, 5);
        assert!(route.distance_meters > 0.0);
    }

    #[actix_web::test]
    async fn compare_returns_every_variant() {
        let app = app!();
        let request = test::TestRequest::post()
            .uri("/api/route/compare")
            .set_json(serde_json::json!({
                "startLat": 40.42, "startLon": -86.92,
                "endLat": 40.422, "endLon": -86.92
            }))
            .to_request();
        let response: ApiCompareResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response.len(), 4);
        assert!(response.values().all(|r| r.error.is_none()));
    }

    #[actix_web::test]
    async fn invalid_requests_get_a_400() {
        let app = app!();
        let request = test::TestRequest::post()
            .uri("/api/route")
            .set_json(serde_json::json!({
                "startLat": 95.0, "startLon": -86.92,
                "endLat": 40.422, "endLon": -86.92,
                "routeType": "fastest"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/api/route")
            .set_json(serde_json::json!({
                "startLat": 40.42, "startLon": -86.92,
                "endLat": 40.422, "endLon": -86.92,
                "routeType": "scenic"
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn out_of_area_queries_report_the_error_in_the_body() {
        let app = app!();
        let request = test::TestRequest::post()
            .uri("/api/route")
            .set_json(serde_json::json!({
                "startLat": 40.42, "startLon": -86.92,
                "endLat": 41.0, "endLon": -86.92,
                "routeType": "safe"
            }))
            .to_request();
        let route: ApiRoute = test::call_and_read_body_json(&app, request).await;
        assert_eq!(
            route.error.map(|e| e.code()),
            Some("OUT_OF_SERVICE_AREA")
        );
        assert!(route.route.is_empty());
    }
}
