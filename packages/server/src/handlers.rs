//! HTTP handler functions for the saferoute API.

use actix_web::{HttpResponse, web};
use saferoute_engine::Engine;
use saferoute_route_models::RouteResult;
use saferoute_server_models::{
    ApiCompareRequest, ApiCompareResponse, ApiError, ApiHealth, ApiModes, ApiRoute,
    ApiRouteRequest, RouteQuery,
};
use tokio_util::sync::CancellationToken;

use crate::AppState;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.engine.snapshot();
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        snapshot_built_at: snapshot.built_at,
        warnings: snapshot
            .calibration
            .incomplete
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

/// `GET /api/modes`
pub async fn modes() -> HttpResponse {
    HttpResponse::Ok().json(ApiModes {
        modes: Engine::modes(),
    })
}

/// `GET /api/stats`
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.engine.stats())
}

/// `POST /api/route`
///
/// Query failures (out of service area, no route, timeouts) are part of the
/// 200 response body; only malformed requests get a 400.
pub async fn route(state: web::Data<AppState>, body: web::Json<ApiRouteRequest>) -> HttpResponse {
    let query = match body.validate() {
        Ok(query) => query,
        Err(e) => return HttpResponse::BadRequest().json(ApiError::from(e)),
    };

    match run(&state, query).await {
        Ok(mut results) => match results.pop() {
            Some(result) => HttpResponse::Ok().json(ApiRoute::from(result)),
            None => internal_error("route search returned no result"),
        },
        Err(e) => internal_error(&e.to_string()),
    }
}

/// `POST /api/route/compare`
pub async fn compare(
    state: web::Data<AppState>,
    body: web::Json<ApiCompareRequest>,
) -> HttpResponse {
    let query = match body.validate() {
        Ok(query) => query,
        Err(e) => return HttpResponse::BadRequest().json(ApiError::from(e)),
    };

    match run(&state, query).await {
        Ok(results) => {
            let response: ApiCompareResponse = results
                .into_iter()
                .map(|result| (result.variant, ApiRoute::from(result)))
                .collect();
            HttpResponse::Ok().json(response)
        }
        Err(e) => internal_error(&e.to_string()),
    }
}

/// Runs the query on the blocking pool. If the client goes away the handler
/// future is dropped, which drops the guard and cancels the search.
async fn run(
    state: &web::Data<AppState>,
    query: RouteQuery,
) -> Result<Vec<RouteResult>, actix_web::error::BlockingError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let engine = state.engine.clone();

    web::block(move || {
        engine.compare(
            query.origin,
            query.destination,
            &query.variants,
            query.algorithm,
            &cancel,
        )
    })
    .await
}

fn internal_error(message: &str) -> HttpResponse {
    log::error!("Route query failed: {message}");
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Route query failed"
    }))
}
