//! Rewards ledger service library.
//!
//! Points ledger with a single-consumer fulfillment queue. This crate
//! provides the service as a library so that the binary, the CLI and the
//! integration tests share one router and one set of services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use config::{LedgerConfig, StoreBackend};
use db::{MemoryRecordStore, PgRecordStore, RecordStore};
use state::AppState;

/// Open the configured record store.
///
/// # Errors
///
/// Returns `sqlx::Error` if the `PostgreSQL` pool cannot be created.
pub async fn open_store(config: &LedgerConfig) -> Result<Arc<dyn RecordStore>, sqlx::Error> {
    match &config.store {
        StoreBackend::Postgres { database_url } => {
            let pool = db::create_pool(database_url).await?;
            tracing::info!("Database pool created");
            Ok(Arc::new(PgRecordStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; balances are lost on restart");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}

/// Build the full application router, including health checks and the
/// request-id, tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config().cors_origins);

    let router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes(&state))
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }));

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the record store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.ledger().store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::config::FulfillmentMode;

    const KEY: &str = "n7Qx!p2Lk9#vR4tZ8wY1bM6cF3hJ0sD5";

    fn test_app(fulfillment: FulfillmentMode) -> Router {
        let mut config = LedgerConfig::with_defaults(SecretString::from(KEY));
        config.fulfillment = fulfillment;
        app(AppState::new(config, Arc::new(MemoryRecordStore::new())))
    }

    #[tokio::test]
    async fn test_health_echoes_request_id() {
        let response = test_app(FulfillmentMode::Queue)
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_routes_follow_fulfillment_mode() {
        let queue = test_app(FulfillmentMode::Queue)
            .oneshot(Request::get("/queue/next").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(queue.status(), StatusCode::OK);

        let broadcast = test_app(FulfillmentMode::Broadcast { capacity: 8 })
            .oneshot(Request::get("/queue/next").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(broadcast.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_buy_without_credential_is_rejected() {
        let response = test_app(FulfillmentMode::Queue)
            .oneshot(
                Request::post("/buy")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"user_id":"u1","item_name":"soda","cost":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
