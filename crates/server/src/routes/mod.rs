//! HTTP route handlers for the ledger service.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST /auth/session           - Verify credential, get-or-create account
//! POST /admin/login            - Break-glass operator login
//!
//! # Users
//! POST /user/create            - Register an account
//! GET  /users                  - List accounts (admin)
//! GET  /user/{user_id}         - Account detail (self or admin)
//! PUT  /user/{user_id}/points  - Overwrite balance (admin)
//!
//! # Purchase
//! POST /buy                    - Purchase transaction (self or admin)
//!
//! # Fulfillment (one of, by LEDGER_FULFILLMENT)
//! GET  /queue/next             - Peek head command
//! POST /queue/ack              - Pop head command
//! GET  /push                   - WebSocket observer channel
//! ```

pub mod auth;
pub mod purchase;
pub mod push;
pub mod queue;
pub mod users;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    routing::{get, post, put},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::services::Fulfillment;
use crate::state::AppState;

/// Unwrap a JSON body, reporting parse failures as `missing_fields`.
pub(crate) fn json_body<T: DeserializeOwned>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::MissingFields(rejection.body_text()))
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list))
        .route("/user/create", post(users::create))
        .route("/user/{user_id}", get(users::show))
        .route("/user/{user_id}/points", put(users::set_points))
}

/// Create the fulfillment routes for the configured strategy.
pub fn fulfillment_routes(fulfillment: &Fulfillment) -> Router<AppState> {
    match fulfillment {
        Fulfillment::Queue(_) => Router::new()
            .route("/queue/next", get(queue::next))
            .route("/queue/ack", post(queue::ack)),
        Fulfillment::Broadcast(_) => Router::new().route("/push", get(push::connect)),
    }
}

/// Create all API routes.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/session", post(auth::session))
        .route("/admin/login", post(auth::admin_login))
        .merge(user_routes())
        .route("/buy", post(purchase::buy))
        .merge(fulfillment_routes(state.fulfillment()))
}
