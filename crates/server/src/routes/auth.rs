//! Authentication route handlers.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use secrecy::SecretString;
use serde::Deserialize;

use rewards_core::CallerOrigin;

use crate::error::{AppError, Result};
use crate::middleware::RequireCaller;
use crate::models::AccountSummary;
use crate::routes::json_body;
use crate::services::BootstrapSession;
use crate::state::AppState;

/// Bootstrap login body.
#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /auth/session`
///
/// Verifies the bearer credential and returns the caller's account, creating
/// it with zero points on first sight.
pub async fn session(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
) -> Result<Json<AccountSummary>> {
    if caller.origin == CallerOrigin::Bootstrap {
        return Err(AppError::NotFound(
            "operator sessions have no account".to_string(),
        ));
    }

    let account = state.ledger().account(&caller.subject).await?;
    Ok(Json(account.into()))
}

/// `POST /admin/login`
pub async fn admin_login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AdminLoginRequest>, JsonRejection>,
) -> Result<Json<BootstrapSession>> {
    let login = state
        .bootstrap()
        .ok_or_else(|| AppError::NotFound("bootstrap login is not enabled".to_string()))?;

    let request = json_body(payload)?;
    let session = login
        .login(&request.username, SecretString::from(request.password))
        .await?;
    Ok(Json(session))
}
