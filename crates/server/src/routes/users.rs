//! Account route handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use rewards_core::{AccessPolicy, CallerContext, Points, UserId};

use crate::error::{AppError, Result};
use crate::middleware::{Registrant, RequireCaller};
use crate::models::AccountSummary;
use crate::routes::json_body;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    pub user_id: UserId,
    pub points: Points,
}

#[derive(Debug, Deserialize)]
pub struct SetPointsRequest {
    pub points: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    pub user_id: UserId,
    pub points: Points,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /user/create`
///
/// Self-service registration. An authenticated caller may register its own
/// id (admins any id). Unauthenticated registration requires
/// `LEDGER_OPEN_REGISTRATION`.
pub async fn create(
    State(state): State<AppState>,
    Registrant(caller): Registrant,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedUser>)> {
    let request = json_body(payload)?;
    let raw = request
        .user_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::MissingFields("user_id".to_string()))?;
    let user_id =
        UserId::parse(&raw).map_err(|e| AppError::MissingFields(format!("user_id: {e}")))?;

    // A user registering itself keeps its own email claim.
    let email = match &caller {
        Some(caller) => {
            require_self_or_admin(caller, &user_id)?;
            caller.email.as_ref().filter(|_| caller.subject == user_id)
        }
        None if state.config().open_registration => None,
        None => return Err(AppError::InvalidCredential),
    };

    let record = state.ledger().create_if_absent(&user_id, email).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedUser {
            user_id: record.user_id,
            points: record.points,
        }),
    ))
}

/// `GET /users`
pub async fn list(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
) -> Result<Json<Vec<AccountSummary>>> {
    require_admin(&caller)?;

    let accounts = state.ledger().list().await?;
    Ok(Json(accounts.into_iter().map(AccountSummary::from).collect()))
}

/// `GET /user/{user_id}`
pub async fn show(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(user_id): Path<String>,
) -> Result<Json<AccountSummary>> {
    // An id that cannot parse cannot exist either.
    let user_id = UserId::parse(&user_id).map_err(|_| AppError::UserNotFound)?;
    require_self_or_admin(&caller, &user_id)?;

    let account = state.ledger().account(&user_id).await?;
    Ok(Json(account.into()))
}

/// `PUT /user/{user_id}/points`
pub async fn set_points(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    Path(user_id): Path<String>,
    payload: std::result::Result<Json<SetPointsRequest>, JsonRejection>,
) -> Result<Json<PointsResponse>> {
    require_admin(&caller)?;

    let request = json_body(payload)?;
    let points = request
        .points
        .ok_or_else(|| AppError::MissingFields("points".to_string()))?;
    let user_id = UserId::parse(&user_id).map_err(|_| AppError::UserNotFound)?;

    let record = state
        .ledger()
        .set_points(&user_id, Points::new(points))
        .await?;
    tracing::info!(
        target_user = %record.user_id,
        points = %record.points,
        by = %caller.subject,
        "points set by admin"
    );

    Ok(Json(PointsResponse {
        user_id: record.user_id,
        points: record.points,
    }))
}

fn require_admin(caller: &CallerContext) -> Result<()> {
    if AccessPolicy::admin_only(caller).is_allowed() {
        Ok(())
    } else {
        Err(AppError::Unauthorized("admin access required".to_string()))
    }
}

fn require_self_or_admin(caller: &CallerContext, target: &UserId) -> Result<()> {
    if AccessPolicy::self_or_admin(caller, target).is_allowed() {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "not permitted to access this account".to_string(),
        ))
    }
}
