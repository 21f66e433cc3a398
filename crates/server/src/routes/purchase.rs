//! Purchase route handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;

use rewards_core::Points;

use crate::error::Result;
use crate::middleware::RequireCaller;
use crate::routes::json_body;
use crate::services::PurchaseRequest;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub ok: bool,
    pub new_points: Points,
}

/// `POST /buy`
pub async fn buy(
    State(state): State<AppState>,
    RequireCaller(caller): RequireCaller,
    payload: std::result::Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Json<PurchaseResponse>> {
    let request = json_body(payload)?;
    let receipt = state.purchases().purchase(&caller, request).await?;

    Ok(Json(PurchaseResponse {
        ok: true,
        new_points: receipt.new_points,
    }))
}
