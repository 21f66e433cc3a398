//! Dispenser poll/ack handlers.
//!
//! The dispenser polls `GET /queue/next` until a command appears, fulfills
//! it, then calls `POST /queue/ack` to remove it. A dispenser that crashes
//! before acking sees the same command again.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};

use rewards_core::PurchaseCommand;

use crate::error::{AppError, Result};
use crate::middleware::RequireDispenser;
use crate::services::PollQueue;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
    pub processed: PurchaseCommand,
}

fn poll_queue(state: &AppState) -> Result<&Arc<PollQueue>> {
    state
        .fulfillment()
        .queue()
        .ok_or_else(|| AppError::NotFound("poll queue is not enabled".to_string()))
}

/// `GET /queue/next`
///
/// The head command, or `{"command": "none"}` when nothing is pending.
pub async fn next(State(state): State<AppState>, _: RequireDispenser) -> Result<Json<Value>> {
    let head = poll_queue(&state)?.peek_head();

    let body = match head {
        Some(command) => serde_json::to_value(command)
            .map_err(|e| AppError::Internal(format!("encode command: {e}")))?,
        None => json!({ "command": "none" }),
    };
    Ok(Json(body))
}

/// `POST /queue/ack`
pub async fn ack(State(state): State<AppState>, _: RequireDispenser) -> Result<Json<AckResponse>> {
    let processed = poll_queue(&state)?.ack_head()?;
    tracing::info!(
        user = %processed.user,
        item = %processed.item,
        cost = %processed.cost,
        "command acknowledged"
    );

    Ok(Json(AckResponse {
        ok: true,
        processed,
    }))
}
