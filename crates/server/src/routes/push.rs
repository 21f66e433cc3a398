//! Real-time push channel for broadcast fulfillment.
//!
//! Observers connect over WebSocket and receive every purchase broadcast
//! while they are connected. Messages are JSON text frames:
//!
//! ```text
//! {"type":"connected"}                                   on connect
//! {"type":"pong"}                                        reply to a text "ping"
//! {"type":"purchase","user":"u1","item":"soda","cost":50} per broadcast
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde_json::json;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, warn};

use rewards_core::PurchaseCommand;

use crate::error::{AppError, Result};
use crate::services::Broadcaster;
use crate::state::AppState;

/// `GET /push`
pub async fn connect(State(state): State<AppState>, ws: WebSocketUpgrade) -> Result<Response> {
    let broadcaster: Arc<Broadcaster> = state
        .fulfillment()
        .broadcaster()
        .cloned()
        .ok_or_else(|| AppError::NotFound("push channel is not enabled".to_string()))?;

    Ok(ws.on_upgrade(move |socket| observe(socket, broadcaster.subscribe())))
}

async fn observe(mut socket: WebSocket, mut commands: Receiver<PurchaseCommand>) {
    debug!("push observer connected");
    if send_json(&mut socket, &json!({ "type": "connected" })).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(command) => {
                    let frame = json!({
                        "type": "purchase",
                        "user": command.user,
                        "item": command.item,
                        "cost": command.cost,
                    });
                    if send_json(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push observer lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str().trim() == "ping" => {
                    if send_json(&mut socket, &json!({ "type": "pong" })).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("push observer disconnected");
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> std::result::Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}
