//! Broadcast fulfillment over the `/push` WebSocket.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use rewards_integration_tests::TestServer;
use rewards_server::config::FulfillmentMode;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn broadcast_server() -> TestServer {
    TestServer::spawn_with(|config| {
        config.fulfillment = FulfillmentMode::Broadcast { capacity: 16 };
    })
    .await
}

/// Next JSON text frame, skipping control frames.
async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_push_connected_pong_and_purchase_frames() {
    let server = broadcast_server().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 100).await;

    let (mut socket, _) = connect_async(server.ws_url("/push")).await.unwrap();
    assert_eq!(next_frame(&mut socket).await, json!({ "type": "connected" }));

    socket.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_frame(&mut socket).await, json!({ "type": "pong" }));

    let resp = server.buy(&server.token("u1", None), "u1", "soda", 50).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        next_frame(&mut socket).await,
        json!({ "type": "purchase", "user": "u1", "item": "soda", "cost": 50 })
    );
}

#[tokio::test]
async fn test_push_skips_admin_adjustment() {
    let server = broadcast_server().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 100).await;

    let (mut socket, _) = connect_async(server.ws_url("/push")).await.unwrap();
    assert_eq!(next_frame(&mut socket).await, json!({ "type": "connected" }));

    let resp = server.buy(&admin, "u1", "ADMIN_ADJUSTMENT", 10).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = server.buy(&admin, "u1", "chips", 5).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Only the real purchase reaches the observer.
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["item"], "chips");
    assert_eq!(server.points_of(&admin, "u1").await, 85);
}

#[tokio::test]
async fn test_late_observer_sees_no_backlog() {
    let server = broadcast_server().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 100).await;

    let resp = server.buy(&server.token("u1", None), "u1", "early", 1).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let (mut socket, _) = connect_async(server.ws_url("/push")).await.unwrap();
    assert_eq!(next_frame(&mut socket).await, json!({ "type": "connected" }));

    server.buy(&server.token("u1", None), "u1", "late", 1).await;
    assert_eq!(next_frame(&mut socket).await["item"], "late");
}
