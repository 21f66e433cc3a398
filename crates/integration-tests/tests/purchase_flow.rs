//! End-to-end purchase and dispenser queue scenarios.

#![allow(clippy::unwrap_used)]

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};

use rewards_integration_tests::{TestServer, error_kind};

#[tokio::test]
async fn test_purchase_then_poll_and_ack() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 100).await;
    let u1 = server.token("u1", None);

    let resp = server.buy(&u1, "u1", "soda", 50).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true, "new_points": 50 }));
    assert_eq!(server.points_of(&admin, "u1").await, 50);

    let expected = json!({ "user": "u1", "item": "soda", "cost": 50 });
    assert_eq!(server.queue_next().await, expected);
    assert_eq!(server.queue_next().await, expected);

    let resp = server.queue_ack().await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true, "processed": expected }));

    let resp = server.queue_ack().await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(error_kind(resp).await, "queue_empty");

    assert_eq!(server.queue_next().await, json!({ "command": "none" }));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_balance_and_queue() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u2", 10).await;

    let resp = server.buy(&server.token("u2", None), "u2", "soda", 50).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(resp).await, "insufficient_balance");

    assert_eq!(server.points_of(&admin, "u2").await, 10);
    assert_eq!(server.queue_next().await, json!({ "command": "none" }));
}

#[tokio::test]
async fn test_fifo_across_users() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "a", 10).await;
    server.create_user_with_points(&admin, "b", 10).await;

    server.buy(&server.token("a", None), "a", "first", 1).await;
    server.buy(&server.token("b", None), "b", "second", 2).await;

    let first: Value = server.queue_ack().await.json().await.unwrap();
    let second: Value = server.queue_ack().await.json().await.unwrap();
    assert_eq!(first["processed"]["item"], "first");
    assert_eq!(second["processed"]["item"], "second");
}

#[tokio::test]
async fn test_admin_adjustment_is_not_enqueued() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 100).await;

    let resp = server.buy(&admin, "u1", "ADMIN_ADJUSTMENT", 25).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["new_points"], 75);

    // Negative cost credits the account, admin only.
    let resp = server.buy(&admin, "u1", "ADMIN_ADJUSTMENT", -5).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.points_of(&admin, "u1").await, 80);

    assert_eq!(server.queue_next().await, json!({ "command": "none" }));
}

#[tokio::test]
async fn test_missing_fields() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    let resp = server
        .client
        .post(server.url("/buy"))
        .header("authorization", &admin)
        .json(&json!({ "user_id": "root" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_kind(resp).await, "missing_fields");
}

#[tokio::test]
async fn test_unknown_user() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;

    let resp = server.buy(&admin, "ghost", "soda", 1).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_kind(resp).await, "user_not_found");
}

#[tokio::test]
async fn test_concurrent_purchases_do_not_overspend() {
    let server = TestServer::spawn().await;
    let admin = server.admin_token().await;
    server.create_user_with_points(&admin, "u1", 30).await;
    let u1 = server.token("u1", None);

    let attempts = (0..8).map(|_| server.buy(&u1, "u1", "soda", 10));
    let responses = join_all(attempts).await;

    let ok = responses
        .iter()
        .filter(|resp| resp.status() == StatusCode::OK)
        .count();
    assert_eq!(ok, 3);
    assert_eq!(server.points_of(&admin, "u1").await, 0);
}
