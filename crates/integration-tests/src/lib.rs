//! Integration test harness for the rewards ledger.
//!
//! Each test spawns the full router on an ephemeral port with the in-memory
//! store and drives it over HTTP with `reqwest`. No database is needed.
//!
//! ```rust,ignore
//! let server = TestServer::spawn().await;
//! let admin = server.admin_token().await;
//! server.create_user_with_points(&admin, "u1", 100).await;
//! ```

#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use rewards_core::{AdminAllowList, EmailClaim, UserId};
use rewards_server::config::LedgerConfig;
use rewards_server::db::{MemoryRecordStore, RecordStore};
use rewards_server::services::TokenIssuer;
use rewards_server::state::AppState;

/// Signing key shared by the spawned server and the test token issuer.
pub const TEST_SECRET: &str = "n7Qx!p2Lk9#vR4tZ8wY1bM6cF3hJ0sD5";

/// Email on the default admin allow-list.
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// A running ledger server bound to `127.0.0.1:<ephemeral>`.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    issuer: TokenIssuer,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn with default test configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a fresh store after adjusting the default configuration.
    pub async fn spawn_with(configure: impl FnOnce(&mut LedgerConfig)) -> Self {
        Self::spawn_on(Arc::new(MemoryRecordStore::new()), configure).await
    }

    /// Spawn over an existing store, e.g. to restart with different config.
    pub async fn spawn_on(
        store: Arc<dyn RecordStore>,
        configure: impl FnOnce(&mut LedgerConfig),
    ) -> Self {
        let mut config = LedgerConfig::with_defaults(SecretString::from(TEST_SECRET));
        config.admin_emails = AdminAllowList::new([ADMIN_EMAIL]);
        config.verify_timeout = Duration::from_secs(5);
        configure(&mut config);

        let state = AppState::new(config, store);
        let app = rewards_server::app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            client: Client::new(),
            issuer: TokenIssuer::new(SecretString::from(TEST_SECRET)),
            handle,
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// WebSocket URL for `path`.
    #[must_use]
    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.replacen("http://", "ws://", 1))
    }

    /// Mint a user credential, `Bearer`-prefixed.
    #[must_use]
    pub fn token(&self, sub: &str, email: Option<&str>) -> String {
        let subject = UserId::parse(sub).expect("valid subject");
        let email = email.map(|e| EmailClaim::parse(e).expect("valid email"));
        let token = self
            .issuer
            .issue(&subject, email.as_ref(), Duration::from_secs(300))
            .expect("issue token");
        format!("Bearer {token}")
    }

    /// `POST /auth/session` with `token`.
    pub async fn authenticate(&self, token: &str) -> Response {
        self.client
            .post(self.url("/auth/session"))
            .header("authorization", token)
            .send()
            .await
            .expect("request /auth/session")
    }

    /// Credential for an admin account `root`, created on first call.
    pub async fn admin_token(&self) -> String {
        let token = self.token("root", Some(ADMIN_EMAIL));
        let resp = self.authenticate(&token).await;
        assert_eq!(resp.status(), StatusCode::OK);
        token
    }

    /// Create `user_id` (via its own first login) and set its balance.
    pub async fn create_user_with_points(&self, admin: &str, user_id: &str, points: i64) {
        let resp = self.authenticate(&self.token(user_id, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = self
            .client
            .put(self.url(&format!("/user/{user_id}/points")))
            .header("authorization", admin)
            .json(&json!({ "points": points }))
            .send()
            .await
            .expect("request set points");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    /// `POST /buy`.
    pub async fn buy(&self, token: &str, user_id: &str, item: &str, cost: i64) -> Response {
        self.client
            .post(self.url("/buy"))
            .header("authorization", token)
            .json(&json!({ "user_id": user_id, "item_name": item, "cost": cost }))
            .send()
            .await
            .expect("request /buy")
    }

    /// Current balance of `user_id`, read as admin.
    pub async fn points_of(&self, admin: &str, user_id: &str) -> i64 {
        let body: Value = self
            .client
            .get(self.url(&format!("/user/{user_id}")))
            .header("authorization", admin)
            .send()
            .await
            .expect("request /user")
            .json()
            .await
            .expect("user body");
        body["points"].as_i64().expect("points field")
    }

    /// `GET /queue/next` body.
    pub async fn queue_next(&self) -> Value {
        self.client
            .get(self.url("/queue/next"))
            .send()
            .await
            .expect("request /queue/next")
            .json()
            .await
            .expect("queue body")
    }

    /// `POST /queue/ack`.
    pub async fn queue_ack(&self) -> Response {
        self.client
            .post(self.url("/queue/ack"))
            .send()
            .await
            .expect("request /queue/ack")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The `error.kind` of an error response body.
pub async fn error_kind(resp: Response) -> String {
    let body: Value = resp.json().await.expect("error body");
    body["error"]["kind"]
        .as_str()
        .expect("error.kind")
        .to_string()
}
