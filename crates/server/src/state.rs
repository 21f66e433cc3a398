//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::db::RecordStore;
use crate::services::{
    BootstrapLogin, Fulfillment, IdentityAdapter, IdentityVerifier, Ledger, PurchaseService,
    SignedTokenVerifier, TokenIssuer,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// ledger, the fulfillment sink and the identity adapter.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: LedgerConfig,
    ledger: Arc<Ledger>,
    identity: IdentityAdapter,
    fulfillment: Fulfillment,
    purchases: PurchaseService,
    bootstrap: Option<BootstrapLogin>,
}

impl AppState {
    /// Create application state with the built-in signed-token verifier.
    ///
    /// # Arguments
    ///
    /// * `config` - Ledger configuration
    /// * `store` - Account record store
    #[must_use]
    pub fn new(config: LedgerConfig, store: Arc<dyn RecordStore>) -> Self {
        let verifier = Arc::new(SignedTokenVerifier::new(config.token_secret.clone()));
        Self::with_verifier(config, store, verifier)
    }

    /// Create application state with a custom identity verifier.
    #[must_use]
    pub fn with_verifier(
        config: LedgerConfig,
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(store, config.admin_emails.clone()));
        let identity = IdentityAdapter::new(verifier, config.verify_timeout);
        let issuer = TokenIssuer::new(config.token_secret.clone());
        let fulfillment = Fulfillment::from_mode(&config.fulfillment);
        let purchases = PurchaseService::new(Arc::clone(&ledger), fulfillment.sink());
        let bootstrap = config
            .bootstrap
            .clone()
            .map(|b| BootstrapLogin::new(b, issuer));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                ledger,
                identity,
                fulfillment,
                purchases,
                bootstrap,
            }),
        }
    }

    /// Get a reference to the ledger configuration.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    /// Get a reference to the ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Get a reference to the identity adapter.
    #[must_use]
    pub fn identity(&self) -> &IdentityAdapter {
        &self.inner.identity
    }

    /// Get a reference to the active fulfillment strategy.
    #[must_use]
    pub fn fulfillment(&self) -> &Fulfillment {
        &self.inner.fulfillment
    }

    /// Get a reference to the purchase service.
    #[must_use]
    pub fn purchases(&self) -> &PurchaseService {
        &self.inner.purchases
    }

    /// The break-glass login, when configured.
    #[must_use]
    pub fn bootstrap(&self) -> Option<&BootstrapLogin> {
        self.inner.bootstrap.as_ref()
    }
}
