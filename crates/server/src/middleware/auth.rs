//! Authentication extractors.
//!
//! Turn the `Authorization` header into an explicit [`CallerContext`] for
//! route handlers. A user-scoped credential resolves the caller's account,
//! creating it on first sight, and takes `is_admin` from that account. A
//! bootstrap-scoped credential yields the operator context and touches no
//! account. [`Registrant`] verifies without creating, for the registration
//! route.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use secrecy::ExposeSecret;

use rewards_core::{CallerContext, EmailClaim};

use crate::error::{AppError, set_sentry_user};
use crate::services::TokenScope;
use crate::services::bootstrap::constant_time_compare;
use crate::services::identity::strip_bearer;
use crate::state::AppState;

/// Extractor that requires a verified caller.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireCaller(caller): RequireCaller,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", caller.subject)
/// }
/// ```
pub struct RequireCaller(pub CallerContext);

impl FromRequestParts<AppState> for RequireCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = authorization(parts).ok_or(AppError::InvalidCredential)?;
        Ok(Self(resolve_caller(raw, state).await?))
    }
}

/// Optional caller for the registration route.
///
/// A request without an `Authorization` header yields `None`. A header that
/// is present but fails verification is still rejected. Unlike
/// [`RequireCaller`] the caller's account is only looked up, never created,
/// so a user can register its own id. A caller with no account yet is not
/// admin.
pub struct Registrant(pub Option<CallerContext>);

impl FromRequestParts<AppState> for Registrant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = authorization(parts) else {
            return Ok(Self(None));
        };

        let identity = state.identity().verify(raw).await?;
        let caller = match identity.scope {
            TokenScope::Bootstrap => CallerContext::bootstrap(identity.subject),
            TokenScope::User => {
                let is_admin = state
                    .ledger()
                    .find(&identity.subject)
                    .await?
                    .is_some_and(|account| account.is_admin);
                CallerContext::account(identity.subject, identity.email, is_admin)
            }
        };

        set_sentry_user(&caller.subject, caller.email.as_ref().map(EmailClaim::as_str));
        Ok(Self(Some(caller)))
    }
}

/// Extractor guarding the dispenser endpoints.
///
/// When `LEDGER_DISPENSER_TOKEN` is configured the request must carry it as
/// a bearer token; otherwise every request passes.
pub struct RequireDispenser;

impl FromRequestParts<AppState> for RequireDispenser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config().dispenser_token.as_ref() else {
            return Ok(Self);
        };

        let presented = authorization(parts).map(strip_bearer).unwrap_or_default();
        if constant_time_compare(presented, expected.expose_secret()) {
            Ok(Self)
        } else {
            tracing::debug!("dispenser token rejected");
            Err(AppError::InvalidCredential)
        }
    }
}

fn authorization(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
}

async fn resolve_caller(raw: &str, state: &AppState) -> Result<CallerContext, AppError> {
    let identity = state.identity().verify(raw).await?;

    let caller = match identity.scope {
        TokenScope::Bootstrap => CallerContext::bootstrap(identity.subject),
        TokenScope::User => {
            let account = state
                .ledger()
                .get_or_create(&identity.subject, identity.email.as_ref())
                .await?;
            CallerContext::account(identity.subject, identity.email, account.is_admin)
        }
    };

    set_sentry_user(&caller.subject, caller.email.as_ref().map(EmailClaim::as_str));
    Ok(caller)
}
