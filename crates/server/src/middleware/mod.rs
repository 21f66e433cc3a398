//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (only when origins are configured)
//!
//! Authentication is per-route, via the extractors in [`auth`].

pub mod auth;
pub mod request_id;

pub use auth::{Registrant, RequireCaller, RequireDispenser};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
