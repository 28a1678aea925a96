//! Upstream adapters: the primary analytics backend and the Yahoo Finance
//! public API.

pub mod backend;
pub mod yahoo;

pub use backend::{BackendClient, DEFAULT_BACKEND_URL, DEFAULT_HEALTH_TIMEOUT_MS};
pub use yahoo::{YahooAdapter, YahooAuthManager};
