//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use relay_core::ChatRelay;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Upstream relay plus exchange log.
    pub relay: ChatRelay,
}
