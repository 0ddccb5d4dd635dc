//! Axum router construction.
//!
//! [`build`] assembles the application router: the single `/api/chat`
//! route plus the CORS and per-request trace layers.

mod chat;

use axum::{middleware, Router};
use std::sync::Arc;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", chat::router())
        // Outermost layers execute first on the way in.
        .layer(cors::cors_layer(state.clone()))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
