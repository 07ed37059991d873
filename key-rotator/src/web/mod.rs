//! Web server module for receiving Eventarc webhooks.
//!
//! Every path and method is routed to a single handler; only POST requests
//! carrying an Eventarc payload are processed.

pub mod handlers;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use handlers::{
    handle_event, AppState, WebhookError, LOGGED_MESSAGE, PROCESSED_MESSAGE,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_event)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
