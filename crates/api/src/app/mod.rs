//! HTTP application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, routing::post, Extension, Router};

use escrowd_engine::WebhookRouter;
use escrowd_queue::DelayedJobStore;

pub mod errors;
pub mod routes;

/// Shared state behind the HTTP handlers.
pub struct AppServices {
    pub webhook_secret: String,
    pub router: WebhookRouter,
    pub store: Arc<dyn DelayedJobStore>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/queues", get(routes::system::queues))
        .route("/webhooks/helius", post(routes::webhook::helius))
        .layer(Extension(services))
}
