//! Health and operator visibility endpoints.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use escrowd_queue::QueueName;

use crate::app::{errors, AppServices};

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": "escrowd",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /queues — per-queue counters, read straight from the substrate.
pub async fn queues(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let mut body = serde_json::Map::new();
    for queue in QueueName::all() {
        match services.store.stats(queue) {
            Ok(stats) => {
                body.insert(
                    queue.to_string(),
                    serde_json::to_value(stats).unwrap_or_default(),
                );
            }
            Err(err) => {
                tracing::error!(queue = %queue, error = %err, "failed to read queue stats");
                return errors::json_rejection(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "queue stats unavailable",
                );
            }
        }
    }
    Json(serde_json::Value::Object(body)).into_response()
}
