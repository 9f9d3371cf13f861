//! Provider webhook endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use escrowd_intake::{normalize_events, verify_helius_signature, IntakeError};

use crate::app::{errors, AppServices};

const SIGNATURE_HEADER: &str = "x-helius-signature";
const WEBHOOK_ID_HEADER: &str = "x-webhook-id";

/// POST /webhooks/helius
///
/// The body must stay raw bytes: the signature covers them exactly as sent.
pub async fn helius(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let webhook_id = header_str(&headers, WEBHOOK_ID_HEADER);

    if !verify_helius_signature(Some(services.webhook_secret.as_str()), signature, &body) {
        tracing::warn!(body_size = body.len(), "webhook signature verification failed");
        return errors::json_rejection(StatusCode::UNAUTHORIZED, "signature verification failed");
    }

    let events = match normalize_events(&body, webhook_id) {
        Ok(events) => events,
        Err(IntakeError::MalformedJson) => {
            tracing::warn!(body_size = body.len(), "webhook body is not json");
            return errors::json_rejection(StatusCode::BAD_REQUEST, "malformed json");
        }
    };

    let outcome = services.router.route_batch(&events).await;
    tracing::info!(
        events = events.len(),
        accepted = outcome.accepted,
        ignored = outcome.ignored,
        "webhook batch processed"
    );

    Json(json!({
        "ok": true,
        "accepted": outcome.accepted,
        "ignored": outcome.ignored,
    }))
    .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
