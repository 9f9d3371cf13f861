use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

pub fn json_rejection(status: StatusCode, reason: &'static str) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "ok": false,
            "reason": reason,
        })),
    )
        .into_response()
}
