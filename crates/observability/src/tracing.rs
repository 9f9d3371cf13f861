//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Every log line is a single JSON object with the event fields flattened to
/// the top level, so collectors see `{"level", "message", "timestamp", ...}`
/// directly instead of a nested `fields` map. Span context is omitted: the
/// processors already carry `deal_id`/`queue`/`job_id` as event fields, and
/// duplicating them per span only bloats the line.
///
/// The default filter comes from `LOG_LEVEL`; `RUST_LOG` still overrides it
/// for per-target tuning. An unparseable level falls back to `info` rather
/// than failing boot.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(level: &str) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}
