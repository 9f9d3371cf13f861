//! Tracing, logging, redaction (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(level: &str) {
    tracing::init(level);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Redaction of sensitive log context.
pub mod redact;

pub use redact::redact_context;
