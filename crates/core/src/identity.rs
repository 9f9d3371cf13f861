//! Webhook event identity hashing.

use sha2::{Digest, Sha256};

/// Compute the deterministic id of a webhook entry.
///
/// `SHA-256(webhookId || "|" || sig || "|" || index)`, hex-encoded. Missing
/// parts default to the empty string and 0, so partially-populated provider
/// payloads still hash stably. Downstream stores key replay suppression on
/// this digest.
pub fn compute_webhook_id(webhook_id: Option<&str>, sig: Option<&str>, index: Option<u64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(webhook_id.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(sig.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(index.unwrap_or(0).to_string().as_bytes());
    hex::encode(hasher.finalize())
}
