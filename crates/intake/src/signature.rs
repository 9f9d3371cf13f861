//! HMAC-SHA256 webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify the provider signature over the raw request body.
///
/// The header carries the hex HMAC-SHA256 of the body under the shared
/// secret. Comparison is constant-time over the hex digests; a missing
/// secret or header fails closed.
pub fn verify_helius_signature(secret: Option<&str>, header: Option<&str>, body: &[u8]) -> bool {
    let (Some(secret), Some(header)) = (secret, header) else {
        return false;
    };
    if secret.is_empty() || header.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // ct_eq is only constant-time over equal lengths; a length mismatch can
    // reject early because it leaks nothing about the digest bytes.
    if expected.len() != header.len() {
        return false;
    }
    expected
        .as_bytes()
        .ct_eq(header.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_exact_match() {
        let body = br#"{"events":[]}"#;
        let sig = sign("shh", body);
        assert!(verify_helius_signature(Some("shh"), Some(&sig), body));
    }

    #[test]
    fn rejects_missing_secret_or_header() {
        let body = b"payload";
        let sig = sign("shh", body);
        assert!(!verify_helius_signature(None, Some(&sig), body));
        assert!(!verify_helius_signature(Some("shh"), None, body));
        assert!(!verify_helius_signature(Some(""), Some(&sig), body));
        assert!(!verify_helius_signature(Some("shh"), Some(""), body));
    }

    #[test]
    fn rejects_length_mismatch() {
        let body = b"payload";
        let sig = sign("shh", body);
        assert!(!verify_helius_signature(Some("shh"), Some(&sig[..sig.len() - 2]), body));
    }

    #[test]
    fn rejects_bit_flipped_digest() {
        let body = b"payload";
        let mut sig = sign("shh", body).into_bytes();
        sig[0] = if sig[0] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(sig).unwrap();
        assert!(!verify_helius_signature(Some("shh"), Some(&flipped), body));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"payload";
        let sig = sign("other", body);
        assert!(!verify_helius_signature(Some("shh"), Some(&sig), body));
    }

    #[test]
    fn verification_covers_exact_body_bytes() {
        let sig = sign("shh", b"payload");
        assert!(!verify_helius_signature(Some("shh"), Some(&sig), b"payload "));
    }
}
