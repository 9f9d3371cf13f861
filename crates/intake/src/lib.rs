//! Webhook intake: signature verification and payload normalization.

pub mod normalize;
pub mod signature;

pub use normalize::{normalize_events, IntakeError};
pub use signature::verify_helius_signature;
