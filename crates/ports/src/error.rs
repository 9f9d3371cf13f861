//! Port error model.

use thiserror::Error;

/// Failure talking to an external collaborator.
///
/// All variants are treated as transient by processors (the substrate
/// retries with backoff); configuration errors are surfaced at boot instead.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("port misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
