//! Node client error types.

use thiserror::Error;

/// Errors produced by the node client.
///
/// Network failures are transient and retried until the retry budget runs
/// out; decode failures are never retried — a malformed payload will not fix
/// itself on a second read.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node unreachable or answered with a transport-level failure
    /// (connection reset, 5xx, deadline exceeded).
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl NodeError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_is_retryable_decode_is_not() {
        assert!(NodeError::Network("connection reset".into()).is_retryable());
        assert!(!NodeError::Decode("missing field `hash`".into()).is_retryable());
    }
}
