//! Pipeline error types.
//!
//! Processors wrap their causes with context and pass them up; nothing is
//! caught and swallowed below the main loop, which alone decides whether a
//! failure is fatal.

use thiserror::Error;

use chainlens_rpc::NodeError;
use chainlens_storage::StoreError;

/// The underlying cause of a processing failure.
#[derive(Debug, Error)]
pub enum ProcessingCause {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failure in one of the pipeline's processors.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("blocks processing failed: {message}")]
    Blocks {
        message: String,
        #[source]
        cause: Option<ProcessingCause>,
    },

    #[error("accounts processing failed: {message}")]
    Accounts {
        message: String,
        #[source]
        cause: Option<ProcessingCause>,
    },

    #[error("bakers processing failed: {message}")]
    Bakers {
        message: String,
        #[source]
        cause: Option<ProcessingCause>,
    },

    #[error("rights processing failed: {message}")]
    Rights {
        message: String,
        #[source]
        cause: Option<ProcessingCause>,
    },
}

impl ProcessingError {
    pub fn blocks(message: impl Into<String>, cause: impl Into<ProcessingCause>) -> Self {
        Self::Blocks {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn blocks_message(message: impl Into<String>) -> Self {
        Self::Blocks {
            message: message.into(),
            cause: None,
        }
    }

    pub fn accounts(message: impl Into<String>, cause: impl Into<ProcessingCause>) -> Self {
        Self::Accounts {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn bakers(message: impl Into<String>, cause: impl Into<ProcessingCause>) -> Self {
        Self::Bakers {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn rights(message: impl Into<String>, cause: impl Into<ProcessingCause>) -> Self {
        Self::Rights {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_carries_the_cause() {
        let err = ProcessingError::blocks(
            "page [101, 150]",
            NodeError::Network("connection reset".into()),
        );
        assert_eq!(err.to_string(), "blocks processing failed: page [101, 150]");
        let source = std::error::Error::source(&err).expect("cause present");
        assert!(source.to_string().contains("connection reset"));
    }
}
