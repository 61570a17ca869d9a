//! Metadata and query error types.

use thiserror::Error;

/// Errors surfaced by the metadata service and the query engine.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The path does not resolve — either it never existed or some element
    /// of it is hidden. The two cases are indistinguishable by design.
    #[error("path not found")]
    NotFound,

    /// The query references an unknown attribute or uses an operator the
    /// attribute's type does not support.
    #[error("invalid query: {0}")]
    QueryValidation(String),

    /// The underlying data source failed.
    #[error("data source error: {0}")]
    Source(String),
}
