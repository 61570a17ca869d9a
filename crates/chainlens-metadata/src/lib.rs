//! # chainlens-metadata
//!
//! The metadata-aware query layer: merges the physical schema description
//! with the operator's override tree, enforces the visibility cascade, and
//! translates discovery/query requests into safe SQL against the indexed
//! tables.

pub mod cache;
pub mod error;
pub mod overrides;
pub mod query;
pub mod schema;
pub mod service;
pub mod source;

pub use cache::AttributeValueCache;
pub use error::MetadataError;
pub use overrides::MetadataOverrides;
pub use query::{ApiQuery, AttributeQueryEngine, QueryPolicy};
pub use schema::{indexed_schema, DataType, PhysicalPlatform};
pub use service::{Attribute, Entity, MetadataService, Network, Platform};
pub use source::{DataSource, PgDataSource};
