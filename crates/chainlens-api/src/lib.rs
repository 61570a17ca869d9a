//! # chainlens-api
//!
//! The HTTP surface over the metadata service and the attribute query
//! engine: versioned discovery routes, a data query endpoint, API-key
//! authentication, and one top-level error mapping.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::{router, ApiState};
pub use server::serve;
