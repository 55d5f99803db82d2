//! Data models for the router.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod server;

// Re-export commonly used types
pub use query::{Row, StatementOutput};
pub use server::{DatabaseType, Role, ServerConfig, ServerDescriptor};
