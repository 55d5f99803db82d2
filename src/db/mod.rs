//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The `Adapter` capability and the driver factories
//! - Pooled and direct adapter implementations
//! - Backend-specific SQL text
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

pub mod adapter;
pub mod dialect;
#[macro_use]
pub mod macros;
pub mod direct;
pub mod pool;
pub mod types;

pub use adapter::{Adapter, AdapterFactory, Driver, ErrorState};
pub use direct::{DbConnection, DirectAdapter};
pub use pool::{DbPool, DbTransaction, PoolAdapter};
