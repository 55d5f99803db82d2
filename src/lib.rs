//! Role-based database router.
//!
//! Routes each SQL statement to a master (read + write) or slave (read-only)
//! server, shares one adapter per physical server and retries failed
//! connects. Adapters run over sqlx against SQLite, PostgreSQL and MySQL.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod router;

pub use config::{Config, ServerUrl};
pub use db::{Adapter, AdapterFactory, Driver};
pub use error::{DbError, DbResult};
pub use models::{Role, ServerConfig, ServerDescriptor};
pub use router::Router;
