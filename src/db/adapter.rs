//! Adapter capability and driver selection.
//!
//! An adapter wraps one physical connection target. Every operation reports
//! failure through its `DbResult` and never panics. Driver failures are also
//! remembered and can be read back through `error_code` / `error_info`;
//! operations on an adapter that was never connected fail with
//! [`DbError::NotConnected`] and leave that state alone.

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, PoolOptions};
use crate::db::direct::DirectAdapter;
use crate::db::pool::PoolAdapter;
use crate::error::{DbError, DbResult};
use crate::models::{Row, ServerDescriptor};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Open the connection described by `server` and bind it.
    async fn connect(&self, server: &ServerDescriptor) -> DbResult<()>;

    /// Execute a statement. Statements without a result set yield no rows.
    async fn query(&self, sql: &str) -> DbResult<Vec<Row>>;

    async fn begin_transaction(&self) -> DbResult<()>;

    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;

    /// Escape `value` for embedding in a string literal. The enclosing quotes
    /// are not included; callers add their own.
    async fn quote(&self, value: &str) -> DbResult<String>;

    async fn last_insert_id(&self) -> DbResult<String>;

    fn is_connected(&self) -> bool;

    /// Code of the most recent driver failure.
    fn error_code(&self) -> Option<String>;

    /// Message of the most recent driver failure.
    fn error_info(&self) -> Option<String>;
}

/// Creates adapters for the router. Chosen at configuration time and consulted
/// once per role resolution.
pub trait AdapterFactory: Send + Sync + std::fmt::Debug {
    /// A new, unconnected adapter. `charset` is already sanitized and must be
    /// applied to every connection the adapter opens.
    fn create(&self, charset: &str) -> Arc<dyn Adapter>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Built-in adapter implementations.
#[derive(Debug, Clone)]
pub enum Driver {
    /// [`PoolAdapter`]: an sqlx pool per server, transactions on a checked-out
    /// connection.
    Pool(PoolOptions),
    /// [`DirectAdapter`]: one raw connection per server.
    Direct { connect_timeout: Duration },
}

impl Driver {
    pub fn pool() -> Self {
        Driver::Pool(PoolOptions::default())
    }

    pub fn direct() -> Self {
        Driver::Direct {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::direct()
    }
}

impl AdapterFactory for Driver {
    fn create(&self, charset: &str) -> Arc<dyn Adapter> {
        match self {
            Driver::Pool(options) => {
                Arc::new(PoolAdapter::new(options.clone()).with_charset(charset))
            }
            Driver::Direct { connect_timeout } => {
                Arc::new(DirectAdapter::new(*connect_timeout).with_charset(charset))
            }
        }
    }

    fn name(&self) -> &str {
        match self {
            Driver::Pool(_) => "pool",
            Driver::Direct { .. } => "direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedError {
    code: String,
    info: String,
}

/// Last recorded failure. Only ever overwritten by a newer failure.
#[derive(Debug, Default)]
pub struct ErrorState {
    last: Mutex<Option<RecordedError>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `err` and hand it back.
    pub fn record(&self, err: DbError) -> DbError {
        self.set(err.code(), err.info());
        err
    }

    pub fn set(&self, code: impl Into<String>, info: impl Into<String>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(RecordedError {
            code: code.into(),
            info: info.into(),
        });
    }

    /// Record the error of a failed driver call; success passes through untouched.
    pub fn capture<T>(&self, result: Result<T, sqlx::Error>) -> DbResult<T> {
        result.map_err(|e| self.record(DbError::from(e)))
    }

    pub fn code(&self) -> Option<String> {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.as_ref().map(|e| e.code.clone())
    }

    pub fn info(&self) -> Option<String> {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.as_ref().map(|e| e.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_state_starts_empty() {
        let state = ErrorState::new();
        assert_eq!(state.code(), None);
        assert_eq!(state.info(), None);
    }

    #[test]
    fn test_error_state_records_normalized_error() {
        let state = ErrorState::new();
        let err = state.record(DbError::database(
            "Unknown column 'x'",
            Some("42S22".to_string()),
        ));
        assert!(matches!(err, DbError::Database { .. }));
        assert_eq!(state.code().as_deref(), Some("42S22"));
        assert_eq!(state.info().as_deref(), Some("42S22 Unknown column 'x'"));
    }

    #[test]
    fn test_error_state_capture_success_keeps_previous_error() {
        let state = ErrorState::new();
        state.set("HY000", "HY000 earlier failure");
        let value = state.capture(Ok::<_, sqlx::Error>(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(state.info().as_deref(), Some("HY000 earlier failure"));
    }

    #[test]
    fn test_error_state_capture_failure_overwrites() {
        let state = ErrorState::new();
        state.set("HY000", "HY000 earlier failure");
        let result = state.capture(Err::<(), _>(sqlx::Error::PoolClosed));
        assert!(result.is_err());
        assert_eq!(state.code().as_deref(), Some("HY000"));
        assert_eq!(
            state.info().as_deref(),
            Some("HY000 Connection pool is closed")
        );
    }

    #[test]
    fn test_driver_factories() {
        assert_eq!(Driver::default().name(), "direct");
        assert_eq!(Driver::pool().name(), "pool");

        let adapter = Driver::pool().create("utf8");
        assert!(!adapter.is_connected());
        let adapter = Driver::direct().create("utf8");
        assert!(!adapter.is_connected());
    }
}
