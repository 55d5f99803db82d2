//! Direct adapter.
//!
//! One raw sqlx connection per server, no pool. Transactions are the
//! backend's own control statements, issued on that connection.

use crate::db::adapter::{Adapter, ErrorState};
use crate::db::dialect::{self, ConnectTarget};
use crate::db::types::collect_output;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Row, ServerDescriptor, StatementOutput};
use async_trait::async_trait;
use sqlx::{ConnectOptions, Executor, MySqlConnection, PgConnection, SqliteConnection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Database-specific connection.
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    async fn open(target: ConnectTarget) -> Result<Self, sqlx::Error> {
        Ok(match target {
            ConnectTarget::MySql(options) => DbConnection::MySql(options.connect().await?),
            ConnectTarget::Postgres(options) => DbConnection::Postgres(options.connect().await?),
            ConnectTarget::SQLite(options) => DbConnection::SQLite(options.connect().await?),
        })
    }

    async fn run(&mut self, sql: &str) -> Result<StatementOutput, sqlx::Error> {
        impl_db_dispatch!(self, DbConnection, conn => collect_output((&mut *conn).fetch_many(sql)).await)
    }
}

pub struct DirectAdapter {
    connect_timeout: Duration,
    /// Sanitized charset, set with a statement right after connecting.
    charset: String,
    connection: Mutex<Option<DbConnection>>,
    bound: AtomicBool,
    errors: ErrorState,
}

impl std::fmt::Debug for DirectAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectAdapter")
            .field("connect_timeout", &self.connect_timeout)
            .field("charset", &self.charset)
            .field("connected", &self.is_connected())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl DirectAdapter {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            charset: String::new(),
            connection: Mutex::new(None),
            bound: AtomicBool::new(false),
            errors: ErrorState::new(),
        }
    }

    /// Bind an already open connection, replacing any previous one.
    pub async fn initialize(&self, connection: DbConnection) {
        let mut slot = self.connection.lock().await;
        *slot = Some(connection);
        self.bound.store(true, Ordering::Release);
    }

    /// Charset for the connection. Empty means the driver default.
    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.to_string();
        self
    }

    /// Issue the charset statement. Its outcome does not affect the connect.
    async fn apply_charset(&self) {
        if self.charset.is_empty() {
            return;
        }
        let Ok(kind) = self.db_type().await else {
            return;
        };
        if let Some(statement) = dialect::charset_statement(kind, &self.charset) {
            let applied = self.execute(&statement).await.is_ok();
            trace!(charset = %self.charset, applied, "Applied connection charset");
        }
    }

    async fn execute(&self, sql: &str) -> DbResult<StatementOutput> {
        let mut slot = self.connection.lock().await;
        let connection = slot.as_mut().ok_or(DbError::NotConnected)?;
        trace!(sql = %sql, "Executing statement");
        self.errors.capture(connection.run(sql).await)
    }

    async fn db_type(&self) -> DbResult<DatabaseType> {
        let slot = self.connection.lock().await;
        slot.as_ref()
            .map(DbConnection::db_type)
            .ok_or(DbError::NotConnected)
    }
}

#[async_trait]
impl Adapter for DirectAdapter {
    async fn connect(&self, server: &ServerDescriptor) -> DbResult<()> {
        let target = ConnectTarget::from_server(server);
        let started = Instant::now();
        let opened = tokio::time::timeout(self.connect_timeout, DbConnection::open(target)).await;
        let connection = match opened {
            Ok(result) => self.errors.capture(result)?,
            Err(_) => {
                return Err(self
                    .errors
                    .record(DbError::timeout("connect", started.elapsed().as_secs())));
            }
        };
        debug!(target = %server.target(), driver = "direct", "Connected");
        self.initialize(connection).await;
        self.apply_charset().await;
        Ok(())
    }

    async fn query(&self, sql: &str) -> DbResult<Vec<Row>> {
        Ok(self.execute(sql).await?.rows)
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        let kind = self.db_type().await?;
        self.execute(dialect::begin_statement(kind)).await?;
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        self.execute(dialect::COMMIT_STATEMENT).await?;
        Ok(())
    }

    async fn rollback(&self) -> DbResult<()> {
        self.execute(dialect::ROLLBACK_STATEMENT).await?;
        Ok(())
    }

    async fn quote(&self, value: &str) -> DbResult<String> {
        let kind = self.db_type().await?;
        let quoted = dialect::quote_literal(kind, value);
        Ok(dialect::strip_enclosing_quotes(&quoted).to_string())
    }

    async fn last_insert_id(&self) -> DbResult<String> {
        let kind = self.db_type().await?;
        let output = self.execute(dialect::last_insert_id_statement(kind)).await?;
        Ok(output.scalar().unwrap_or_else(|| "0".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    fn error_code(&self) -> Option<String> {
        self.errors.code()
    }

    fn error_info(&self) -> Option<String> {
        self.errors.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DirectAdapter {
        DirectAdapter::new(Duration::from_secs(5))
    }

    fn scratch_db() -> (tempfile::NamedTempFile, ServerDescriptor) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let server = ServerDescriptor::sqlite(file.path().to_string_lossy());
        (file, server)
    }

    #[tokio::test]
    async fn test_unconnected_adapter_rejects_everything() {
        let adapter = adapter();
        assert!(!adapter.is_connected());
        assert!(matches!(
            adapter.query("SELECT 1").await,
            Err(DbError::NotConnected)
        ));
        assert!(matches!(
            adapter.begin_transaction().await,
            Err(DbError::NotConnected)
        ));
        assert!(matches!(adapter.commit().await, Err(DbError::NotConnected)));
        assert!(matches!(adapter.rollback().await, Err(DbError::NotConnected)));
        assert!(matches!(adapter.quote("x").await, Err(DbError::NotConnected)));
        assert!(matches!(
            adapter.last_insert_id().await,
            Err(DbError::NotConnected)
        ));
        assert_eq!(adapter.error_code(), None);
        assert_eq!(adapter.error_info(), None);
    }

    #[tokio::test]
    async fn test_connect_failure_records_error() {
        let adapter = adapter();
        let server = ServerDescriptor::sqlite("/nonexistent-dir/missing.db");
        assert!(adapter.connect(&server).await.is_err());
        assert!(!adapter.is_connected());
        let code = adapter.error_code().unwrap();
        assert!(adapter.error_info().unwrap().starts_with(&format!("{} ", code)));
    }

    #[tokio::test]
    async fn test_error_state_survives_calls_after_failed_connect() {
        let adapter = adapter();
        let server = ServerDescriptor::sqlite("/nonexistent-dir/missing.db");
        assert!(adapter.connect(&server).await.is_err());
        let code = adapter.error_code().unwrap();
        let info = adapter.error_info().unwrap();
        assert!(!code.is_empty());
        assert!(!info.is_empty());

        assert!(matches!(
            adapter.query("SELECT 1").await,
            Err(DbError::NotConnected)
        ));
        assert!(matches!(adapter.quote("x").await, Err(DbError::NotConnected)));
        assert!(matches!(adapter.commit().await, Err(DbError::NotConnected)));
        assert!(matches!(
            adapter.begin_transaction().await,
            Err(DbError::NotConnected)
        ));

        assert_eq!(adapter.error_code(), Some(code));
        assert_eq!(adapter.error_info(), Some(info));
    }

    #[tokio::test]
    async fn test_charset_on_sqlite_leaves_connection_clean() {
        let adapter = adapter().with_charset("utf8");
        let (_file, server) = scratch_db();
        adapter.connect(&server).await.unwrap();
        assert!(adapter.is_connected());
        assert_eq!(adapter.error_code(), None);
        assert_eq!(adapter.query("SELECT 1 AS one").await.unwrap()[0]["one"], 1);
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let adapter = adapter();
        let (_file, server) = scratch_db();
        adapter.connect(&server).await.unwrap();
        assert!(adapter.is_connected());

        adapter
            .query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let rows = adapter
            .query("INSERT INTO items (name) VALUES ('a')")
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(adapter.last_insert_id().await.unwrap(), "1");

        let rows = adapter.query("SELECT name FROM items").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(adapter.quote("it's").await.unwrap(), "it''s");
    }

    #[tokio::test]
    async fn test_failed_query_sets_error_and_success_keeps_it() {
        let adapter = adapter();
        let (_file, server) = scratch_db();
        adapter.connect(&server).await.unwrap();

        assert!(adapter.query("SELECT * FROM missing_table").await.is_err());
        let info = adapter.error_info().unwrap();
        assert!(info.contains("missing_table"));

        adapter.query("SELECT 1").await.unwrap();
        assert_eq!(adapter.error_info(), Some(info));
    }
}
