//! Pooled adapter.
//!
//! Binds a database-specific sqlx pool (MySqlPool, PgPool, SqlitePool) per
//! server. A transaction checks one connection out of the pool and keeps it
//! until commit or rollback; statements issued meanwhile run on it.

use crate::config::PoolOptions;
use crate::db::adapter::{Adapter, ErrorState};
use crate::db::dialect::{self, ConnectTarget};
use crate::db::types::collect_output;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Row, ServerDescriptor, StatementOutput};
use async_trait::async_trait;
use sqlx::pool::PoolOptions as SqlxPoolOptions;
use sqlx::postgres::PgConnection;
use sqlx::{
    ConnectOptions, Connection, Database, Executor, MySql, MySqlPool, PgPool, Postgres, Sqlite,
    SqlitePool, Transaction,
};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const LAST_INSERT_ID_SAVEPOINT: &str = "SAVEPOINT last_insert_id";
const RELEASE_LAST_INSERT_ID_SAVEPOINT: &str = "RELEASE SAVEPOINT last_insert_id";
const ROLLBACK_LAST_INSERT_ID_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT last_insert_id";

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    async fn run(&self, sql: &str) -> Result<StatementOutput, sqlx::Error> {
        match self {
            // lastval() is per session: read it on the connection that ran the insert
            DbPool::Postgres(p) => {
                let mut conn = p.acquire().await?;
                let mut output = collect_output((&mut *conn).fetch_many(sql)).await?;
                if dialect::generates_insert_id(sql, output.rows_affected) {
                    output.last_insert_id = session_lastval(&mut conn).await;
                }
                Ok(output)
            }
            DbPool::MySql(p) => collect_output(p.fetch_many(sql)).await,
            DbPool::SQLite(p) => collect_output(p.fetch_many(sql)).await,
        }
    }

    async fn begin(&self) -> Result<DbTransaction, sqlx::Error> {
        Ok(match self {
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await?),
            DbPool::Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            DbPool::SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        })
    }
}

/// `SELECT lastval()` on an autocommit connection. Sessions that never used a
/// sequence report an error, which means there is no id.
async fn session_lastval(conn: &mut PgConnection) -> Option<String> {
    let statement = dialect::last_insert_id_statement(DatabaseType::PostgreSQL);
    collect_output((&mut *conn).fetch_many(statement))
        .await
        .ok()?
        .scalar()
}

/// `SELECT lastval()` inside an open transaction, fenced by a savepoint so a
/// failure does not abort the transaction.
async fn transaction_lastval(conn: &mut PgConnection) -> Option<String> {
    (&mut *conn).execute(LAST_INSERT_ID_SAVEPOINT).await.ok()?;
    let statement = dialect::last_insert_id_statement(DatabaseType::PostgreSQL);
    match collect_output((&mut *conn).fetch_many(statement)).await {
        Ok(output) => {
            (&mut *conn)
                .execute(RELEASE_LAST_INSERT_ID_SAVEPOINT)
                .await
                .ok()?;
            output.scalar()
        }
        Err(_) => {
            (&mut *conn)
                .execute(ROLLBACK_LAST_INSERT_ID_SAVEPOINT)
                .await
                .ok()?;
            None
        }
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    async fn run(&mut self, sql: &str) -> Result<StatementOutput, sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => {
                let mut output = collect_output((&mut **tx).fetch_many(sql)).await?;
                if dialect::generates_insert_id(sql, output.rows_affected) {
                    output.last_insert_id = transaction_lastval(&mut **tx).await;
                }
                Ok(output)
            }
            DbTransaction::MySql(tx) => collect_output((&mut **tx).fetch_many(sql)).await,
            DbTransaction::SQLite(tx) => collect_output((&mut **tx).fetch_many(sql)).await,
        }
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, DbTransaction, tx => tx.commit().await)
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, DbTransaction, tx => tx.rollback().await)
    }
}

/// Open and close one connection outside the pool. sqlx pools keep retrying a
/// refused connect until the acquire timeout and then only report
/// `PoolTimedOut`; a direct connect fails with the driver's own error.
async fn verify_reachable<O: ConnectOptions>(options: &O) -> Result<(), sqlx::Error>
where
    O::Connection: Sized,
{
    let connection = options.connect().await?;
    // Reachability is established; a failed close changes nothing
    let _ = connection.close().await;
    Ok(())
}

pub struct PoolAdapter {
    options: PoolOptions,
    /// Sanitized connection charset, applied through the connect options.
    charset: Option<String>,
    pool: RwLock<Option<DbPool>>,
    transaction: tokio::sync::Mutex<Option<DbTransaction>>,
    /// Id generated by the most recent statement that reported one.
    last_insert_id: Mutex<Option<String>>,
    errors: ErrorState,
}

impl std::fmt::Debug for PoolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAdapter")
            .field("options", &self.options)
            .field("charset", &self.charset)
            .field("pool", &self.pool())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl PoolAdapter {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            charset: None,
            pool: RwLock::new(None),
            transaction: tokio::sync::Mutex::new(None),
            last_insert_id: Mutex::new(None),
            errors: ErrorState::new(),
        }
    }

    /// Give every pooled connection this charset. Empty means the driver default.
    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = (!charset.is_empty()).then(|| charset.to_string());
        self
    }

    /// Bind an existing pool. Driver errors from it surface as `DbResult`s.
    pub fn initialize(&self, pool: DbPool) {
        let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(pool);
    }

    /// The bound pool, if any.
    pub fn pool(&self) -> Option<DbPool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.options.acquire_timeout_or_default())
    }

    fn sqlx_options<DB: Database>(&self, is_sqlite: bool) -> SqlxPoolOptions<DB> {
        let opts = &self.options;
        SqlxPoolOptions::<DB>::new()
            .min_connections(opts.min_connections_or_default())
            .max_connections(opts.max_connections_or_default(is_sqlite))
            .acquire_timeout(self.acquire_timeout())
            .idle_timeout(Some(Duration::from_secs(opts.idle_timeout_or_default())))
            .test_before_acquire(opts.test_before_acquire_or_default())
    }

    async fn open(&self, target: ConnectTarget) -> Result<DbPool, sqlx::Error> {
        let target = match &self.charset {
            Some(charset) => target.with_charset(charset),
            None => target,
        };
        Ok(match target {
            ConnectTarget::MySql(options) => {
                verify_reachable(&options).await?;
                DbPool::MySql(self.sqlx_options::<MySql>(false).connect_lazy_with(options))
            }
            ConnectTarget::Postgres(options) => {
                verify_reachable(&options).await?;
                DbPool::Postgres(self.sqlx_options::<Postgres>(false).connect_lazy_with(options))
            }
            ConnectTarget::SQLite(options) => {
                verify_reachable(&options).await?;
                DbPool::SQLite(self.sqlx_options::<Sqlite>(true).connect_lazy_with(options))
            }
        })
    }

    /// Convert and record a driver failure. A pool timeout reports the
    /// configured acquire timeout.
    fn capture<T>(&self, result: Result<T, sqlx::Error>) -> DbResult<T> {
        result.map_err(|err| {
            let err = match err {
                sqlx::Error::PoolTimedOut => DbError::timeout(
                    "connection pool acquire",
                    self.options.acquire_timeout_or_default(),
                ),
                other => DbError::from(other),
            };
            self.errors.record(err)
        })
    }

    /// Run a statement on the open transaction, or on the pool when there is none.
    pub async fn execute(&self, sql: &str) -> DbResult<StatementOutput> {
        let pool = self.pool().ok_or(DbError::NotConnected)?;

        let in_transaction = {
            let mut transaction = self.transaction.lock().await;
            match transaction.as_mut() {
                Some(tx) => Some(tx.run(sql).await),
                None => None,
            }
        };
        let result = match in_transaction {
            Some(result) => result,
            None => pool.run(sql).await,
        };

        let output = self.capture(result)?;
        if let Some(id) = &output.last_insert_id {
            let mut last = self
                .last_insert_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *last = Some(id.clone());
        }
        Ok(output)
    }

    fn tracked_insert_id(&self) -> Option<String> {
        self.last_insert_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Adapter for PoolAdapter {
    async fn connect(&self, server: &ServerDescriptor) -> DbResult<()> {
        let started = Instant::now();
        let target = ConnectTarget::from_server(server);
        let opened = tokio::time::timeout(self.acquire_timeout(), self.open(target)).await;
        let pool = match opened {
            Ok(result) => self.capture(result)?,
            Err(_) => {
                return Err(self
                    .errors
                    .record(DbError::timeout("connect", started.elapsed().as_secs())));
            }
        };
        debug!(target = %server.target(), driver = "pool", "Connected");
        self.initialize(pool);
        Ok(())
    }

    async fn query(&self, sql: &str) -> DbResult<Vec<Row>> {
        Ok(self.execute(sql).await?.rows)
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        let pool = self.pool().ok_or(DbError::NotConnected)?;
        let mut transaction = self.transaction.lock().await;
        if transaction.is_some() {
            return Err(self
                .errors
                .record(DbError::transaction("There is already an active transaction")));
        }
        let tx = self.capture(pool.begin().await)?;
        *transaction = Some(tx);
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        if !self.is_connected() {
            return Err(DbError::NotConnected);
        }
        let tx = self.transaction.lock().await.take();
        match tx {
            Some(tx) => self.capture(tx.commit().await),
            None => Err(self
                .errors
                .record(DbError::transaction("There is no active transaction"))),
        }
    }

    async fn rollback(&self) -> DbResult<()> {
        if !self.is_connected() {
            return Err(DbError::NotConnected);
        }
        let tx = self.transaction.lock().await.take();
        match tx {
            Some(tx) => self.capture(tx.rollback().await),
            None => Err(self
                .errors
                .record(DbError::transaction("There is no active transaction"))),
        }
    }

    async fn quote(&self, value: &str) -> DbResult<String> {
        let pool = self.pool().ok_or(DbError::NotConnected)?;
        let quoted = dialect::quote_literal(pool.db_type(), value);
        Ok(dialect::strip_enclosing_quotes(&quoted).to_string())
    }

    async fn last_insert_id(&self) -> DbResult<String> {
        if !self.is_connected() {
            return Err(DbError::NotConnected);
        }
        Ok(self.tracked_insert_id().unwrap_or_else(|| "0".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.pool().is_some()
    }

    fn error_code(&self) -> Option<String> {
        self.errors.code()
    }

    fn error_info(&self) -> Option<String> {
        self.errors.info()
    }
}
