//! Backend-specific SQL text.
//!
//! Literal quoting, the post-connect charset statement, transaction control
//! statements and sqlx connect options, per `DatabaseType`.

use crate::models::{DatabaseType, ServerDescriptor};
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;

/// Quote a string literal the way the backend's client library does,
/// enclosing quotes included.
pub fn quote_literal(kind: DatabaseType, value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    match kind {
        // Same escapes as mysql_real_escape_string
        DatabaseType::MySQL => {
            for c in value.chars() {
                match c {
                    '\0' => quoted.push_str("\\0"),
                    '\n' => quoted.push_str("\\n"),
                    '\r' => quoted.push_str("\\r"),
                    '\\' => quoted.push_str("\\\\"),
                    '\'' => quoted.push_str("\\'"),
                    '"' => quoted.push_str("\\\""),
                    '\x1a' => quoted.push_str("\\Z"),
                    c => quoted.push(c),
                }
            }
        }
        DatabaseType::PostgreSQL | DatabaseType::SQLite => {
            for c in value.chars() {
                if c == '\'' {
                    quoted.push('\'');
                }
                quoted.push(c);
            }
        }
    }
    quoted.push('\'');
    quoted
}

/// Drop exactly one leading and one trailing quote character.
pub fn strip_enclosing_quotes(quoted: &str) -> &str {
    let inner = quoted.strip_prefix('\'').unwrap_or(quoted);
    inner.strip_suffix('\'').unwrap_or(inner)
}

/// HTML-entity escape a charset name so it cannot break out of the
/// charset statement.
pub fn sanitize_charset(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => sanitized.push_str("&amp;"),
            '"' => sanitized.push_str("&quot;"),
            '\'' => sanitized.push_str("&#039;"),
            '<' => sanitized.push_str("&lt;"),
            '>' => sanitized.push_str("&gt;"),
            c => sanitized.push(c),
        }
    }
    sanitized
}

/// Statement that sets the connection character set, if the backend has one.
///
/// `charset` must already be sanitized.
pub fn charset_statement(kind: DatabaseType, charset: &str) -> Option<String> {
    match kind {
        DatabaseType::MySQL => Some(format!("SET NAMES {}", charset)),
        DatabaseType::PostgreSQL => Some(format!("SET client_encoding TO '{}'", charset)),
        // SQLite fixes the encoding when the database file is created
        DatabaseType::SQLite => None,
    }
}

pub fn begin_statement(kind: DatabaseType) -> &'static str {
    match kind {
        DatabaseType::MySQL => "START TRANSACTION",
        DatabaseType::PostgreSQL | DatabaseType::SQLite => "BEGIN",
    }
}

pub const COMMIT_STATEMENT: &str = "COMMIT";
pub const ROLLBACK_STATEMENT: &str = "ROLLBACK";

/// Whether a statement may have generated an id worth reading back with
/// [`last_insert_id_statement`]: an `INSERT` (any case, leading whitespace
/// allowed) that wrote at least one row.
pub fn generates_insert_id(sql: &str, rows_affected: u64) -> bool {
    rows_affected > 0
        && sql
            .trim_start()
            .get(..6)
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("INSERT"))
}

/// Session-scoped query for the id generated by the last insert.
pub fn last_insert_id_statement(kind: DatabaseType) -> &'static str {
    match kind {
        DatabaseType::MySQL => "SELECT LAST_INSERT_ID()",
        DatabaseType::PostgreSQL => "SELECT lastval()",
        DatabaseType::SQLite => "SELECT last_insert_rowid()",
    }
}

/// sqlx connect options built from a descriptor; no URL round trip, so
/// credentials need no escaping.
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    MySql(MySqlConnectOptions),
    Postgres(PgConnectOptions),
    SQLite(SqliteConnectOptions),
}

impl ConnectTarget {
    pub fn from_server(server: &ServerDescriptor) -> Self {
        match server.kind {
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::new()
                    .host(&server.host)
                    .port(server.port)
                    .username(&server.user)
                    .password(&server.password)
                    .database(&server.database);
                if let Some(socket) = &server.socket {
                    options = options.socket(socket);
                }
                ConnectTarget::MySql(options)
            }
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::new()
                    .host(&server.host)
                    .port(server.port)
                    .username(&server.user)
                    .password(&server.password)
                    .database(&server.database);
                if let Some(socket) = &server.socket {
                    options = options.socket(socket);
                }
                ConnectTarget::Postgres(options)
            }
            // A missing file is a connect failure, never an implicit create
            DatabaseType::SQLite => ConnectTarget::SQLite(
                SqliteConnectOptions::new()
                    .filename(&server.database)
                    .create_if_missing(false),
            ),
        }
    }

    /// Make every connection opened from these options use `charset`.
    ///
    /// MySQL sends it during the handshake and in the `SET NAMES` it issues
    /// after connecting; PostgreSQL receives `client_encoding` as a startup
    /// option. SQLite has no connection charset.
    pub fn with_charset(self, charset: &str) -> Self {
        match self {
            ConnectTarget::MySql(options) => ConnectTarget::MySql(options.charset(charset)),
            ConnectTarget::Postgres(options) => {
                ConnectTarget::Postgres(options.options([("client_encoding", charset)]))
            }
            ConnectTarget::SQLite(options) => ConnectTarget::SQLite(options),
        }
    }
}
