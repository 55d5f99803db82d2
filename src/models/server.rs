//! Server-related data models.
//!
//! This module defines the physical server descriptor, the logical roles a
//! statement can be routed to, and the master/slave server registry.

use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::PostgreSQL => 5432,
            Self::MySQL => 3306,
            Self::SQLite => 0,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Logical destination of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read + write. Receives every statement that is not a read.
    Master,
    /// Read-only.
    Slave,
}

impl Role {
    /// Classify a statement by its leading keyword.
    ///
    /// Only `SELECT` and `EXPLAIN` (upper case, at the very start) are reads.
    /// Lowercase keywords, leading whitespace and anything shorter than the
    /// keyword route to the master.
    pub fn for_statement(sql: &str) -> Self {
        if sql.starts_with("SELECT") || sql.starts_with("EXPLAIN") {
            Role::Slave
        } else {
            Role::Master
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// Connection parameters identifying one physical server.
///
/// Equality and hashing cover every field: two descriptors built from the
/// same values are the same connection target, whichever role they were
/// registered for.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub kind: DatabaseType,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: String,
    /// Database name, or the file path for SQLite.
    pub database: String,
    /// Unix socket path; takes precedence over host/port when set.
    #[serde(default)]
    pub socket: Option<String>,
}

impl ServerDescriptor {
    /// Create a descriptor on the backend's default port with no socket.
    pub fn new(
        kind: DatabaseType,
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            host: host.into(),
            port: kind.default_port(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            socket: None,
        }
    }

    pub fn mysql(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::new(DatabaseType::MySQL, host, user, password, database)
    }

    pub fn postgres(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::new(DatabaseType::PostgreSQL, host, user, password, database)
    }

    /// SQLite database file. Host, port and credentials stay empty.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(DatabaseType::SQLite, "", "", "", path)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the socket path. An empty path clears it.
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        let socket = socket.into();
        self.socket = if socket.is_empty() { None } else { Some(socket) };
        self
    }

    /// Display-safe target description (no credentials).
    pub fn target(&self) -> String {
        match (&self.kind, &self.socket) {
            (DatabaseType::SQLite, _) => format!("sqlite:{}", self.database),
            (_, Some(socket)) => format!("{}@{}/{}", self.user, socket, self.database),
            _ => format!(
                "{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

impl std::fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("socket", &self.socket)
            .finish()
    }
}

/// Ordered master and slave server lists.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    master: Vec<ServerDescriptor>,
    slave: Vec<ServerDescriptor>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server without replication: it serves both roles.
    ///
    /// Use this for a single server, or once per backend behind a
    /// load-balancing proxy.
    pub fn add_server(&mut self, server: ServerDescriptor) {
        self.master.push(server.clone());
        self.slave.push(server);
    }

    /// Register a master (read + write) server.
    pub fn add_master_server(&mut self, server: ServerDescriptor) {
        self.master.push(server);
    }

    /// Register a slave (read-only) server.
    pub fn add_slave_server(&mut self, server: ServerDescriptor) {
        self.slave.push(server);
    }

    /// Remove every registered server.
    pub fn clear(&mut self) {
        self.master.clear();
        self.slave.clear();
    }

    pub fn servers(&self, role: Role) -> &[ServerDescriptor] {
        match role {
            Role::Master => &self.master,
            Role::Slave => &self.slave,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty() && self.slave.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_database_type_from_scheme() {
        assert_eq!(
            DatabaseType::from_scheme("postgres"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_scheme("postgresql"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(DatabaseType::from_scheme("MySQL"), Some(DatabaseType::MySQL));
        assert_eq!(
            DatabaseType::from_scheme("mariadb"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(DatabaseType::from_scheme("sqlite"), Some(DatabaseType::SQLite));
        assert_eq!(DatabaseType::from_scheme("redis"), None);
    }

    #[test]
    fn test_role_for_statement() {
        assert_eq!(Role::for_statement("SELECT 1"), Role::Slave);
        assert_eq!(Role::for_statement("SELECT"), Role::Slave);
        assert_eq!(Role::for_statement("EXPLAIN SELECT * FROM t"), Role::Slave);
        assert_eq!(Role::for_statement("UPDATE t SET x=1"), Role::Master);
        assert_eq!(Role::for_statement("INSERT INTO t VALUES (1)"), Role::Master);
    }

    #[test]
    fn test_role_for_statement_is_case_sensitive() {
        assert_eq!(Role::for_statement("select 1"), Role::Master);
        assert_eq!(Role::for_statement("Select 1"), Role::Master);
        assert_eq!(Role::for_statement("explain select 1"), Role::Master);
        assert_eq!(Role::for_statement(" SELECT 1"), Role::Master);
    }

    #[test]
    fn test_role_for_short_statements() {
        assert_eq!(Role::for_statement(""), Role::Master);
        assert_eq!(Role::for_statement("SELEC"), Role::Master);
        assert_eq!(Role::for_statement("EXPLAI"), Role::Master);
        assert_eq!(Role::for_statement("é"), Role::Master);
    }

    #[test]
    fn test_descriptor_defaults() {
        let server = ServerDescriptor::mysql("db1", "app", "secret", "shop");
        assert_eq!(server.port, 3306);
        assert!(server.socket.is_none());

        let server = ServerDescriptor::postgres("db1", "app", "secret", "shop");
        assert_eq!(server.port, 5432);
    }

    #[test]
    fn test_descriptor_identity_is_structural() {
        let a = ServerDescriptor::mysql("db1", "app", "secret", "shop");
        let b = ServerDescriptor::mysql("db1", "app", "secret", "shop");
        let c = ServerDescriptor::mysql("db1", "app", "secret", "shop").with_port(3307);

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_empty_socket_is_none() {
        let server = ServerDescriptor::mysql("db1", "app", "secret", "shop").with_socket("");
        assert_eq!(server, ServerDescriptor::mysql("db1", "app", "secret", "shop"));

        let server = server.with_socket("/run/mysqld/mysqld.sock");
        assert_eq!(server.socket.as_deref(), Some("/run/mysqld/mysqld.sock"));
    }

    #[test]
    fn test_debug_masks_password() {
        let server = ServerDescriptor::mysql("db1", "app", "secret", "shop");
        let debug = format!("{:?}", server);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
        assert!(!server.target().contains("secret"));
    }

    #[test]
    fn test_add_server_registers_both_roles() {
        let mut config = ServerConfig::new();
        let server = ServerDescriptor::mysql("db1", "app", "secret", "shop");
        config.add_server(server.clone());

        assert_eq!(config.servers(Role::Master), &[server.clone()]);
        assert_eq!(config.servers(Role::Slave), &[server]);
    }

    #[test]
    fn test_add_master_and_slave_servers() {
        let mut config = ServerConfig::new();
        let master = ServerDescriptor::mysql("m1", "app", "secret", "shop");
        let slave1 = ServerDescriptor::mysql("s1", "app", "secret", "shop");
        let slave2 = ServerDescriptor::mysql("s2", "app", "secret", "shop");
        config.add_master_server(master.clone());
        config.add_slave_server(slave1.clone());
        config.add_slave_server(slave2.clone());

        assert_eq!(config.servers(Role::Master), &[master]);
        assert_eq!(config.servers(Role::Slave), &[slave1, slave2]);
    }

    #[test]
    fn test_clear() {
        let mut config = ServerConfig::new();
        config.add_server(ServerDescriptor::sqlite("/tmp/a.db"));
        assert!(!config.is_empty());
        config.clear();
        assert!(config.is_empty());
        assert!(config.servers(Role::Master).is_empty());
        assert!(config.servers(Role::Slave).is_empty());
    }
}
