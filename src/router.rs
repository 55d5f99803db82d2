//! Connection router.
//!
//! Classifies statements by role, picks a server for each role once, and
//! shares one adapter between every role that lands on the same server.
//!
//! Resolving a role runs at most once successfully. The first caller picks a
//! descriptor at random from the role's list, reuses the adapter already
//! bound to that identity or connects a new one (up to `retry_limit`
//! attempts), and the result sticks for the life of the router. A failed
//! resolution caches nothing; the next call starts over.

use crate::config::{DEFAULT_CHARSET, DEFAULT_RETRY_LIMIT};
use crate::db::dialect;
use crate::db::{Adapter, AdapterFactory, Driver, ErrorState};
use crate::error::{DbError, DbResult};
use crate::models::{Role, ServerConfig, ServerDescriptor};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, trace};

pub struct Router {
    servers: ServerConfig,
    factory: Arc<dyn AdapterFactory>,
    retry_limit: u32,
    /// Stored sanitized.
    charset: String,
    /// One adapter per server identity, shared across roles.
    instances: Mutex<HashMap<ServerDescriptor, Arc<dyn Adapter>>>,
    master: OnceCell<Arc<dyn Adapter>>,
    slave: OnceCell<Arc<dyn Adapter>>,
    errors: ErrorState,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("servers", &self.servers)
            .field("driver", &self.factory.name())
            .field("retry_limit", &self.retry_limit)
            .field("charset", &self.charset)
            .field("master_resolved", &self.master.initialized())
            .field("slave_resolved", &self.slave.initialized())
            .finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with no servers and the default driver.
    pub fn new() -> Self {
        Self::with_servers(ServerConfig::new())
    }

    pub fn with_servers(servers: ServerConfig) -> Self {
        Self {
            servers,
            factory: Arc::new(Driver::default()),
            retry_limit: DEFAULT_RETRY_LIMIT,
            charset: dialect::sanitize_charset(DEFAULT_CHARSET),
            instances: Mutex::new(HashMap::new()),
            master: OnceCell::new(),
            slave: OnceCell::new(),
            errors: ErrorState::new(),
        }
    }

    /// Register a server for both roles.
    pub fn add_server(&mut self, server: ServerDescriptor) {
        self.servers.add_server(server);
    }

    pub fn add_master_server(&mut self, server: ServerDescriptor) {
        self.servers.add_master_server(server);
    }

    pub fn add_slave_server(&mut self, server: ServerDescriptor) {
        self.servers.add_slave_server(server);
    }

    /// Drop every registered server. Roles already resolved keep their adapter.
    pub fn clear(&mut self) {
        self.servers.clear();
    }

    pub fn servers(&self) -> &ServerConfig {
        &self.servers
    }

    /// Select the adapter implementation for roles that are not resolved yet.
    pub fn use_driver(&mut self, factory: impl AdapterFactory + 'static) {
        debug!(driver = factory.name(), "Driver selected");
        self.factory = Arc::new(factory);
    }

    pub fn driver_name(&self) -> &str {
        self.factory.name()
    }

    /// Set the connection character set. The value is HTML-entity escaped
    /// before it is stored.
    pub fn set_charset(&mut self, charset: &str) {
        self.charset = dialect::sanitize_charset(charset);
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Connect attempts per resolution. Zero behaves like one.
    pub fn set_retry_limit(&mut self, retry_limit: u32) {
        self.retry_limit = retry_limit;
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Adapter for the role `sql` belongs to.
    pub async fn get_adapter(&self, sql: &str) -> DbResult<Arc<dyn Adapter>> {
        let role = Role::for_statement(sql);
        trace!(role = %role, "Statement classified");
        self.adapter_for(role).await
    }

    /// Adapter for an explicit role, resolving it on first use.
    pub async fn adapter_for(&self, role: Role) -> DbResult<Arc<dyn Adapter>> {
        self.cell(role)
            .get_or_try_init(|| self.resolve(role))
            .await
            .cloned()
    }

    /// The role's adapter if it has been resolved.
    pub fn cached(&self, role: Role) -> Option<Arc<dyn Adapter>> {
        self.cell(role).get().cloned()
    }

    /// Code of the last failed resolution.
    pub fn error_code(&self) -> Option<String> {
        self.errors.code()
    }

    /// Message of the last failed resolution.
    pub fn error_info(&self) -> Option<String> {
        self.errors.info()
    }

    fn cell(&self, role: Role) -> &OnceCell<Arc<dyn Adapter>> {
        match role {
            Role::Master => &self.master,
            Role::Slave => &self.slave,
        }
    }

    fn pick(&self, role: Role) -> Option<&ServerDescriptor> {
        let servers = self.servers.servers(role);
        if servers.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..servers.len());
        servers.get(index)
    }

    async fn resolve(&self, role: Role) -> DbResult<Arc<dyn Adapter>> {
        let server = self
            .pick(role)
            .ok_or(DbError::NoServerConfigured { role })?;

        // Held until the adapter is stored so two roles never connect the
        // same identity twice.
        let mut instances = self.instances.lock().await;
        if let Some(adapter) = instances.get(server) {
            debug!(role = %role, target = %server.target(), "Reusing adapter");
            return Ok(Arc::clone(adapter));
        }

        let adapter = self.factory.create(&self.charset);
        let attempts = self.retry_limit.max(1);
        for attempt in 1..=attempts {
            trace!(role = %role, target = %server.target(), attempt, "Connecting");
            if adapter.connect(server).await.is_ok() {
                instances.insert(server.clone(), Arc::clone(&adapter));
                debug!(
                    role = %role,
                    target = %server.target(),
                    driver = self.factory.name(),
                    attempt,
                    "Role resolved"
                );
                return Ok(adapter);
            }
        }

        debug!(role = %role, target = %server.target(), attempts, "Connect attempts exhausted");
        Err(self.errors.record(DbError::ResolutionFailed {
            role,
            attempts,
            code: adapter.error_code(),
            info: adapter.error_info(),
        }))
    }
}
