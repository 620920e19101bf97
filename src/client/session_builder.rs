//! [`SessionBuilder`] is used to create new [`Session`] instances.

use std::time::Duration;

use crate::client::session::{Session, SessionConfig};
use crate::errors::NewSessionError;
use crate::network::connection::{Connection, NodeAddr};
use crate::statement::Consistency;

/// Builds a [`Session`] step by step.
///
/// # Example
///
/// ```rust,no_run
/// # use cql_pool::{Connection, CqlValue, Consistency, ExecuteOptions, PreparedId, QueryResult};
/// # use cql_pool::errors::{ConnectionError, RequestAttemptError};
/// # use cql_pool::{NodeAddr, Session, SessionBuilder};
/// # struct MyConnection;
/// # impl MyConnection {
/// #     fn new(_node: &NodeAddr) -> Self { MyConnection }
/// # }
/// # #[async_trait::async_trait]
/// # impl Connection for MyConnection {
/// #     async fn open(&self) -> Result<(), ConnectionError> { Ok(()) }
/// #     async fn close(&self) -> Result<(), ConnectionError> { Ok(()) }
/// #     async fn execute(&self, _: &str, _: &[CqlValue], _: Consistency)
/// #         -> Result<QueryResult, RequestAttemptError> { Ok(QueryResult::Void) }
/// #     async fn prepare(&self, _: &str) -> Result<PreparedId, RequestAttemptError> {
/// #         unimplemented!()
/// #     }
/// #     async fn execute_prepared(&self, _: &PreparedId, _: &[CqlValue], _: Consistency,
/// #         _: &ExecuteOptions) -> Result<QueryResult, RequestAttemptError> { unimplemented!() }
/// # }
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session: Session<MyConnection> = SessionBuilder::new()
///     .known_node("192.168.1.10:9042")
///     .known_node("192.168.1.11")
///     .pool_size(2)
///     .build(|node| MyConnection::new(node))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    known_nodes: Vec<String>,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> SessionBuilder {
        SessionBuilder {
            known_nodes: Vec::new(),
            config: SessionConfig::new(),
        }
    }

    /// Adds a known node address, `"host"` or `"host:port"` (port defaults
    /// to 9042).
    pub fn known_node(mut self, address: impl Into<String>) -> Self {
        self.known_nodes.push(address.into());
        self
    }

    /// Adds multiple known node addresses.
    pub fn known_nodes<A: Into<String>>(mut self, addresses: impl IntoIterator<Item = A>) -> Self {
        self.known_nodes
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Number of connections opened to each node.
    ///
    /// Panics if `pool_size` is zero.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool size must be larger than 0");
        self.config.pool_size = pool_size;
        self
    }

    /// Maximum number of times a request is retried on another connection
    /// after a fatal error.
    pub fn max_execute_retries(mut self, retries: u32) -> Self {
        self.config.max_execute_retries = retries;
        self
    }

    /// Maximum time to obtain a healthy connection from the pool.
    pub fn get_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.get_connection_timeout = timeout;
        self
    }

    /// Time an unhealthy connection is left alone before a reconnect is
    /// attempted.
    pub fn reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.reconnect_cooldown = cooldown;
        self
    }

    /// Allows a later `connect` call to retry after a pool-wide connect
    /// failure instead of returning the cached error.
    pub fn retry_failed_connect(mut self, retry: bool) -> Self {
        self.config.retry_failed_connect = retry;
        self
    }

    /// Consistency used by statements that do not set their own.
    pub fn default_consistency(mut self, consistency: Consistency) -> Self {
        self.config.default_consistency = consistency;
        self
    }

    /// Finishes the configuration and creates the session, with one
    /// connection per `(pool slot, node)` pair built by `factory`.
    ///
    /// Nothing is opened yet; the pool connects lazily on first use, or
    /// eagerly via [`Session::connect`].
    pub fn build<C: Connection>(
        self,
        factory: impl Fn(&NodeAddr) -> C,
    ) -> Result<Session<C>, NewSessionError> {
        if self.known_nodes.is_empty() {
            return Err(NewSessionError::EmptyKnownNodesList);
        }
        let mut config = self.config;
        config.known_nodes = self
            .known_nodes
            .iter()
            .map(|address| NodeAddr::parse(address))
            .collect::<Result<Vec<_>, _>>()?;
        Session::new(config, factory)
    }
}
