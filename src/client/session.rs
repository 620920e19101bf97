//! The [`Session`]: the entry point for all requests against the cluster.
//!
//! A session owns a fixed pool of connections and routes every request to
//! one of them. Fatal (connection-level) errors mark the connection
//! unhealthy and reroute the request, application-level errors surface
//! untouched, and stale prepared statements are re-prepared transparently.
//! All restart triggers share one bounded retry budget
//! ([`SessionConfig::max_execute_retries`]).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::prepared_cache::{PrepareLookup, PreparedStatementCache};
use crate::errors::{
    ConnectionPoolError, ExecutionError, NewSessionError, RequestAttemptError,
};
use crate::network::connection::{Connection, ExecuteOptions, NodeAddr, PreparedId};
use crate::network::pool::{ConnectionPool, PoolConfig, PoolConnection};
use crate::response::{QueryResult, RowStream};
use crate::statement::{Consistency, Statement};
use crate::value::CqlValue;

/// Configuration of a [`Session`], usually set through a
/// [`SessionBuilder`](crate::SessionBuilder).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    /// Addresses of the cluster's nodes.
    pub known_nodes: Vec<NodeAddr>,
    /// Number of connections opened to each node.
    pub pool_size: usize,
    /// Maximum number of times a request is retried on another connection
    /// after a fatal error (or a stale prepared statement).
    pub max_execute_retries: u32,
    /// Maximum time to obtain a healthy connection from the pool.
    pub get_connection_timeout: Duration,
    /// Time an unhealthy connection is left alone before a reconnect is
    /// attempted.
    pub reconnect_cooldown: Duration,
    /// Whether a failed pool connect may be retried by a later `connect`
    /// call. When `false` (the default) the failure is cached and returned
    /// to every subsequent caller.
    pub retry_failed_connect: bool,
    /// Consistency used by statements that do not set their own.
    pub default_consistency: Consistency,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            known_nodes: Vec::new(),
            pool_size: 1,
            max_execute_retries: 3,
            get_connection_timeout: Duration::from_millis(3500),
            reconnect_cooldown: Duration::from_secs(1),
            retry_failed_connect: false,
            default_consistency: Consistency::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a config with default values.
    pub fn new() -> SessionConfig {
        SessionConfig::default()
    }
}

/// A pool of connections to a cluster, multiplexing requests across them.
///
/// Created through a [`SessionBuilder`](crate::SessionBuilder). The pool is
/// connected lazily on first use; [`Session::connect`] forces it eagerly.
#[derive(Debug)]
pub struct Session<C: Connection> {
    pool: ConnectionPool<C>,
    prepared: PreparedStatementCache,
    max_execute_retries: u32,
    default_consistency: Consistency,
}

/// Failure of the acquire-and-prepare step of the prepared flow.
enum GetPreparedError<C: Connection> {
    /// No connection could be acquired at all.
    Pool(ConnectionPoolError),
    /// The prepare attempt on the acquired connection failed.
    Attempt {
        connection: Arc<PoolConnection<C>>,
        error: RequestAttemptError,
    },
}

impl<C: Connection> Session<C> {
    /// Creates a session over connections built by `factory`, one per
    /// `(pool slot, node)` pair. Does not open anything yet.
    pub fn new(
        config: SessionConfig,
        factory: impl Fn(&NodeAddr) -> C,
    ) -> Result<Session<C>, NewSessionError> {
        if config.known_nodes.is_empty() {
            return Err(NewSessionError::EmptyKnownNodesList);
        }
        let pool_config = PoolConfig {
            pool_size: config.pool_size,
            get_connection_timeout: config.get_connection_timeout,
            reconnect_cooldown: config.reconnect_cooldown,
            retry_failed_connect: config.retry_failed_connect,
        };
        Ok(Session {
            pool: ConnectionPool::new(&config.known_nodes, pool_config, factory),
            prepared: PreparedStatementCache::new(),
            max_execute_retries: config.max_execute_retries,
            default_consistency: config.default_consistency,
        })
    }

    /// Opens every connection in the pool.
    ///
    /// Succeeds as long as at least one connection opened; only a pool-wide
    /// failure is an error. Concurrent and repeated calls share a single
    /// attempt and its cached outcome (see
    /// [`SessionConfig::retry_failed_connect`]).
    pub async fn connect(&self) -> Result<(), ExecutionError> {
        self.pool.connect().await?;
        Ok(())
    }

    /// Executes an unprepared query on some healthy connection.
    ///
    /// Fatal errors mark the connection unhealthy and retry on another one,
    /// up to the configured budget; database errors surface after exactly
    /// one attempt.
    pub async fn execute(
        &self,
        statement: impl Into<Statement>,
        params: &[CqlValue],
    ) -> Result<QueryResult, ExecutionError> {
        let statement = statement.into();
        let consistency = self.consistency_of(&statement);
        let mut attempts: u32 = 0;

        loop {
            let conn = self.pool.get_a_connection().await?;
            debug!(
                connection = conn.index,
                query = %statement.contents,
                "Connection acquired, executing"
            );
            match conn
                .connection()
                .execute(&statement.contents, params, consistency)
                .await
            {
                Ok(result) => return Ok(result),
                Err(error) if error.is_fatal() => {
                    self.mark_unhealthy(&conn);
                    attempts += 1;
                    if attempts > self.max_execute_retries {
                        return Err(ExecutionError::RetriesExhausted {
                            attempts,
                            last_error: error,
                        });
                    }
                    warn!(
                        connection = conn.index,
                        error = %error,
                        "There was an error executing the query, retrying on another connection"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Prepares the query if needed and executes it as a prepared
    /// statement.
    ///
    /// The statement is prepared at most once per connection; concurrent
    /// callers share a single in-flight preparation. If the server reports
    /// the statement as no longer known, it is re-prepared and the request
    /// retried without surfacing an error.
    pub async fn execute_prepared(
        &self,
        statement: impl Into<Statement>,
        params: &[CqlValue],
    ) -> Result<QueryResult, ExecutionError> {
        self.execute_prepared_with_options(statement.into(), params, ExecuteOptions::default())
            .await
    }

    /// Like [`Session::execute_prepared`], but delivers rows one at a time
    /// through a [`RowStream`] as soon as they are received.
    pub async fn stream_rows(
        &self,
        statement: impl Into<Statement>,
        params: &[CqlValue],
    ) -> Result<RowStream, ExecutionError> {
        let options = ExecuteOptions {
            stream_rows: true,
            stream_field: false,
        };
        self.execute_streaming(statement.into(), params, options)
            .await
    }

    /// Like [`Session::stream_rows`], but additionally delivers the last
    /// field of each row as a chunked byte stream.
    pub async fn stream_field(
        &self,
        statement: impl Into<Statement>,
        params: &[CqlValue],
    ) -> Result<RowStream, ExecutionError> {
        let options = ExecuteOptions {
            stream_rows: true,
            stream_field: true,
        };
        self.execute_streaming(statement.into(), params, options)
            .await
    }

    /// Closes every connection, concurrently and best-effort. Resolves once
    /// all of them settled, regardless of individual outcomes.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    async fn execute_streaming(
        &self,
        statement: Statement,
        params: &[CqlValue],
        options: ExecuteOptions,
    ) -> Result<RowStream, ExecutionError> {
        match self
            .execute_prepared_with_options(statement, params, options)
            .await?
            .into_row_stream()
        {
            Some(stream) => Ok(stream),
            None => Err(ExecutionError::StreamingUnsupported),
        }
    }

    async fn execute_prepared_with_options(
        &self,
        statement: Statement,
        params: &[CqlValue],
        options: ExecuteOptions,
    ) -> Result<QueryResult, ExecutionError> {
        let consistency = self.consistency_of(&statement);
        let mut attempts: u32 = 0;

        loop {
            let (conn, id) = match self.get_prepared(&statement.contents).await {
                Ok(pair) => pair,
                Err(GetPreparedError::Pool(error)) => return Err(error.into()),
                Err(GetPreparedError::Attempt { connection, error }) if error.is_fatal() => {
                    self.mark_unhealthy(&connection);
                    attempts += 1;
                    if attempts > self.max_execute_retries {
                        return Err(ExecutionError::RetriesExhausted {
                            attempts,
                            last_error: error,
                        });
                    }
                    debug!(query = %statement.contents, "Retrying to prepare");
                    continue;
                }
                Err(GetPreparedError::Attempt { error, .. }) => return Err(error.into()),
            };

            debug!(
                connection = conn.index,
                query = %statement.contents,
                "Executing prepared query"
            );
            match conn
                .connection()
                .execute_prepared(&id, params, consistency, &options)
                .await
            {
                Ok(result) => return Ok(result),
                Err(error) if error.is_fatal() => {
                    self.mark_unhealthy(&conn);
                    attempts += 1;
                    if attempts > self.max_execute_retries {
                        return Err(ExecutionError::RetriesExhausted {
                            attempts,
                            last_error: error,
                        });
                    }
                    warn!(
                        connection = conn.index,
                        error = %error,
                        "There was an error executing the prepared query, \
                         retrying on another connection"
                    );
                }
                Err(error) if error.unprepared_id().is_some() => {
                    // The statement expired server-side; drop this
                    // connection's record and run the whole flow again.
                    self.prepared
                        .remove_connection_statement(&statement.contents, conn.index);
                    attempts += 1;
                    if attempts > self.max_execute_retries {
                        return Err(ExecutionError::RetriesExhausted {
                            attempts,
                            last_error: error,
                        });
                    }
                    debug!(
                        connection = conn.index,
                        query = %statement.contents,
                        "Prepared statement expired on the server, re-preparing"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Acquires a connection and ensures the query is prepared on it,
    /// coalescing with any in-flight preparation of the same pair.
    async fn get_prepared(
        &self,
        query: &str,
    ) -> Result<(Arc<PoolConnection<C>>, PreparedId), GetPreparedError<C>> {
        let conn = self
            .pool
            .get_a_connection()
            .await
            .map_err(GetPreparedError::Pool)?;

        loop {
            match self.prepared.lookup(query, conn.index) {
                PrepareLookup::Ready(id) => return Ok((conn, id)),
                PrepareLookup::Wait(mut outcome) => match outcome.recv().await {
                    Ok(Ok(id)) => return Ok((conn, id)),
                    Ok(Err(error)) => {
                        return Err(GetPreparedError::Attempt {
                            connection: conn,
                            error,
                        })
                    }
                    // The in-flight preparation went away without an
                    // outcome; look the state up again.
                    Err(_) => continue,
                },
                PrepareLookup::Prepare(ticket) => {
                    debug!(connection = conn.index, query, "Preparing query on connection");
                    match conn.connection().prepare(query).await {
                        Ok(id) => {
                            self.prepared.complete(query, conn.index, ticket, id.clone());
                            return Ok((conn, id));
                        }
                        Err(error) => {
                            self.prepared.fail(query, conn.index, ticket, error.clone());
                            return Err(GetPreparedError::Attempt {
                                connection: conn,
                                error,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Health-tracker transition to unhealthy. On an actual transition the
    /// connection's prepared-statement records are dropped at once, so no
    /// later attempt can trust an id prepared on it.
    fn mark_unhealthy(&self, conn: &PoolConnection<C>) {
        if conn.set_unhealthy() {
            self.prepared.remove_connection(conn.index);
        }
    }

    fn consistency_of(&self, statement: &Statement) -> Consistency {
        statement
            .config
            .consistency
            .unwrap_or(self.default_consistency)
    }
}
