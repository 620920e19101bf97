//! The `Connection` trait: the boundary between the pool and the wire.
//!
//! This crate does not speak the binary protocol itself. A connection owns
//! one socket to one node and knows how to encode and decode frames; the
//! pool owns many connections and decides which one a request goes to.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{ConnectionError, NewSessionError, RequestAttemptError};
use crate::response::QueryResult;
use crate::statement::Consistency;
use crate::value::CqlValue;

/// Default CQL port, used when a known node is given without one.
pub(crate) const DEFAULT_PORT: u16 = 9042;

/// Server-assigned id of a prepared statement.
pub type PreparedId = Bytes;

/// Address of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl NodeAddr {
    /// Creates a node address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> NodeAddr {
        NodeAddr {
            host: host.into(),
            port,
        }
    }

    /// Parses `"host"` or `"host:port"`, defaulting to port 9042.
    pub(crate) fn parse(address: &str) -> Result<NodeAddr, NewSessionError> {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| NewSessionError::InvalidNodeAddress(address.to_owned()))?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(NewSessionError::InvalidNodeAddress(address.to_owned()));
        }
        Ok(NodeAddr::new(host, port))
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options consumed by the connection when executing a prepared statement.
///
/// These only shape how the result is delivered; they have no effect on
/// routing, retries or the prepared-statement cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Deliver rows one at a time, as soon as they are received, through a
    /// [`RowStream`](crate::RowStream).
    pub stream_rows: bool,
    /// Additionally deliver the last field of each row as a chunked byte
    /// stream. Implies row streaming.
    pub stream_field: bool,
}

/// One connection to one node.
///
/// Implementations own the socket and the protocol; every method suspends
/// until the server answered (or the transport failed). Request errors are
/// classified through [`RequestAttemptError`]: transport-level failures are
/// fatal and make the pool route subsequent work elsewhere, while database
/// error responses leave the connection in use.
///
/// A connection is created once per pool slot and may be reopened many
/// times over its life; `open` must therefore be callable again after a
/// failure or a broken transport.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Establishes (or re-establishes) the transport.
    async fn open(&self) -> Result<(), ConnectionError>;

    /// Closes the transport. Best effort; must always resolve.
    async fn close(&self) -> Result<(), ConnectionError>;

    /// Executes an unprepared query.
    async fn execute(
        &self,
        query: &str,
        params: &[CqlValue],
        consistency: Consistency,
    ) -> Result<QueryResult, RequestAttemptError>;

    /// Parses a query on the server, yielding its statement id.
    async fn prepare(&self, query: &str) -> Result<PreparedId, RequestAttemptError>;

    /// Executes a previously prepared statement.
    ///
    /// A server that no longer knows `id` reports
    /// [`DbError::Unprepared`](crate::errors::DbError::Unprepared); the pool
    /// reacts by re-preparing transparently.
    async fn execute_prepared(
        &self,
        id: &PreparedId,
        params: &[CqlValue],
        consistency: Consistency,
        options: &ExecuteOptions,
    ) -> Result<QueryResult, RequestAttemptError>;
}
