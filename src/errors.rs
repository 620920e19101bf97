//! Error types of the crate.
//!
//! The coordinator distinguishes three classes of request failures:
//! * fatal / connection-level ([`RequestAttemptError::is_fatal`]) — the
//!   connection is unusable, the request may be retried on another one,
//! * application-level — the query itself was rejected, retrying cannot help,
//! * stale-prepared ([`RequestAttemptError::unprepared_id`]) — the server no
//!   longer knows a previously prepared statement id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use itertools::Itertools;
use thiserror::Error;

/// An error that occurred while opening or closing a connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionError {
    /// Input/Output error, e.g. the host refused the connection.
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The connection attempt did not finish in time.
    #[error("Connect timeout")]
    ConnectTimeout,

    /// Any other failure reported by the connection implementation.
    #[error("Connection error: {0}")]
    Other(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> ConnectionError {
        ConnectionError::Io(Arc::new(err))
    }
}

/// A transport-level failure of an established connection.
///
/// Cheaply cloneable; the kind is behind an `Arc` so the error can be
/// broadcast to every waiter of a coalesced operation.
#[derive(Error, Debug, Clone)]
#[error("Connection broken: {0}")]
pub struct BrokenConnectionError(Arc<BrokenConnectionErrorKind>);

impl BrokenConnectionError {
    /// What caused the connection to break.
    pub fn kind(&self) -> &BrokenConnectionErrorKind {
        &self.0
    }
}

impl From<BrokenConnectionErrorKind> for BrokenConnectionError {
    fn from(kind: BrokenConnectionErrorKind) -> BrokenConnectionError {
        BrokenConnectionError(Arc::new(kind))
    }
}

/// The reason a connection was deemed broken.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BrokenConnectionErrorKind {
    /// Input/Output error on the socket.
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server closed the connection.
    #[error("Connection closed by the server")]
    ClosedByServer,

    /// The server stopped responding.
    #[error("The server did not respond in time")]
    Timeout,
}

/// An error response sent by the database.
///
/// All of these concern the query itself and leave the connection usable;
/// the exception is [`DbError::Unprepared`], which triggers a transparent
/// re-prepare of the statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DbError {
    /// The submitted query has a syntax error.
    #[error("The submitted query has a syntax error")]
    SyntaxError,

    /// The query is syntactically correct but invalid.
    #[error("The query is syntactically correct but invalid")]
    Invalid,

    /// The logged user doesn't have the right to perform the query.
    #[error("The logged user doesn't have the right to perform the query")]
    Unauthorized,

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationError,

    /// Internal server error: this indicates a server-side bug.
    #[error("Internal server error. This indicates a server-side bug")]
    ServerError,

    /// The server does not know the prepared statement with the given id,
    /// usually because its statement cache was invalidated.
    #[error("Not prepared: tried to execute an unknown prepared statement")]
    Unprepared {
        /// The prepared statement id the server no longer recognizes.
        statement_id: Bytes,
    },

    /// An error code this crate does not recognize.
    #[error("Other error code: {0}")]
    Other(i32),
}

/// An error of a single request attempt on a single connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RequestAttemptError {
    /// Database sent a response containing some error with a message.
    #[error("Database returned an error: {0}, Error message: {1}")]
    DbError(DbError, String),

    /// The connection broke while the request was in flight.
    #[error(transparent)]
    BrokenConnection(#[from] BrokenConnectionError),

    /// Client timeout occurred before any response arrived.
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
}

impl RequestAttemptError {
    /// `true` for transport-level failures, after which the connection must
    /// be considered unusable and the request rerouted.
    pub fn is_fatal(&self) -> bool {
        match self {
            RequestAttemptError::BrokenConnection(_) | RequestAttemptError::RequestTimeout(_) => {
                true
            }
            RequestAttemptError::DbError(_, _) => false,
        }
    }

    /// The statement id the server reported as unknown, if this is a
    /// stale-prepared error.
    pub fn unprepared_id(&self) -> Option<&Bytes> {
        match self {
            RequestAttemptError::DbError(DbError::Unprepared { statement_id }, _) => {
                Some(statement_id)
            }
            _ => None,
        }
    }
}

/// Every connection in the pool failed to open.
///
/// Carries the individual failure of each connection, indexed by pool index.
#[derive(Debug, Clone)]
pub struct PoolConnectError {
    /// One error per connection in the pool.
    pub errors: Vec<(usize, ConnectionError)>,
}

impl fmt::Display for PoolConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All {} connections in the pool failed to open: [{}]",
            self.errors.len(),
            self.errors
                .iter()
                .format_with(", ", |(index, err), f| f(&format_args!("#{index}: {err}")))
        )
    }
}

impl std::error::Error for PoolConnectError {}

/// Failed to hand out a usable connection from the pool.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectionPoolError {
    /// The initial bulk connect failed on every connection.
    #[error("{0}")]
    PoolConnect(#[from] Arc<PoolConnectError>),

    /// No healthy connection was found within the configured window.
    #[error("Timed out after {elapsed:?} while waiting for a healthy connection")]
    AcquisitionTimeout {
        /// How long the scan ran before giving up.
        elapsed: Duration,
    },
}

/// Error of a whole request execution, as surfaced to the caller.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ExecutionError {
    /// No connection could be acquired from the pool.
    #[error(transparent)]
    ConnectionPool(#[from] ConnectionPoolError),

    /// Fatal errors kept occurring until the retry budget ran out.
    /// `attempts` is the total number of attempts performed.
    #[error("Request failed after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted {
        /// Total number of attempts performed, including the first one.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        last_error: RequestAttemptError,
    },

    /// The request failed with an error that retrying cannot help with.
    #[error(transparent)]
    RequestAttempt(#[from] RequestAttemptError),

    /// A streaming request got a buffered result back from the connection.
    #[error("The connection returned a non-streamed result for a streaming request")]
    StreamingUnsupported,
}

impl From<Arc<PoolConnectError>> for ExecutionError {
    fn from(err: Arc<PoolConnectError>) -> ExecutionError {
        ExecutionError::ConnectionPool(ConnectionPoolError::PoolConnect(err))
    }
}

/// Error that occurred during session creation.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum NewSessionError {
    /// List of known nodes passed to the builder is empty.
    /// There needs to be at least one node to connect to.
    #[error("Empty known nodes list")]
    EmptyKnownNodesList,

    /// A known node could not be parsed as `host` or `host:port`.
    #[error("Invalid node address: {0}")]
    InvalidNodeAddress(String),
}
