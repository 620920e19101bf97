//! Async connection-pool layer for clusters speaking a binary CQL-style
//! protocol over persistent TCP connections.
//!
//! The crate multiplexes requests across a fixed pool of connections to one
//! or more nodes, survives individual connection and node failures by
//! rerouting work, and keeps a per-connection cache of server-assigned
//! prepared-statement ids so repeated queries avoid re-parsing on the
//! server. The wire protocol itself is not part of this crate: it lives
//! behind the [`Connection`] trait, implemented by the transport of your
//! choice.
//!
//! # Driver overview
//! ### Connecting
//! All activity revolves around the [`Session`], created through a
//! [`SessionBuilder`] from a few known nodes and a connection factory:
//!
//! ```rust,no_run
//! use cql_pool::{Session, SessionBuilder};
//! # use cql_pool::{Connection, Consistency, CqlValue, ExecuteOptions, NodeAddr};
//! # use cql_pool::{PreparedId, QueryResult};
//! # use cql_pool::errors::{ConnectionError, RequestAttemptError};
//! # struct MyConnection;
//! # impl MyConnection {
//! #     fn new(_node: &NodeAddr) -> Self { MyConnection }
//! # }
//! # #[async_trait::async_trait]
//! # impl Connection for MyConnection {
//! #     async fn open(&self) -> Result<(), ConnectionError> { Ok(()) }
//! #     async fn close(&self) -> Result<(), ConnectionError> { Ok(()) }
//! #     async fn execute(&self, _: &str, _: &[CqlValue], _: Consistency)
//! #         -> Result<QueryResult, RequestAttemptError> { Ok(QueryResult::Void) }
//! #     async fn prepare(&self, _: &str) -> Result<PreparedId, RequestAttemptError> {
//! #         unimplemented!()
//! #     }
//! #     async fn execute_prepared(&self, _: &PreparedId, _: &[CqlValue], _: Consistency,
//! #         _: &ExecuteOptions) -> Result<QueryResult, RequestAttemptError> { unimplemented!() }
//! # }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session: Session<MyConnection> = SessionBuilder::new()
//!     .known_node("127.0.0.1:9042")
//!     .known_node("1.2.3.4:9876")
//!     .build(|node| MyConnection::new(node))?;
//!
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The pool also connects lazily: the first request triggers the bulk
//! connect if [`Session::connect`] was never called. Opening the pool
//! succeeds as long as at least one connection came up.
//!
//! ### Making queries
//! * [`Session::execute`] — run a query as-is,
//! * [`Session::execute_prepared`] — prepare once per connection (cached,
//!   coalesced) and execute the prepared statement,
//! * [`Session::stream_rows`] / [`Session::stream_field`] — prepared
//!   execution with rows delivered through a [`RowStream`] as they arrive.
//!
//! ```rust,no_run
//! # use cql_pool::{CqlValue, Session};
//! # async fn check_only_compiles(
//! #     session: &Session<impl cql_pool::Connection>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! session
//!     .execute_prepared(
//!         "INSERT INTO ks.tab (a, b) VALUES(?, ?)",
//!         &[CqlValue::Int(2), CqlValue::Text("some text".to_owned())],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Failure handling
//! Request errors fall in three classes (see [`errors`]): fatal
//! connection-level errors mark the connection unhealthy — dropping its
//! cached prepared statements — and reroute the request to another
//! connection; application-level errors surface unchanged after a single
//! attempt; a stale prepared statement is re-prepared transparently.
//! Unhealthy connections are reconnected after a cooldown, on demand.

pub mod client;
pub mod errors;
pub mod network;
pub mod response;
pub mod statement;
pub mod value;

pub use client::session::{Session, SessionConfig};
pub use client::session_builder::SessionBuilder;
pub use network::connection::{Connection, ExecuteOptions, NodeAddr, PreparedId};
pub use response::query_result::{FieldStream, QueryResult, Row, RowStream, StreamedRow};
pub use statement::{Consistency, CqlBuildError, CqlBuilder, Statement};
pub use value::CqlValue;
