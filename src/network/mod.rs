//! The connection boundary and the pool built on top of it.

pub mod connection;
pub(crate) mod pool;

pub use connection::{Connection, ExecuteOptions, NodeAddr, PreparedId};
