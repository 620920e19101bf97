//! Results of query execution.

pub mod query_result;

pub use query_result::{FieldStream, QueryResult, Row, RowStream, StreamedRow};
