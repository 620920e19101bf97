//! Query results and the streaming delivery channels.
//!
//! A connection answers a request either with a buffered result
//! ([`QueryResult::Void`] / [`QueryResult::Rows`]) or, when asked to via
//! [`ExecuteOptions`](crate::ExecuteOptions), with a [`RowStream`] that
//! delivers rows as they are received. The streams are thin wrappers over
//! an mpsc channel whose sending half is handed to the connection
//! implementation.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::errors::RequestAttemptError;
use crate::value::CqlValue;

/// A single result row. A `None` column is a null value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// The column values, in selection order.
    pub columns: Vec<Option<CqlValue>>,
}

impl Row {
    /// Creates a row from its column values.
    pub fn new(columns: Vec<Option<CqlValue>>) -> Row {
        Row { columns }
    }
}

/// Result of a query execution.
#[derive(Debug)]
#[non_exhaustive]
pub enum QueryResult {
    /// The query returned no result set (e.g. an `INSERT` or a DDL
    /// statement).
    Void,
    /// All rows, buffered in one response.
    Rows(Vec<Row>),
    /// Rows delivered one at a time as they are received.
    Stream(RowStream),
}

impl QueryResult {
    /// Returns the buffered rows, if any.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Consumes the result into its buffered rows, if any.
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Consumes the result into its row stream, if it is a streamed one.
    pub fn into_row_stream(self) -> Option<RowStream> {
        match self {
            QueryResult::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

/// A row received through a [`RowStream`].
#[derive(Debug)]
pub struct StreamedRow {
    /// The row itself. With last-field streaming enabled the last column is
    /// omitted from `row` and delivered through `last_field` instead.
    pub row: Row,
    /// Chunked content of the last field, present only when the request
    /// asked for last-field streaming.
    pub last_field: Option<FieldStream>,
}

/// Stream of rows delivered as soon as the connection receives them.
#[derive(Debug)]
pub struct RowStream {
    receiver: mpsc::Receiver<Result<StreamedRow, RequestAttemptError>>,
}

impl RowStream {
    /// Creates a stream together with its sending half.
    ///
    /// Connection implementations call this when handling a request with
    /// `stream_rows` set and push rows into the sender from their read loop.
    pub fn channel(
        buffer: usize,
    ) -> (
        mpsc::Sender<Result<StreamedRow, RequestAttemptError>>,
        RowStream,
    ) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, RowStream { receiver })
    }

    /// Receives the next row, `None` once the stream is exhausted.
    pub async fn next_row(&mut self) -> Option<Result<StreamedRow, RequestAttemptError>> {
        self.receiver.recv().await
    }
}

impl Stream for RowStream {
    type Item = Result<StreamedRow, RequestAttemptError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Chunked content of a streamed field.
#[derive(Debug)]
pub struct FieldStream {
    receiver: mpsc::Receiver<Bytes>,
}

impl FieldStream {
    /// Creates a stream together with its sending half.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Bytes>, FieldStream) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, FieldStream { receiver })
    }

    /// Receives the next chunk, `None` once the field is complete.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

impl Stream for FieldStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
