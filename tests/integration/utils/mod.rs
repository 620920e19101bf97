//! A scripted in-memory cluster used to drive the pool through every
//! failure mode without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cql_pool::errors::{
    BrokenConnectionErrorKind, ConnectionError, DbError, RequestAttemptError,
};
use cql_pool::{
    Connection, Consistency, CqlValue, ExecuteOptions, FieldStream, NodeAddr, PreparedId,
    QueryResult, Row, RowStream, Session, SessionBuilder, StreamedRow,
};

pub(crate) fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(tracing_subscriber::fmt::TestWriter::new())
        .try_init();
}

/// What a scripted operation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    Ok,
    /// Fail with a fatal, connection-level error.
    Fatal,
    /// Fail with an application-level error.
    SyntaxError,
    /// Fail reporting the prepared statement as unknown.
    Unprepared,
}

fn script_error(script: Script) -> RequestAttemptError {
    match script {
        Script::Fatal => {
            RequestAttemptError::BrokenConnection(BrokenConnectionErrorKind::ClosedByServer.into())
        }
        Script::SyntaxError => {
            RequestAttemptError::DbError(DbError::SyntaxError, "line 1: bad token".to_owned())
        }
        Script::Ok | Script::Unprepared => unreachable!("not an error script"),
    }
}

/// Observable state and behavior knobs of one mock connection.
pub(crate) struct ConnState {
    pub(crate) node: NodeAddr,

    pub(crate) open_count: AtomicUsize,
    pub(crate) close_count: AtomicUsize,
    pub(crate) execute_count: AtomicUsize,
    pub(crate) prepare_count: AtomicUsize,
    pub(crate) execute_prepared_count: AtomicUsize,

    /// While set, `open` fails.
    pub(crate) fail_open: AtomicBool,
    /// While set, `close` fails.
    pub(crate) fail_close: AtomicBool,
    /// Sleep inserted before `open` answers.
    pub(crate) open_delay: Mutex<Option<Duration>>,
    /// Sleep inserted before `prepare` answers, to hold a preparation in
    /// flight while concurrent callers pile up.
    pub(crate) prepare_delay: Mutex<Option<Duration>>,
    /// While set, streaming requests get a buffered result anyway.
    pub(crate) ignore_streaming: AtomicBool,

    /// One-shot scripts consumed per call; when empty the default applies.
    pub(crate) execute_script: Mutex<VecDeque<Script>>,
    pub(crate) execute_default: Mutex<Script>,
    pub(crate) prepare_script: Mutex<VecDeque<Script>>,
    pub(crate) prepare_default: Mutex<Script>,
    pub(crate) execute_prepared_script: Mutex<VecDeque<Script>>,
    pub(crate) execute_prepared_default: Mutex<Script>,

    pub(crate) last_options: Mutex<Option<ExecuteOptions>>,
    pub(crate) last_consistency: Mutex<Option<Consistency>>,
}

impl ConnState {
    fn new(node: NodeAddr) -> ConnState {
        ConnState {
            node,
            open_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            execute_count: AtomicUsize::new(0),
            prepare_count: AtomicUsize::new(0),
            execute_prepared_count: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            open_delay: Mutex::new(None),
            prepare_delay: Mutex::new(None),
            ignore_streaming: AtomicBool::new(false),
            execute_script: Mutex::new(VecDeque::new()),
            execute_default: Mutex::new(Script::Ok),
            prepare_script: Mutex::new(VecDeque::new()),
            prepare_default: Mutex::new(Script::Ok),
            execute_prepared_script: Mutex::new(VecDeque::new()),
            execute_prepared_default: Mutex::new(Script::Ok),
            last_options: Mutex::new(None),
            last_consistency: Mutex::new(None),
        }
    }

    pub(crate) fn push_execute(&self, script: Script) {
        self.execute_script.lock().unwrap().push_back(script);
    }

    pub(crate) fn push_execute_prepared(&self, script: Script) {
        self.execute_prepared_script.lock().unwrap().push_back(script);
    }

    pub(crate) fn set_execute_default(&self, script: Script) {
        *self.execute_default.lock().unwrap() = script;
    }

    pub(crate) fn set_prepare_default(&self, script: Script) {
        *self.prepare_default.lock().unwrap() = script;
    }

    pub(crate) fn set_execute_prepared_default(&self, script: Script) {
        *self.execute_prepared_default.lock().unwrap() = script;
    }

    fn next(&self, script: &Mutex<VecDeque<Script>>, default: &Mutex<Script>) -> Script {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*default.lock().unwrap())
    }
}

/// The mock `Connection` implementation handed to the pool.
pub(crate) struct MockConnection {
    state: Arc<ConnState>,
}

impl MockConnection {
    fn buffered_row(&self) -> Row {
        Row::new(vec![
            Some(CqlValue::Int(1)),
            Some(CqlValue::Text(self.state.node.to_string())),
        ])
    }

    fn streamed_result(&self, stream_field: bool) -> QueryResult {
        let (sender, stream) = RowStream::channel(8);
        for i in 0..3 {
            let last_field = stream_field.then(|| {
                let (chunk_sender, field) = FieldStream::channel(4);
                chunk_sender
                    .try_send(Bytes::from(format!("chunk-{i}-a")))
                    .unwrap();
                chunk_sender
                    .try_send(Bytes::from(format!("chunk-{i}-b")))
                    .unwrap();
                field
            });
            let mut columns = vec![Some(CqlValue::Int(i))];
            if !stream_field {
                columns.push(Some(CqlValue::Text(format!("value-{i}"))));
            }
            sender
                .try_send(Ok(StreamedRow {
                    row: Row::new(columns),
                    last_field,
                }))
                .unwrap();
        }
        QueryResult::Stream(stream)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn open(&self) -> Result<(), ConnectionError> {
        let delay = *self.state.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_open.load(Ordering::SeqCst) {
            Err(ConnectionError::ConnectTimeout)
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            Err(ConnectionError::Other("close refused".to_owned()))
        } else {
            Ok(())
        }
    }

    async fn execute(
        &self,
        _query: &str,
        _params: &[CqlValue],
        consistency: Consistency,
    ) -> Result<QueryResult, RequestAttemptError> {
        self.state.execute_count.fetch_add(1, Ordering::SeqCst);
        *self.state.last_consistency.lock().unwrap() = Some(consistency);
        match self
            .state
            .next(&self.state.execute_script, &self.state.execute_default)
        {
            Script::Ok => Ok(QueryResult::Rows(vec![self.buffered_row()])),
            script => Err(script_error(script)),
        }
    }

    async fn prepare(&self, _query: &str) -> Result<PreparedId, RequestAttemptError> {
        let delay = *self.state.prepare_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.state.prepare_count.fetch_add(1, Ordering::SeqCst);
        match self
            .state
            .next(&self.state.prepare_script, &self.state.prepare_default)
        {
            Script::Ok => Ok(Bytes::from(format!("{}/stmt-{}", self.state.node, n))),
            script => Err(script_error(script)),
        }
    }

    async fn execute_prepared(
        &self,
        id: &PreparedId,
        _params: &[CqlValue],
        consistency: Consistency,
        options: &ExecuteOptions,
    ) -> Result<QueryResult, RequestAttemptError> {
        self.state
            .execute_prepared_count
            .fetch_add(1, Ordering::SeqCst);
        *self.state.last_options.lock().unwrap() = Some(*options);
        *self.state.last_consistency.lock().unwrap() = Some(consistency);
        match self.state.next(
            &self.state.execute_prepared_script,
            &self.state.execute_prepared_default,
        ) {
            Script::Ok => {
                if options.stream_rows && !self.state.ignore_streaming.load(Ordering::SeqCst) {
                    Ok(self.streamed_result(options.stream_field))
                } else {
                    Ok(QueryResult::Rows(vec![self.buffered_row()]))
                }
            }
            Script::Unprepared => Err(RequestAttemptError::DbError(
                DbError::Unprepared {
                    statement_id: id.clone(),
                },
                "statement expired".to_owned(),
            )),
            script => Err(script_error(script)),
        }
    }
}

/// Tracks every connection the factory created, in pool-index order.
pub(crate) struct MockCluster {
    conns: Arc<Mutex<Vec<Arc<ConnState>>>>,
}

impl MockCluster {
    pub(crate) fn new() -> MockCluster {
        MockCluster {
            conns: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn session(&self, builder: SessionBuilder) -> Session<MockConnection> {
        let conns = self.conns.clone();
        builder
            .build(move |node| {
                let state = Arc::new(ConnState::new(node.clone()));
                conns.lock().unwrap().push(state.clone());
                MockConnection { state }
            })
            .unwrap()
    }

    pub(crate) fn conn(&self, pool_index: usize) -> Arc<ConnState> {
        self.conns.lock().unwrap()[pool_index].clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.lock().unwrap().len()
    }
}

/// A builder with timings tightened for tests: a short acquisition window
/// and no reconnect cooldown.
pub(crate) fn test_builder(hosts: usize) -> SessionBuilder {
    let mut builder = SessionBuilder::new();
    for i in 0..hosts {
        builder = builder.known_node(format!("10.1.0.{i}"));
    }
    builder
        .get_connection_timeout(Duration::from_millis(500))
        .reconnect_cooldown(Duration::ZERO)
}
