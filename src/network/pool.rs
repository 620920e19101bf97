//! The fixed-size connection pool: health tracking, lazy bulk connect and
//! the round-robin selector.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::errors::{ConnectionPoolError, PoolConnectError};
use crate::network::connection::{Connection, NodeAddr};

type ConnectResult = Result<(), Arc<PoolConnectError>>;

/// Pool behavior knobs, extracted from the session configuration.
#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    /// Connections opened per host.
    pub(crate) pool_size: usize,
    /// Wall-clock bound of a single selector scan.
    pub(crate) get_connection_timeout: Duration,
    /// Time an unhealthy connection must stay untouched before a reconnect
    /// is attempted.
    pub(crate) reconnect_cooldown: Duration,
    /// Whether a cached pool-wide connect failure is cleared on the next
    /// `connect` call instead of being returned again.
    pub(crate) retry_failed_connect: bool,
}

#[derive(Debug)]
enum Health {
    Healthy,
    Unhealthy { since: Instant },
}

/// One slot of the pool: a connection plus its health bookkeeping.
///
/// The pool index is the connection's identity; it is assigned once at pool
/// construction and the slot is never rebound to a different node.
#[derive(Debug)]
pub(crate) struct PoolConnection<C> {
    pub(crate) index: usize,
    pub(crate) node: NodeAddr,
    conn: C,
    health: Mutex<Health>,
    reconnecting: AtomicBool,
}

impl<C: Connection> PoolConnection<C> {
    pub(crate) fn connection(&self) -> &C {
        &self.conn
    }

    pub(crate) fn is_healthy(&self) -> bool {
        matches!(*self.health.lock().unwrap(), Health::Healthy)
    }

    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        match *self.health.lock().unwrap() {
            Health::Unhealthy { since } => since.elapsed() > cooldown,
            Health::Healthy => false,
        }
    }

    pub(crate) fn set_healthy(&self) {
        *self.health.lock().unwrap() = Health::Healthy;
        debug!(connection = self.index, node = %self.node, "Connection is healthy");
    }

    /// Marks the connection unhealthy, stamping the cooldown clock.
    /// Returns `true` on a healthy-to-unhealthy transition; the caller must
    /// then drop the connection's prepared-statement cache entries.
    pub(crate) fn set_unhealthy(&self) -> bool {
        let mut health = self.health.lock().unwrap();
        match *health {
            Health::Healthy => {
                warn!(connection = self.index, node = %self.node, "Connection is being set to unhealthy");
                *health = Health::Unhealthy {
                    since: Instant::now(),
                };
                true
            }
            Health::Unhealthy { .. } => false,
        }
    }

    /// Restamps the cooldown clock after a failed reconnect, so a dead node
    /// is probed at most once per cooldown window.
    fn note_reconnect_failure(&self) {
        *self.health.lock().unwrap() = Health::Unhealthy {
            since: Instant::now(),
        };
    }
}

#[derive(Debug)]
enum ConnectState {
    NotStarted,
    InProgress(broadcast::Sender<ConnectResult>),
    Done(ConnectResult),
}

enum ConnectRole {
    Resolved(ConnectResult),
    Waiter(broadcast::Receiver<ConnectResult>),
    Leader,
}

/// The fixed set of connections together with the rotating cursor.
///
/// Built once from `pool_size × hosts`; never resized. All requests go
/// through [`ConnectionPool::get_a_connection`].
#[derive(Debug)]
pub(crate) struct ConnectionPool<C> {
    conns: Vec<Arc<PoolConnection<C>>>,
    cursor: AtomicUsize,
    connect_state: Mutex<ConnectState>,
    config: PoolConfig,
}

impl<C: Connection> ConnectionPool<C> {
    pub(crate) fn new(
        nodes: &[NodeAddr],
        config: PoolConfig,
        factory: impl Fn(&NodeAddr) -> C,
    ) -> ConnectionPool<C> {
        let mut conns = Vec::with_capacity(config.pool_size * nodes.len());
        for _ in 0..config.pool_size {
            for node in nodes {
                conns.push(Arc::new(PoolConnection {
                    index: conns.len(),
                    node: node.clone(),
                    conn: factory(node),
                    health: Mutex::new(Health::Healthy),
                    reconnecting: AtomicBool::new(false),
                }));
            }
        }
        info!(
            connections = conns.len(),
            hosts = nodes.len(),
            "Created connection pool"
        );
        ConnectionPool {
            conns,
            cursor: AtomicUsize::new(0),
            connect_state: Mutex::new(ConnectState::NotStarted),
            config,
        }
    }

    /// Opens every connection in the pool, once, lazily.
    ///
    /// Callers arriving while an attempt is underway wait for that attempt
    /// instead of starting another one. The outcome is cached: partial
    /// failures count as success, and a pool-wide failure is returned again
    /// on subsequent calls unless `retry_failed_connect` is set.
    pub(crate) async fn connect(&self) -> ConnectResult {
        loop {
            let role = {
                let mut state = self.connect_state.lock().unwrap();
                match &*state {
                    ConnectState::Done(Ok(())) => ConnectRole::Resolved(Ok(())),
                    ConnectState::Done(Err(err)) if !self.config.retry_failed_connect => {
                        ConnectRole::Resolved(Err(err.clone()))
                    }
                    ConnectState::InProgress(notify) => {
                        debug!("Waiting for the pool to connect");
                        ConnectRole::Waiter(notify.subscribe())
                    }
                    ConnectState::NotStarted | ConnectState::Done(Err(_)) => {
                        let (notify, _) = broadcast::channel(1);
                        *state = ConnectState::InProgress(notify);
                        ConnectRole::Leader
                    }
                }
            };

            match role {
                ConnectRole::Resolved(result) => return result,
                ConnectRole::Waiter(mut receiver) => {
                    if let Ok(result) = receiver.recv().await {
                        return result;
                    }
                    // The connecting task went away without an outcome;
                    // re-inspect the state.
                }
                ConnectRole::Leader => {
                    let result = self.open_all().await;
                    let mut state = self.connect_state.lock().unwrap();
                    let previous =
                        std::mem::replace(&mut *state, ConnectState::Done(result.clone()));
                    drop(state);
                    if let ConnectState::InProgress(notify) = previous {
                        let _ = notify.send(result.clone());
                    }
                    return result;
                }
            }
        }
    }

    async fn open_all(&self) -> ConnectResult {
        debug!("Connecting to all hosts");
        let outcomes = join_all(self.conns.iter().map(|conn| async move {
            let result = conn.connection().open().await;
            (conn, result)
        }))
        .await;

        let mut errors = Vec::new();
        for (conn, result) in outcomes {
            match result {
                Ok(()) => {
                    debug!(connection = conn.index, node = %conn.node, "Opened connection");
                }
                Err(err) => {
                    warn!(
                        connection = conn.index,
                        node = %conn.node,
                        error = %err,
                        "There was an error opening the connection"
                    );
                    conn.set_unhealthy();
                    errors.push((conn.index, err));
                }
            }
        }

        if errors.len() == self.conns.len() {
            Err(Arc::new(PoolConnectError { errors }))
        } else {
            Ok(())
        }
    }

    /// Hands out one usable connection, or times out.
    ///
    /// Scans circularly from the cursor. Healthy connections are returned
    /// immediately; unhealthy ones whose cooldown elapsed get one reconnect
    /// attempt. Every skipped candidate yields to the scheduler so a fully
    /// unhealthy pool does not monopolize it while the timeout runs down.
    pub(crate) async fn get_a_connection(
        &self,
    ) -> Result<Arc<PoolConnection<C>>, ConnectionPoolError> {
        self.connect().await?;

        let start = Instant::now();
        loop {
            let conn = self.next_candidate();
            trace!(connection = conn.index, "Checking next connection");

            if conn.is_healthy() {
                return Ok(conn);
            }

            let elapsed = start.elapsed();
            if elapsed > self.config.get_connection_timeout {
                return Err(ConnectionPoolError::AcquisitionTimeout { elapsed });
            }

            if conn.cooldown_elapsed(self.config.reconnect_cooldown)
                && conn
                    .reconnecting
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                debug!(connection = conn.index, node = %conn.node, "Retrying to open connection");
                let result = conn.connection().open().await;
                conn.reconnecting.store(false, Ordering::Release);
                match result {
                    Ok(()) => {
                        conn.set_healthy();
                        return Ok(conn);
                    }
                    Err(err) => {
                        warn!(
                            connection = conn.index,
                            node = %conn.node,
                            error = %err,
                            "Reconnect attempt failed"
                        );
                        conn.note_reconnect_failure();
                    }
                }
            }

            tokio::task::yield_now().await;
        }
    }

    fn next_candidate(&self) -> Arc<PoolConnection<C>> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns[index].clone()
    }

    /// Closes every connection concurrently, best effort.
    pub(crate) async fn shutdown(&self) {
        debug!("Closing all connections");
        join_all(self.conns.iter().map(|conn| async move {
            if let Err(err) = conn.connection().close().await {
                warn!(connection = conn.index, error = %err, "Error closing connection");
            }
        }))
        .await;
        info!("Connection pool shut down");
    }
}
