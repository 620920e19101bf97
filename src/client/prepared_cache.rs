//! The prepared-statement cache.
//!
//! Tracks, per (query text, connection), whether the statement is prepared
//! and under which server-assigned id. Concurrent callers racing to prepare
//! the same statement on the same connection are coalesced into a single
//! server round trip: the first caller becomes the preparer, everyone else
//! subscribes to its outcome.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::RequestAttemptError;
use crate::network::connection::PreparedId;

type PrepareOutcome = Result<PreparedId, RequestAttemptError>;

#[derive(Debug)]
enum PrepareState {
    /// A prepare request is in flight. `notify` broadcasts its outcome to
    /// every waiter; `token` ties the in-flight attempt to its ticket so a
    /// late completion cannot resurrect an evicted entry.
    Preparing {
        token: u64,
        notify: broadcast::Sender<PrepareOutcome>,
    },
    Prepared(PreparedId),
}

#[derive(Debug, Default)]
struct PreparedEntry {
    per_connection: HashMap<usize, PrepareState>,
}

/// Result of the atomic cache lookup.
#[derive(Debug)]
pub(crate) enum PrepareLookup {
    /// Already prepared on this connection.
    Ready(PreparedId),
    /// Someone else is preparing; await their outcome.
    Wait(broadcast::Receiver<PrepareOutcome>),
    /// The caller became the preparer and must finish the ticket with
    /// [`PreparedStatementCache::complete`] or
    /// [`PreparedStatementCache::fail`].
    Prepare(PrepareTicket),
}

/// Proof of being the single in-flight preparer of a (query, connection)
/// pair.
#[derive(Debug)]
pub(crate) struct PrepareTicket {
    token: u64,
    notify: broadcast::Sender<PrepareOutcome>,
}

#[derive(Debug)]
pub(crate) struct PreparedStatementCache {
    entries: DashMap<String, PreparedEntry>,
    /// Reverse index: which queries are recorded on a connection. Used to
    /// drop everything at once when the connection turns unhealthy.
    prepared_on: DashMap<usize, HashSet<String>>,
    next_token: AtomicU64,
}

impl PreparedStatementCache {
    pub(crate) fn new() -> PreparedStatementCache {
        PreparedStatementCache {
            entries: DashMap::new(),
            prepared_on: DashMap::new(),
            next_token: AtomicU64::new(0),
        }
    }

    /// Looks up the prepare state of (query, connection), transitioning an
    /// absent state to `Preparing` with the caller as preparer.
    ///
    /// The check-and-set happens under the map's shard lock with no await
    /// point, so two concurrent callers can never both become the preparer.
    pub(crate) fn lookup(&self, query: &str, connection_index: usize) -> PrepareLookup {
        // Lock order: reverse index first, then the entry map. This is the
        // only place both are held at once, so the in-flight state and its
        // reverse record appear atomically to evictions.
        let mut on_connection = self.prepared_on.entry(connection_index).or_default();
        let mut entry = self.entries.entry(query.to_owned()).or_default();
        match entry.per_connection.get(&connection_index) {
            Some(PrepareState::Prepared(id)) => PrepareLookup::Ready(id.clone()),
            Some(PrepareState::Preparing { notify, .. }) => {
                PrepareLookup::Wait(notify.subscribe())
            }
            None => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let (notify, _) = broadcast::channel(1);
                entry.per_connection.insert(
                    connection_index,
                    PrepareState::Preparing {
                        token,
                        notify: notify.clone(),
                    },
                );
                on_connection.insert(query.to_owned());
                PrepareLookup::Prepare(PrepareTicket { token, notify })
            }
        }
    }

    /// Stores the id of a successful preparation and notifies all waiters.
    ///
    /// If the state was evicted while the request was in flight the id is
    /// not resurrected; waiters are notified either way.
    pub(crate) fn complete(
        &self,
        query: &str,
        connection_index: usize,
        ticket: PrepareTicket,
        id: PreparedId,
    ) {
        if let Some(mut entry) = self.entries.get_mut(query) {
            let ours = matches!(
                entry.per_connection.get(&connection_index),
                Some(PrepareState::Preparing { token, .. }) if *token == ticket.token
            );
            if ours {
                entry
                    .per_connection
                    .insert(connection_index, PrepareState::Prepared(id.clone()));
                debug!(connection = connection_index, query, "Prepared statement cached");
            }
        }
        let _ = ticket.notify.send(Ok(id));
    }

    /// Reverts a failed preparation to unprepared and notifies all waiters
    /// with the error.
    pub(crate) fn fail(
        &self,
        query: &str,
        connection_index: usize,
        ticket: PrepareTicket,
        error: RequestAttemptError,
    ) {
        if let Some(mut entry) = self.entries.get_mut(query) {
            let ours = matches!(
                entry.per_connection.get(&connection_index),
                Some(PrepareState::Preparing { token, .. }) if *token == ticket.token
            );
            if ours {
                entry.per_connection.remove(&connection_index);
            }
        }
        if let Some(mut queries) = self.prepared_on.get_mut(&connection_index) {
            queries.remove(query);
        }
        let _ = ticket.notify.send(Err(error));
    }

    /// Drops every record of the given connection, in full. Called the
    /// moment the connection is marked unhealthy.
    pub(crate) fn remove_connection(&self, connection_index: usize) {
        let Some((_, queries)) = self.prepared_on.remove(&connection_index) else {
            return;
        };
        for query in &queries {
            if let Some(mut entry) = self.entries.get_mut(query) {
                entry.per_connection.remove(&connection_index);
            }
        }
        debug!(
            connection = connection_index,
            count = queries.len(),
            "Removed prepared statements of connection"
        );
    }

    /// Drops a single (query, connection) record. Called when the server
    /// reports the statement id as no longer known.
    pub(crate) fn remove_connection_statement(&self, query: &str, connection_index: usize) {
        if let Some(mut entry) = self.entries.get_mut(query) {
            entry.per_connection.remove(&connection_index);
        }
        if let Some(mut queries) = self.prepared_on.get_mut(&connection_index) {
            queries.remove(query);
        }
    }
}
