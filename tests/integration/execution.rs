//! Plain execution: error classification, retry-with-reroute, budgets.

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use cql_pool::errors::{
    ConnectionPoolError, DbError, ExecutionError, RequestAttemptError,
};
use cql_pool::{Consistency, Statement};

use crate::utils::{setup_tracing, test_builder, MockCluster, Script};

// Two hosts, connection 0 always fails fatally, connection 1 always
// succeeds: the request must be rerouted and succeed.
#[tokio::test]
async fn fatal_error_reroutes_to_healthy_connection() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(test_builder(2).max_execute_retries(3));
    cluster.conn(0).set_execute_default(Script::Fatal);

    let result = session.execute("SELECT 1", &[]).await.unwrap();

    let rows = result.rows().unwrap();
    assert_eq!(rows[0].columns[1].as_ref().unwrap().as_text(), Some("10.1.0.1:9042"));
    assert_eq!(cluster.conn(0).execute_count.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.conn(1).execute_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn always_fatal_connection_exhausts_the_budget() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(test_builder(1).max_execute_retries(3));
    cluster.conn(0).set_execute_default(Script::Fatal);

    let err = session.execute("SELECT 1", &[]).await.unwrap_err();

    assert_matches!(
        err,
        ExecutionError::RetriesExhausted {
            attempts: 4,
            last_error: RequestAttemptError::BrokenConnection(_),
        }
    );
    // One initial attempt plus `max_execute_retries` retries.
    assert_eq!(cluster.conn(0).execute_count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn application_error_is_never_retried() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(test_builder(2).max_execute_retries(3));
    cluster.conn(0).set_execute_default(Script::SyntaxError);

    let err = session.execute("SELECT !!!", &[]).await.unwrap_err();

    assert_matches!(
        err,
        ExecutionError::RequestAttempt(RequestAttemptError::DbError(DbError::SyntaxError, _))
    );
    assert_eq!(cluster.conn(0).execute_count.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.conn(1).execute_count.load(Ordering::SeqCst), 0);
}

// A connection marked unhealthy must not be selected again before its
// cooldown elapsed, even across separate requests.
#[tokio::test]
async fn unhealthy_connection_is_skipped_until_cooldown() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(
        test_builder(2)
            .max_execute_retries(3)
            .reconnect_cooldown(Duration::from_secs(600)),
    );
    cluster.conn(0).push_execute(Script::Fatal);

    session.execute("SELECT 1", &[]).await.unwrap();

    for _ in 0..4 {
        session.execute("SELECT 1", &[]).await.unwrap();
    }
    // Connection 0 saw only the initial, fatal attempt.
    assert_eq!(cluster.conn(0).execute_count.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.conn(1).execute_count.load(Ordering::SeqCst), 5);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn fully_unhealthy_pool_times_out_acquisition() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(
        test_builder(1)
            .max_execute_retries(0)
            .get_connection_timeout(Duration::from_millis(100))
            .reconnect_cooldown(Duration::from_secs(600)),
    );
    cluster.conn(0).set_execute_default(Script::Fatal);

    // First request breaks the only connection...
    session.execute("SELECT 1", &[]).await.unwrap_err();

    // ...so the next one cannot acquire anything within the window.
    let err = session.execute("SELECT 1", &[]).await.unwrap_err();
    assert_matches!(
        err,
        ExecutionError::ConnectionPool(ConnectionPoolError::AcquisitionTimeout { .. })
    );
}

// After the cooldown elapses the broken connection is reopened and used
// again.
#[tokio::test]
#[ntest::timeout(5000)]
async fn broken_connection_recovers_after_cooldown() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(
        test_builder(1)
            .max_execute_retries(1)
            .reconnect_cooldown(Duration::from_millis(20)),
    );
    cluster.conn(0).push_execute(Script::Fatal);

    let result = session.execute("SELECT 1", &[]).await.unwrap();

    assert!(result.rows().is_some());
    // Initial open, then the reopen after the fatal error.
    assert_eq!(cluster.conn(0).open_count.load(Ordering::SeqCst), 2);
    assert_eq!(cluster.conn(0).execute_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn statement_consistency_overrides_the_default() {
    setup_tracing();
    let cluster = MockCluster::new();
    let session = cluster.session(test_builder(1).default_consistency(Consistency::One));

    session.execute("SELECT 1", &[]).await.unwrap();
    assert_eq!(
        *cluster.conn(0).last_consistency.lock().unwrap(),
        Some(Consistency::One)
    );

    let statement = Statement::new("SELECT 1").with_consistency(Consistency::All);
    session.execute(statement, &[]).await.unwrap();
    assert_eq!(
        *cluster.conn(0).last_consistency.lock().unwrap(),
        Some(Consistency::All)
    );
}
