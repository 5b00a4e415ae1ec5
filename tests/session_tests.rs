//! Session lifecycle integration tests

mod test_utils;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sqlprobe::driver::{Connection, DriverResult, ResultSet, ScriptedConnection};
use sqlprobe::session::Namespace;
use sqlprobe::verify::{Expectation, FailureKind};
use sqlprobe::{HarnessConfig, HarnessError, TestSession};

use test_utils::init_tracing;

/// Accepts everything, but never answers a statement containing `sleep`
struct Stalling {
    log: Arc<Mutex<Vec<String>>>,
    stalled: Arc<AtomicUsize>,
}

impl Stalling {
    async fn respond(&mut self, sql: &str) -> DriverResult<ResultSet> {
        self.log.lock().push(sql.to_string());
        if sql.contains("sleep") {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        Ok(ResultSet::empty(sql))
    }
}

#[async_trait]
impl Connection for Stalling {
    async fn execute(&mut self, sql: &str) -> DriverResult<()> {
        self.respond(sql).await.map(|_| ())
    }

    async fn query(&mut self, sql: &str) -> DriverResult<ResultSet> {
        self.respond(sql).await
    }

    async fn flush(&mut self, database: &str) -> DriverResult<()> {
        self.respond(&format!("flush database {}", database)).await.map(|_| ())
    }
}

#[tokio::test]
async fn test_teardown_after_verification_failure() {
    init_tracing();
    let conn = ScriptedConnection::accepting();
    let log = conn.log();

    let err = TestSession::scoped(Box::new(conn), &HarnessConfig::default(), |session| {
        Box::pin(async move {
            let sql = format!("select count(*) from {}.t1", session.database());
            session
                .executor()
                .run_and_verify(&sql, &Expectation::RowCount(1), None)
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap_err();

    let HarnessError::Verification(failure) = &err else {
        panic!("expected verification failure, got {}", err);
    };
    assert_eq!(failure.kind, FailureKind::RowCount);
    assert!(!err.is_fatal());

    let statements = log.snapshot();
    let db = statements[1].trim_start_matches("create database ").to_string();
    assert_eq!(statements.last().unwrap(), &format!("drop database if exists {}", db));
    assert!(!Namespace::is_live(&db));
}

#[tokio::test]
async fn test_timeout_is_fatal_and_not_retried() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let stalled = Arc::new(AtomicUsize::new(0));
    let conn = Stalling {
        log: Arc::clone(&log),
        stalled: Arc::clone(&stalled),
    };
    let config = HarnessConfig {
        statement_timeout: Duration::from_millis(50),
        ..HarnessConfig::default()
    };

    let err = TestSession::scoped(Box::new(conn), &config, |session| {
        Box::pin(async move {
            session.executor().query("select sleep(100)").await?;
            session.executor().query("select 1").await?;
            Ok(())
        })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, HarnessError::Timeout { ref sql, .. } if sql == "select sleep(100)"));
    assert!(err.is_fatal());
    assert_eq!(stalled.load(Ordering::SeqCst), 1);

    let statements = log.lock().clone();
    assert!(!statements.iter().any(|s| s == "select 1"));
    assert!(statements.last().unwrap().starts_with("drop database if exists"));
}

#[tokio::test]
async fn test_concurrent_sessions_get_distinct_databases() {
    init_tracing();
    let config = HarnessConfig::default();

    let sessions = (0..8).map(|_| {
        let config = config.clone();
        tokio::spawn(async move {
            let session = TestSession::with_connection(Box::new(ScriptedConnection::accepting()), &config)
                .await
                .unwrap();
            let db = session.database().to_string();
            assert!(Namespace::is_live(&db));
            // Hold the name while the other sessions open
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.close().await.unwrap();
            db
        })
    });

    let mut names: Vec<String> = futures::future::join_all(sessions)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
    assert!(names.iter().all(|n| n.starts_with("sqltest_") && !Namespace::is_live(n)));
}

#[tokio::test]
async fn test_open_fails_without_server() {
    init_tracing();
    let config = HarnessConfig {
        endpoint: sqlprobe::driver::Endpoint::new("127.0.0.1", 1),
        statement_timeout: Duration::from_secs(5),
        ..HarnessConfig::default()
    };
    let err = TestSession::open(&config).await.unwrap_err();
    assert!(matches!(err, HarnessError::Connection(_)), "{}", err);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_open_times_out_on_silent_server() {
    init_tracing();
    // Accepts TCP connections but never sends a handshake
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = HarnessConfig {
        endpoint: sqlprobe::driver::Endpoint::new("127.0.0.1", port),
        statement_timeout: Duration::from_millis(200),
        ..HarnessConfig::default()
    };
    let err = tokio::time::timeout(Duration::from_secs(10), TestSession::open(&config))
        .await
        .expect("open must give up on its own")
        .unwrap_err();
    assert!(
        matches!(err, HarnessError::Timeout { ref sql, .. } if sql.starts_with("connect 127.0.0.1:")),
        "{}",
        err
    );
    assert!(err.is_fatal());
    silent.abort();
}
