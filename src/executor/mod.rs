//! Query executor - runs statements and judges their results
//!
//! Every statement is awaited under the session's statement timeout. A
//! timeout is returned as [`HarnessError::Timeout`] and is never retried.
//! Server rejections are separated from fatal errors here so that callers
//! can treat them as expected (`expect_failure`) or as verification
//! failures (`run_and_verify`).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::driver::{Connection, DriverError, DriverResult, ResultSet, ScriptedConnection, ServerError};
use crate::error::{HarnessError, HarnessResult};
use crate::expand::CaseOrigin;
use crate::value::Row;
use crate::verify::{self, Expectation, FailureKind, VerificationFailure};

/// What a generated statement is expected to do
#[derive(Debug, Clone, PartialEq)]
pub enum CaseKind {
    /// Succeed with a result matching the expectation
    Verify(Expectation),
    /// Be rejected by the server
    Reject,
    /// Semantics unsettled; the outcome is recorded without a verdict
    Unresolved { reason: String },
}

/// A generated statement with its expected outcome
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub sql: String,
    pub kind: CaseKind,
    pub origin: Option<CaseOrigin>,
}

impl TestCase {
    pub fn verify(sql: impl Into<String>, expectation: Expectation) -> Self {
        Self {
            sql: sql.into(),
            kind: CaseKind::Verify(expectation),
            origin: None,
        }
    }

    pub fn reject(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            kind: CaseKind::Reject,
            origin: None,
        }
    }

    pub fn unresolved(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            kind: CaseKind::Unresolved {
                reason: reason.into(),
            },
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: CaseOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// What the server did with a statement, in a form comparable across runs
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Returned rows, sorted so that row order does not matter
    Rows(Vec<Row>),
    /// Rejected with a server error code
    Rejected { code: i32 },
    /// Returned a cell the driver could not decode
    Undecodable { detail: String },
}

impl Observation {
    fn of(outcome: &Result<ResultSet, ServerError>) -> Self {
        match outcome {
            Ok(result) => {
                let mut rows = result.rows().to_vec();
                rows.sort_by(|a, b| a.values().cmp(b.values()));
                Observation::Rows(rows)
            }
            Err(e) => Observation::Rejected { code: e.code },
        }
    }

    /// Short human-readable description
    pub fn summary(&self) -> String {
        match self {
            Observation::Rows(rows) => format!("{} row(s)", rows.len()),
            Observation::Rejected { code } => format!("rejected (code {})", code),
            Observation::Undecodable { detail } => format!("undecodable ({})", detail),
        }
    }
}

/// Judgement on one case
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Passed,
    Failed(Box<VerificationFailure>),
    Unresolved,
}

/// Outcome of running one case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub verdict: Verdict,
    pub observation: Observation,
}

/// Failure for a statement whose result changed across a flush
///
/// Returns `None` when both runs observed the same thing.
pub fn flush_divergence(case: &TestCase, before: &Observation, after: &Observation) -> Option<VerificationFailure> {
    if before == after {
        return None;
    }
    let failure = VerificationFailure::new(
        FailureKind::FlushDivergence,
        case.sql.clone(),
        format!("{} as before flush", before.summary()),
        after.summary(),
    );
    Some(match &case.origin {
        Some(origin) => failure.with_origin(origin.clone()),
        None => failure,
    })
}

/// Sequential statement runner over one connection
pub struct QueryExecutor {
    conn: Box<dyn Connection>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(conn: Box<dyn Connection>, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a DDL/DML statement
    pub async fn execute(&mut self, sql: &str) -> HarnessResult<()> {
        debug!(sql, "execute");
        within(self.timeout, sql, self.conn.execute(sql)).await
    }

    /// Run a query and fetch its rows
    pub async fn query(&mut self, sql: &str) -> HarnessResult<ResultSet> {
        debug!(sql, "query");
        within(self.timeout, sql, self.conn.query(sql)).await
    }

    /// Force `database` to durable storage
    pub async fn flush(&mut self, database: &str) -> HarnessResult<()> {
        debug!(database, "flush");
        let label = format!("flush {}", database);
        within(self.timeout, &label, self.conn.flush(database)).await
    }

    /// Run a query, separating server rejections from fatal errors
    ///
    /// An undecodable result is returned as a verification failure.
    async fn attempt(&mut self, sql: &str, origin: Option<&CaseOrigin>) -> HarnessResult<Result<ResultSet, ServerError>> {
        match self.query(sql).await {
            Ok(result) => Ok(Ok(result)),
            Err(HarnessError::Server(e)) => Ok(Err(e)),
            Err(HarnessError::Decode { column, message }) => {
                let failure = VerificationFailure::new(
                    FailureKind::Undecodable,
                    sql,
                    "decodable values",
                    format!("column {}: {}", column, message),
                );
                Err(HarnessError::Verification(attach_origin(Box::new(failure), origin)))
            }
            Err(other) => Err(other),
        }
    }

    /// Run a query and check it against `expectation`
    ///
    /// A rejected statement is reported as a verification failure.
    pub async fn run_and_verify(
        &mut self,
        sql: &str,
        expectation: &Expectation,
        origin: Option<&CaseOrigin>,
    ) -> HarnessResult<ResultSet> {
        match self.attempt(sql, origin).await? {
            Ok(result) => {
                verify::check(&result, expectation, origin)?;
                Ok(result)
            }
            Err(e) => Err(HarnessError::Verification(unexpected_rejection(sql, &e, origin))),
        }
    }

    /// Succeeds only if the server rejects `sql`
    pub async fn expect_failure(&mut self, sql: &str, origin: Option<&CaseOrigin>) -> HarnessResult<()> {
        let outcome = self.attempt(sql, origin).await?;
        if let Err(e) = &outcome {
            debug!(sql, code = e.code, "rejected as expected");
        }
        verify::assert_failed(sql, &outcome)
            .map_err(|failure| HarnessError::Verification(attach_origin(failure, origin)))
    }

    /// Run one case to a verdict
    ///
    /// Verification failures are recorded in the returned verdict; only
    /// fatal errors (timeout, lost connection) are returned as `Err`.
    pub async fn run_case(&mut self, case: &TestCase) -> HarnessResult<CaseRecord> {
        let origin = case.origin.as_ref();
        let outcome = match self.attempt(&case.sql, origin).await {
            Err(HarnessError::Verification(failure)) => return Ok(undecodable(case, failure)),
            other => other?,
        };
        let observation = Observation::of(&outcome);

        let verdict = match (&case.kind, &outcome) {
            (CaseKind::Verify(expectation), Ok(result)) => match verify::check(result, expectation, origin) {
                Ok(()) => Verdict::Passed,
                Err(failure) => Verdict::Failed(failure),
            },
            (CaseKind::Verify(_), Err(e)) => Verdict::Failed(unexpected_rejection(&case.sql, e, origin)),
            (CaseKind::Reject, _) => match verify::assert_failed(&case.sql, &outcome) {
                Ok(()) => Verdict::Passed,
                Err(failure) => Verdict::Failed(attach_origin(failure, origin)),
            },
            (CaseKind::Unresolved { reason }, _) => {
                warn!(
                    sql = %case.sql,
                    reason = %reason,
                    outcome = %observation.summary(),
                    "unresolved compatibility case"
                );
                Verdict::Unresolved
            }
        };

        if let Verdict::Failed(failure) = &verdict {
            error!(failure = %failure, "verification failed");
        }
        Ok(CaseRecord { verdict, observation })
    }

    /// Take the connection out, leaving one that refuses every statement
    pub(crate) fn detach(&mut self) -> Box<dyn Connection> {
        let closed = ScriptedConnection::new(|_| Err(DriverError::Connection("session closed".to_string())));
        std::mem::replace(&mut self.conn, Box::new(closed))
    }
}

fn undecodable(case: &TestCase, failure: Box<VerificationFailure>) -> CaseRecord {
    let observation = Observation::Undecodable {
        detail: failure.actual.clone(),
    };
    let verdict = match &case.kind {
        CaseKind::Unresolved { reason } => {
            warn!(sql = %case.sql, reason = %reason, outcome = %failure.actual, "unresolved compatibility case");
            Verdict::Unresolved
        }
        _ => {
            error!(failure = %failure, "verification failed");
            Verdict::Failed(failure)
        }
    };
    CaseRecord { verdict, observation }
}

fn unexpected_rejection(sql: &str, e: &ServerError, origin: Option<&CaseOrigin>) -> Box<VerificationFailure> {
    let failure = VerificationFailure::new(FailureKind::UnexpectedServerError, sql, "a result set", e.to_string());
    attach_origin(Box::new(failure), origin)
}

fn attach_origin(failure: Box<VerificationFailure>, origin: Option<&CaseOrigin>) -> Box<VerificationFailure> {
    match origin {
        Some(o) => Box::new(failure.with_origin(o.clone())),
        None => failure,
    }
}

async fn within<T, F>(timeout: Duration, sql: &str, fut: F) -> HarnessResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(HarnessError::from),
        Err(_) => {
            error!(sql, ?timeout, "statement timed out");
            Err(HarnessError::Timeout {
                sql: sql.to_string(),
                timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::value::Datum;
    use crate::verify::{ExpectedCell, Tolerance};

    fn server(sql: &str) -> DriverResult<ResultSet> {
        if sql.contains("spread(col7)") {
            return Err(DriverError::Server(ServerError::new(
                0x2602,
                "Invalid parameter data type : spread",
            )));
        }
        if sql.contains("spread") {
            return Ok(ResultSet::new(
                sql,
                vec!["spread".to_string()],
                vec![Row::new(vec![Datum::Float(10.0)])],
            ));
        }
        Ok(ResultSet::empty(sql))
    }

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Box::new(ScriptedConnection::new(server)), Duration::from_secs(5))
    }

    fn ten() -> Expectation {
        Expectation::Cells(vec![vec![ExpectedCell::approx(10.0, Tolerance::Exact)]])
    }

    /// A connection that never answers
    struct Hanging;

    #[async_trait]
    impl Connection for Hanging {
        async fn execute(&mut self, _sql: &str) -> DriverResult<()> {
            std::future::pending().await
        }
        async fn query(&mut self, _sql: &str) -> DriverResult<ResultSet> {
            std::future::pending().await
        }
        async fn flush(&mut self, _database: &str) -> DriverResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_run_and_verify() {
        let mut exec = executor();
        let rs = exec
            .run_and_verify("select spread(col1) from db.test1", &ten(), None)
            .await
            .unwrap();
        assert_eq!(rs.row_count(), 1);

        let wrong = Expectation::Cells(vec![vec![ExpectedCell::approx(9.0, Tolerance::Exact)]]);
        let err = exec
            .run_and_verify("select spread(col1) from db.test1", &wrong, None)
            .await
            .unwrap_err();
        match err {
            HarnessError::Verification(f) => {
                assert_eq!(f.kind, FailureKind::CellMismatch);
                assert_eq!(f.sql, "select spread(col1) from db.test1");
                assert_eq!((f.row, f.column), (Some(0), Some(0)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_rejection_is_verification_failure() {
        let mut exec = executor();
        let err = exec
            .run_and_verify("select spread(col7) from db.test1", &ten(), None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, HarnessError::Verification(ref f) if f.kind == FailureKind::UnexpectedServerError)
        );
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_expect_failure() {
        let mut exec = executor();
        exec.expect_failure("select spread(col7) from db.test1", None)
            .await
            .unwrap();

        let err = exec
            .expect_failure("select spread(col1) from db.test1", None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, HarnessError::Verification(ref f) if f.kind == FailureKind::UnexpectedSuccess)
        );
    }

    #[tokio::test]
    async fn test_run_case_verdicts() {
        let mut exec = executor();
        let origin = CaseOrigin {
            template: "spread".to_string(),
            rule: Some(0),
            index: 2,
        };

        let pass = TestCase::verify("select spread(col1) from db.test1", ten());
        assert_eq!(exec.run_case(&pass).await.unwrap().verdict, Verdict::Passed);

        let reject = TestCase::reject("select spread(col1) from db.test").with_origin(origin.clone());
        let record = exec.run_case(&reject).await.unwrap();
        let Verdict::Failed(f) = record.verdict else {
            panic!("expected failure");
        };
        assert_eq!(f.origin, Some(origin));
        assert_eq!(record.observation.summary(), "1 row(s)");

        let unresolved = TestCase::unresolved("select spread(col7) from db.test1", "unsettled");
        let record = exec.run_case(&unresolved).await.unwrap();
        assert_eq!(record.verdict, Verdict::Unresolved);
        assert_eq!(record.observation, Observation::Rejected { code: 0x2602 });
    }

    #[tokio::test]
    async fn test_undecodable_cell_fails_only_its_case() {
        let mut exec = QueryExecutor::new(
            Box::new(ScriptedConnection::new(|sql| {
                if sql.contains("col5") {
                    return Err(DriverError::Decode {
                        column: "spread(col5)".to_string(),
                        message: "unparseable float".to_string(),
                    });
                }
                server(sql)
            })),
            Duration::from_secs(5),
        );

        let broken = TestCase::verify("select spread(col5) from db.test1", ten());
        let record = exec.run_case(&broken).await.unwrap();
        let Verdict::Failed(f) = record.verdict else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Undecodable);
        assert!(f.actual.contains("unparseable float"));
        assert!(matches!(record.observation, Observation::Undecodable { .. }));

        // The session carries on
        let next = TestCase::verify("select spread(col1) from db.test1", ten());
        assert_eq!(exec.run_case(&next).await.unwrap().verdict, Verdict::Passed);

        let err = exec
            .run_and_verify("select spread(col5) from db.test1", &ten(), None)
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_timeout_is_fatal_and_not_retried() {
        let mut exec = QueryExecutor::new(Box::new(Hanging), Duration::from_millis(20));
        let err = exec.run_case(&TestCase::reject("select 1")).await.unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { ref sql, .. } if sql == "select 1"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_detach_leaves_closed_connection() {
        let mut exec = executor();
        let mut conn = exec.detach();
        assert!(conn.execute("select 1").await.is_ok());
        let err = exec.execute("select 1").await.unwrap_err();
        assert!(matches!(err, HarnessError::Connection(_)));
    }

    #[test]
    fn test_flush_divergence() {
        let case = TestCase::verify("select spread(col1) from db.test1", ten());
        let a = Observation::Rows(vec![Row::new(vec![Datum::Float(10.0)])]);
        let b = Observation::Rows(vec![Row::new(vec![Datum::Float(9.0)])]);
        assert!(flush_divergence(&case, &a, &a.clone()).is_none());
        let f = flush_divergence(&case, &a, &b).unwrap();
        assert_eq!(f.kind, FailureKind::FlushDivergence);
        assert!(flush_divergence(&case, &a, &Observation::Rejected { code: 1 }).is_some());
    }
}
