//! Concrete test suites and the phase runner they share
//!
//! A suite is built as a [`SuitePlan`] before anything is sent: an ordered
//! list of phases, each with the tables and rows it adds and the cases it
//! checks afterwards. Building the plan is deterministic for a given
//! database name and base timestamp, so the same plan can be replayed by a
//! scripted server.
//!
//! Phases marked `flush_rerun` run their cases twice, once before and once
//! after flushing the database, and report any statement whose observed
//! result changed.

pub mod spread;
pub mod substr;

use std::fmt;

use tracing::{error, info};

use crate::catalog::TableDef;
use crate::datagen::{DataGenerator, Dataset};
use crate::error::HarnessResult;
use crate::executor::{self, Observation, QueryExecutor, TestCase, Verdict};
use crate::expand::{CaseOrigin, InvalidCase, InvalidStatus};
use crate::session::{TestSession, INSERT_BATCH};
use crate::verify::VerificationFailure;

/// A schema or data change made before a phase's cases run
#[derive(Debug, Clone)]
pub enum Setup {
    Create(TableDef),
    Insert(Dataset),
}

impl Setup {
    /// Statements this step sends, in order
    pub fn statements(&self) -> Vec<String> {
        match self {
            Setup::Create(table) => vec![table.create_sql()],
            Setup::Insert(dataset) => DataGenerator::insert_statements(&dataset.table, &dataset.rows, INSERT_BATCH),
        }
    }

    async fn apply(&self, session: &mut TestSession) -> HarnessResult<()> {
        match self {
            Setup::Create(table) => session.create_table(table).await,
            Setup::Insert(dataset) => session.insert(dataset).await,
        }
    }
}

/// One step of a suite
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub setup: Vec<Setup>,
    pub cases: Vec<TestCase>,
    /// Rerun the cases after a flush and compare observations
    pub flush_rerun: bool,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: Vec::new(),
            cases: Vec::new(),
            flush_rerun: false,
        }
    }

    #[must_use]
    pub fn with_flush_rerun(mut self) -> Self {
        self.flush_rerun = true;
        self
    }
}

/// Everything a suite sends, in order
#[derive(Debug, Clone)]
pub struct SuitePlan {
    pub suite: String,
    pub phases: Vec<Phase>,
}

impl SuitePlan {
    /// Total number of cases over all phases (one pass each)
    pub fn case_count(&self) -> usize {
        self.phases.iter().map(|p| p.cases.len()).sum()
    }
}

/// A case whose outcome was recorded without a verdict
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedCase {
    pub sql: String,
    pub reason: String,
    pub origin: Option<CaseOrigin>,
    /// What the server did, e.g. `3 row(s)` or `rejected (code 9730)`
    pub observed: String,
}

/// Outcome of a suite run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteReport {
    pub suite: String,
    /// Statement runs judged correct, counting both sides of a flush rerun
    pub passed: usize,
    pub failures: Vec<VerificationFailure>,
    pub unresolved: Vec<UnresolvedCase>,
}

impl SuiteReport {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, case: &TestCase, verdict: Verdict, observation: &Observation, first_pass: bool) {
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed(failure) => self.failures.push(*failure),
            Verdict::Unresolved => {
                if first_pass {
                    if let executor::CaseKind::Unresolved { reason } = &case.kind {
                        self.unresolved.push(UnresolvedCase {
                            sql: case.sql.clone(),
                            reason: reason.clone(),
                            origin: case.origin.clone(),
                            observed: observation.summary(),
                        });
                    }
                }
            }
        }
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} passed, {} failed, {} unresolved",
            self.suite,
            self.passed,
            self.failures.len(),
            self.unresolved.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

/// Turn expanded invalid statements into cases against `table`
pub fn invalid_cases(cases: &[InvalidCase], table: &str) -> Vec<TestCase> {
    cases
        .iter()
        .map(|case| {
            let sql = case.render(table);
            let test = match &case.status {
                InvalidStatus::Rejected => TestCase::reject(sql),
                InvalidStatus::Unresolved { reason } => TestCase::unresolved(sql, reason.clone()),
            };
            test.with_origin(case.origin.clone())
        })
        .collect()
}

/// Run every phase of a plan in a session
///
/// Verification failures are collected into the report; setup errors,
/// timeouts and lost connections end the run.
pub async fn run_plan(session: &mut TestSession, plan: &SuitePlan) -> HarnessResult<SuiteReport> {
    let mut report = SuiteReport::new(&plan.suite);
    info!(suite = %plan.suite, database = %session.database(), cases = plan.case_count(), "suite started");

    for phase in &plan.phases {
        info!(suite = %plan.suite, phase = %phase.name, "phase started");
        for step in &phase.setup {
            step.apply(session).await?;
        }

        let before = run_pass(session.executor(), &phase.cases, &mut report, None).await?;

        if phase.flush_rerun {
            session.flush().await?;
            info!(suite = %plan.suite, phase = %phase.name, "rerunning after flush");
            let after = run_pass(session.executor(), &phase.cases, &mut report, Some(&before)).await?;
            for ((case, first), second) in phase.cases.iter().zip(&before).zip(&after) {
                if let Some(failure) = executor::flush_divergence(case, &first.0, &second.0) {
                    error!(failure = %failure, "result changed across flush");
                    report.failures.push(failure);
                }
            }
        }
    }

    info!(
        suite = %plan.suite,
        passed = report.passed,
        failed = report.failures.len(),
        unresolved = report.unresolved.len(),
        "suite finished"
    );
    Ok(report)
}

/// Observation and whether the case passed, per case
type PassOutcome = Vec<(Observation, bool)>;

/// Run one pass over `cases`
///
/// On a rerun (`previous` set) a failure is only recorded if the case had
/// passed before; a repeated failure is already in the report.
async fn run_pass(
    exec: &mut QueryExecutor,
    cases: &[TestCase],
    report: &mut SuiteReport,
    previous: Option<&PassOutcome>,
) -> HarnessResult<PassOutcome> {
    let mut outcome = Vec::with_capacity(cases.len());
    for (i, case) in cases.iter().enumerate() {
        let record = exec.run_case(case).await?;
        let passed = record.verdict == Verdict::Passed;
        let passed_before = previous.and_then(|p| p.get(i)).map_or(true, |(_, ok)| *ok);
        let repeated = matches!(record.verdict, Verdict::Failed(_)) && !passed_before;
        if !repeated {
            report.record(case, record.verdict, &record.observation, previous.is_none());
        }
        outcome.push((record.observation, passed));
    }
    Ok(outcome)
}
