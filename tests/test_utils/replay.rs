//! Replay server: a scripted connection that plays a conforming server
//!
//! When the session creates its database, the replay builds the same suite
//! plan for that database name and queues every statement the runner will
//! send. Rows become visible to queries once their insert statements
//! arrive, and are kept per table.
//!
//! Queries the replay can evaluate itself are answered from those rows:
//! `spread` of a column, and `substr` of a text column, ungrouped or
//! grouped. Their answers never look at the case's expectation, so a wrong
//! expected value shows up as a failure. Every other query is answered with
//! rows built from its expectation. Faults bend selected answers to check
//! that the runner notices.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use sqlprobe::catalog::{DataType, SchemaBuilder, TableKind};
use sqlprobe::datagen::Dataset;
use sqlprobe::driver::{DriverError, ResultSet, ScriptedConnection, ServerError};
use sqlprobe::executor::CaseKind;
use sqlprobe::suites::{Setup, SuitePlan};
use sqlprobe::value::{Datum, Row};
use sqlprobe::verify::{ExpectedCell, Expectation, RowBound};
use sqlprobe::HarnessResult;

/// Error code used for every rejection
pub const REJECT_CODE: i32 = 0x2602;

/// Builds a suite plan for a database name
pub type PlanBuilder = Box<dyn Fn(&mut SchemaBuilder) -> HarnessResult<SuitePlan> + Send>;

/// Deliberate deviation from conforming answers
///
/// Statements are named with `db.` in place of the session database.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with one extra row, before and after the flush
    ExtraRow(String),
    /// Answer with one extra row only after the flush
    ExtraRowAfterFlush(String),
    /// Accept a statement that must be rejected
    Accept(String),
    /// Answer with NULL in the first cell of every row
    NullCell(String),
}

enum Answer {
    Ack,
    /// First statement of an insert; its rows become visible
    Store(Dataset),
    Case { kind: CaseKind, flushed: bool },
}

struct Step {
    sql: String,
    answer: Answer,
}

#[derive(Default)]
struct State {
    database: Option<String>,
    queue: VecDeque<Step>,
    stored: Vec<Dataset>,
    answered: usize,
    computed: usize,
}

/// Handle on the replay's progress, usable after the connection is moved
#[derive(Clone)]
pub struct Replay {
    state: Arc<Mutex<State>>,
}

impl Replay {
    /// Statements still expected
    pub fn remaining(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Queries answered from the plan
    pub fn answered(&self) -> usize {
        self.state.lock().answered
    }

    /// Queries answered from stored rows rather than from expectations
    pub fn computed(&self) -> usize {
        self.state.lock().computed
    }
}

/// A conforming server for the plan `build` produces
pub fn replay_server(build: PlanBuilder, faults: Vec<Fault>) -> (ScriptedConnection, Replay) {
    let state = Arc::new(Mutex::new(State::default()));
    let replay = Replay {
        state: Arc::clone(&state),
    };

    let conn = ScriptedConnection::new(move |sql| {
        let mut state = state.lock();

        if let Some(db) = sql.strip_prefix("create database ") {
            let mut schema = SchemaBuilder::new(db);
            let plan = build(&mut schema).map_err(|e| DriverError::Connection(e.to_string()))?;
            state.queue = queue_for(&plan, db);
            state.database = Some(db.to_string());
            state.stored.clear();
            return Ok(ResultSet::empty(sql));
        }
        if sql.starts_with("drop database") || sql.starts_with("use ") {
            return Ok(ResultSet::empty(sql));
        }

        let step = state
            .queue
            .pop_front()
            .ok_or_else(|| DriverError::Connection(format!("unexpected statement: {}", sql)))?;
        if step.sql != sql {
            return Err(DriverError::Connection(format!(
                "expected `{}`, got `{}`",
                step.sql, sql
            )));
        }

        match step.answer {
            Answer::Ack => Ok(ResultSet::empty(sql)),
            Answer::Store(dataset) => {
                state.stored.push(dataset);
                Ok(ResultSet::empty(sql))
            }
            Answer::Case { kind, flushed } => {
                state.answered += 1;
                let db = state.database.clone().unwrap_or_default();
                let generic = sql.replace(&format!("{}.", db), "db.");
                let computed = match &kind {
                    CaseKind::Verify(_) => evaluate(sql, &db, &state.stored),
                    _ => None,
                };
                if computed.is_some() {
                    state.computed += 1;
                }
                answer(sql, &kind, computed, flushed, &generic, &faults)
            }
        }
    });

    (conn, replay)
}

fn queue_for(plan: &SuitePlan, db: &str) -> VecDeque<Step> {
    let mut queue = VecDeque::new();
    for phase in &plan.phases {
        for setup in &phase.setup {
            let mut dataset = match setup {
                Setup::Insert(d) => Some(d.clone()),
                Setup::Create(_) => None,
            };
            queue.extend(setup.statements().into_iter().map(|sql| Step {
                sql,
                answer: dataset.take().map_or(Answer::Ack, Answer::Store),
            }));
        }
        let mut passes = vec![false];
        if phase.flush_rerun {
            passes.push(true);
        }
        for flushed in passes {
            if flushed {
                queue.push_back(Step {
                    sql: format!("flush database {}", db),
                    answer: Answer::Ack,
                });
            }
            queue.extend(phase.cases.iter().map(|case| Step {
                sql: case.sql.clone(),
                answer: Answer::Case {
                    kind: case.kind.clone(),
                    flushed,
                },
            }));
        }
    }
    queue
}

fn answer(
    sql: &str,
    kind: &CaseKind,
    computed: Option<Vec<Row>>,
    flushed: bool,
    generic: &str,
    faults: &[Fault],
) -> Result<ResultSet, DriverError> {
    let extra_row = faults.iter().any(|f| match f {
        Fault::ExtraRow(s) => s == generic,
        Fault::ExtraRowAfterFlush(s) => flushed && s == generic,
        Fault::Accept(_) | Fault::NullCell(_) => false,
    });
    let accept = faults
        .iter()
        .any(|f| matches!(f, Fault::Accept(s) if s == generic));
    let null_cell = faults
        .iter()
        .any(|f| matches!(f, Fault::NullCell(s) if s == generic));

    let mut rows = match kind {
        CaseKind::Verify(expectation) => computed.unwrap_or_else(|| conforming_rows(expectation)),
        CaseKind::Reject | CaseKind::Unresolved { .. } if !accept => {
            return Err(DriverError::Server(ServerError::new(
                REJECT_CODE,
                "Invalid parameter data type",
            )))
        }
        _ => Vec::new(),
    };
    if null_cell {
        rows = rows
            .iter()
            .map(|row| {
                let mut values = row.values().to_vec();
                if let Some(first) = values.first_mut() {
                    *first = Datum::Null;
                }
                Row::new(values)
            })
            .collect();
    }
    if extra_row {
        let width = rows.first().map_or(1, Row::len);
        rows.push(Row::new(vec![Datum::Null; width]));
    }
    Ok(ResultSet::new(sql, Vec::new(), rows))
}

/// Rows of `table` (or of a super-table's children), with their table name
struct Source<'a> {
    table: &'a str,
    row: &'a Row,
    column: Option<usize>,
    data_type: Option<DataType>,
}

fn sources<'a>(stored: &'a [Dataset], db: &str, table: &str, column: &str) -> Vec<Source<'a>> {
    stored
        .iter()
        .filter(|d| {
            d.table.qualified_name() == table
                || matches!(&d.table.kind, TableKind::Child { parent, .. } if format!("{}.{}", db, parent) == table)
        })
        .flat_map(|d| {
            let column = d.table.get_column_index(column);
            let data_type = column.and_then(|i| d.table.columns.get(i)).map(|c| c.data_type);
            d.rows.iter().map(move |row| Source {
                table: &d.table.name,
                row,
                column,
                data_type,
            })
        })
        .collect()
}

/// Answer a query from stored rows, if the replay understands it
fn evaluate(sql: &str, db: &str, stored: &[Dataset]) -> Option<Vec<Row>> {
    if let Some(rest) = sql.strip_prefix("select spread(") {
        let (column, table) = rest.split_once(") from ")?;
        if !is_identifier(column) || table.contains(' ') {
            return None;
        }
        return spread(&sources(stored, db, table, column));
    }

    let rest = sql.strip_prefix("select substr(")?;
    let (args, tail) = rest.split_once("), ")?;
    let mut args = args.splitn(3, ", ");
    let column = args.next()?;
    let pos: usize = args.next()?.parse().ok()?;
    let len: usize = args.next()?.parse().ok()?;
    if !is_identifier(column) || pos < 1 {
        return None;
    }

    if let Some(table) = tail.strip_prefix("tbname, ts from ") {
        if table.contains(' ') {
            return None;
        }
        let rows = sources(stored, db, table, column);
        return rows
            .iter()
            .rev()
            .map(|s| {
                let sliced = slice(s, pos, len)?;
                let ts = s.row.get(0)?.clone();
                Some(Row::new(vec![sliced, Datum::String(s.table.to_string()), ts]))
            })
            .collect();
    }

    let (selected, rest) = tail.split_once(" from ")?;
    let (table, grouping) = rest.split_once(" group by ")?;
    let not_null = match grouping.strip_prefix(column)? {
        "" => false,
        having if having == format!(" having {} is not null", column) => true,
        _ => return None,
    };
    if selected != column {
        return None;
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for s in sources(stored, db, table, column) {
        let group = s.row.get(s.column?)?.clone();
        if (not_null && group.is_null()) || !seen.insert(group.clone()) {
            continue;
        }
        rows.push(Row::new(vec![slice(&s, pos, len)?, group]));
    }
    rows.reverse();
    Some(rows)
}

/// `max - min` over the non-null values, 0 when there are none
fn spread(sources: &[Source<'_>]) -> Option<Vec<Row>> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for s in sources {
        let v = match s.row.get(s.column?)? {
            Datum::Null => continue,
            Datum::Int(i) => *i as f64,
            Datum::UInt(u) => *u as f64,
            Datum::Float(f) => *f,
            Datum::Timestamp(t) => *t as f64,
            Datum::Bool(_) | Datum::String(_) => return None,
        };
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let value = if lo > hi { 0.0 } else { hi - lo };
    Some(vec![Row::new(vec![Datum::Float(value)])])
}

/// 1-indexed character slice of a text column
fn slice(source: &Source<'_>, pos: usize, len: usize) -> Option<Datum> {
    if !matches!(source.data_type?, DataType::Binary(_) | DataType::NChar(_)) {
        return None;
    }
    match source.row.get(source.column?)? {
        Datum::Null => Some(Datum::Null),
        Datum::String(text) => Some(Datum::String(text.chars().skip(pos - 1).take(len).collect())),
        _ => None,
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rows a correct server would return
fn conforming_rows(expectation: &Expectation) -> Vec<Row> {
    match expectation {
        Expectation::RowCount(n) => (0..*n).map(|_| Row::new(vec![Datum::Float(0.0)])).collect(),
        Expectation::Cells(rows) => rows
            .iter()
            .map(|cells| Row::new(cells.iter().map(sample).collect()))
            .collect(),
        Expectation::Keyed {
            key_columns,
            value_columns,
            rows,
        } => {
            let width = key_columns.iter().chain(value_columns).max().map_or(0, |m| m + 1);
            // Reverse, so matching must not depend on order
            rows.iter()
                .rev()
                .map(|expected| {
                    let mut values = vec![Datum::Null; width];
                    for (col, key) in key_columns.iter().zip(&expected.key) {
                        values[*col] = key.clone();
                    }
                    for (col, cell) in value_columns.iter().zip(&expected.cells) {
                        values[*col] = sample(cell);
                    }
                    Row::new(values)
                })
                .collect()
        }
        Expectation::EachRow { column, cell, rows } => {
            let n = match rows {
                RowBound::Exactly(n) | RowBound::AtMost(n) => *n,
            };
            (0..n)
                .map(|_| {
                    let mut values = vec![Datum::Null; column + 2];
                    values[*column] = sample(cell);
                    Row::new(values)
                })
                .collect()
        }
    }
}

/// A value satisfying `cell`
fn sample(cell: &ExpectedCell) -> Datum {
    match cell {
        ExpectedCell::Value(d) => d.clone(),
        ExpectedCell::Approx { value, .. } => Datum::Float(*value),
        ExpectedCell::Text { null: Some(true), .. } => Datum::Null,
        ExpectedCell::Text { max_chars, .. } => Datum::String("x".repeat((*max_chars).min(3))),
    }
}
