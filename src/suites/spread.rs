//! `spread` suite
//!
//! Super-table `test` covering every scalar type, with children `test1`
//! and `test2`. Literal checks use the values the rows were built from;
//! oracle checks recompute every aggregate from the generated rows.

use crate::catalog::{ColumnDef, ColumnRole, DataType, SchemaBuilder, TableDef};
use crate::datagen::{DataGenerator, Dataset, GeneratorConfig, TimestampLayout, ValueProfile};
use crate::error::HarnessResult;
use crate::executor::TestCase;
use crate::expand::{expand_invalid, CallForm, Combination, Expr, InvalidRule, InvalidTemplate, RoleBindings, Shape};
use crate::oracle::{self, Target};
use crate::session::TestSession;
use crate::value::{Datum, Row};
use crate::verify::{ExpectedCell, Expectation};

use super::{invalid_cases, run_plan, Phase, Setup, SuitePlan, SuiteReport};

pub const SUITE: &str = "spread";

/// 2018-09-17 01:00:00 UTC
pub const BASE_TS: i64 = 1_537_146_000_000;

const ROWS: usize = 10;

pub fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("ts", DataType::Timestamp),
        ColumnDef::new("col1", DataType::TinyInt),
        ColumnDef::new("col2", DataType::SmallInt),
        ColumnDef::new("col3", DataType::Int),
        ColumnDef::new("col4", DataType::BigInt),
        ColumnDef::new("col5", DataType::Float),
        ColumnDef::new("col6", DataType::Double),
        ColumnDef::new("col7", DataType::Bool),
        ColumnDef::new("col8", DataType::Binary(20)),
        ColumnDef::new("col9", DataType::NChar(20)),
        ColumnDef::new("col11", DataType::UTinyInt),
        ColumnDef::new("col12", DataType::USmallInt),
        ColumnDef::new("col13", DataType::UInt),
        ColumnDef::new("col14", DataType::UBigInt),
    ]
}

/// Statements `spread` must reject: non-numeric arguments and malformed calls
pub fn invalid_template() -> InvalidTemplate {
    InvalidTemplate::new("spread_invalid", "spread", DataType::Binary(20))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, ColumnRole::Boolean),
            CallForm::Call,
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, ColumnRole::Character),
            CallForm::Call,
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::CastText, ColumnRole::Numeric),
            CallForm::Call,
        ))
        .rule(InvalidRule::rejected(
            Combination::pair(Shape::Concat, ColumnRole::Character, ColumnRole::Character),
            CallForm::Call,
        ))
        .raw_call(vec![])
        .raw_call(vec![Expr::Ident("ccccccc".to_string())])
}

/// Build the suite against the tables of `schema`
pub fn plan(schema: &mut SchemaBuilder) -> HarnessResult<SuitePlan> {
    let stb = schema.define_super_table("test", columns(), vec![ColumnDef::new("loc", DataType::NChar(20))])?;
    let test1 = schema.define_subtable(&stb, "test1", vec![Datum::from("beijing")])?;
    let test2 = schema.define_subtable(&stb, "test2", vec![Datum::from("shanghai")])?;
    let test3 = schema.define_subtable(&stb, "test3", vec![Datum::from("shenzhen")])?;

    // One all-zero row just before the base timestamp
    let zero = Dataset {
        table: test1.clone(),
        rows: vec![zero_row(&test1, BASE_TS - 1)],
    };
    let mut stored = zero.clone();

    let mut single = Phase::new("single zero row");
    single.setup = vec![
        Setup::Create(stb.clone()),
        Setup::Create(test1.clone()),
        Setup::Insert(zero),
    ];
    single.cases.push(TestCase::verify(
        spread_sql(&test1, "ts"),
        Expectation::RowCount(1),
    ));
    single
        .cases
        .extend(numeric_columns(&test1).map(|col| literal(&test1, col, 0.0)));

    // Sequential rows: integers 1..=10, floats 0.1..=9.1
    let sequential = DataGenerator::new(GeneratorConfig {
        profile: ValueProfile::Sequential,
        layout: TimestampLayout::Ascending { step_ms: 1 },
        boundary_rows: false,
        null_rows: 0,
    })
    .generate(&test1, ROWS, BASE_TS)?;
    stored.extend(sequential.rows.clone());

    let mut filled = Phase::new("sequential rows").with_flush_rerun();
    filled.setup = vec![Setup::Insert(sequential)];
    let invalid = expand_invalid(&invalid_template(), &RoleBindings::from_table(&stb));
    filled.cases.extend(invalid_cases(&invalid, &stb.qualified_name()));
    filled.cases.extend(invalid_cases(&invalid, &test1.qualified_name()));
    filled.cases.extend(numeric_columns(&test1).map(|col| {
        let value = if col.data_type.is_float() { 9.1 } else { ROWS as f64 };
        literal(&test1, col, value)
    }));
    filled.cases.extend(oracle_cases(&Target::from_dataset(&stored))?);
    filled.cases.extend(oracle_cases(&Target::union(&stb, &[&stored]))?);

    // A second child holding type extremes and NULLs
    let extremes = DataGenerator::new(GeneratorConfig {
        profile: ValueProfile::Scaled,
        layout: TimestampLayout::Ascending { step_ms: 1_000 },
        boundary_rows: true,
        null_rows: 2,
    })
    .generate(&test2, ROWS, BASE_TS)?;

    let mut boundary = Phase::new("boundary rows").with_flush_rerun();
    boundary.setup = vec![Setup::Create(test2.clone()), Setup::Insert(extremes.clone())];
    boundary.cases.extend(oracle_cases(&Target::from_dataset(&extremes))?);
    boundary
        .cases
        .extend(oracle_cases(&Target::union(&stb, &[&stored, &extremes]))?);

    // A third child where every data column is NULL
    let nulls = DataGenerator::new(GeneratorConfig {
        profile: ValueProfile::Scaled,
        layout: TimestampLayout::Ascending { step_ms: 1_000 },
        boundary_rows: false,
        null_rows: 3,
    })
    .generate(&test3, 0, BASE_TS)?;

    let mut empty = Phase::new("null rows").with_flush_rerun();
    empty.setup = vec![Setup::Create(test3.clone()), Setup::Insert(nulls.clone())];
    empty.cases.extend(numeric_columns(&test3).map(|col| {
        TestCase::verify(
            spread_sql(&test3, &col.name),
            Expectation::Cells(vec![vec![ExpectedCell::Value(Datum::Float(0.0))]]),
        )
    }));
    empty.cases.push(TestCase::verify(
        spread_sql(&test3, "ts"),
        Expectation::Cells(vec![vec![oracle::spread_cell(&Target::from_dataset(&nulls), "ts")?]]),
    ));
    empty
        .cases
        .extend(oracle_cases(&Target::union(&stb, &[&stored, &extremes, &nulls]))?);

    Ok(SuitePlan {
        suite: SUITE.to_string(),
        phases: vec![single, filled, boundary, empty],
    })
}

/// Run the suite in `session`
pub async fn run(session: &mut TestSession) -> HarnessResult<SuiteReport> {
    let plan = plan(session.schema())?;
    run_plan(session, &plan).await
}

fn spread_sql(table: &TableDef, column: &str) -> String {
    format!("select spread({}) from {}", column, table.qualified_name())
}

fn numeric_columns(table: &TableDef) -> impl Iterator<Item = &ColumnDef> {
    table.data_columns().iter().filter(|c| c.data_type.is_numeric())
}

fn literal(table: &TableDef, col: &ColumnDef, value: f64) -> TestCase {
    TestCase::verify(
        spread_sql(table, &col.name),
        Expectation::Cells(vec![vec![ExpectedCell::approx(
            value,
            oracle::tolerance_for(col.data_type),
        )]]),
    )
}

/// `spread` of the primary timestamp and every numeric column of `target`
fn oracle_cases(target: &Target) -> HarnessResult<Vec<TestCase>> {
    let mut cases = Vec::new();
    for col in &target.columns {
        if !(col.data_type.is_numeric() || col.data_type == DataType::Timestamp) {
            continue;
        }
        let cell = oracle::spread_cell(target, &col.name)?;
        cases.push(TestCase::verify(
            format!("select spread({}) from {}", col.name, target.name),
            Expectation::Cells(vec![vec![cell]]),
        ));
    }
    Ok(cases)
}

fn zero_row(table: &TableDef, ts: i64) -> Row {
    let values = table.data_columns().iter().map(|col| match col.data_type {
        DataType::Bool => Datum::Bool(false),
        DataType::Binary(_) | DataType::NChar(_) => Datum::String(" ".to_string()),
        DataType::Float | DataType::Double => Datum::Float(0.0),
        DataType::Timestamp => Datum::Timestamp(ts),
        ty if ty.is_unsigned() => Datum::UInt(0),
        _ => Datum::Int(0),
    });
    Row::new(std::iter::once(Datum::Timestamp(ts)).chain(values).collect())
}
