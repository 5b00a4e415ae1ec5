//! `substr` suite
//!
//! Super-table `stb1` with children `ct1..ct4` (`ct3` stays empty) and the
//! ordinary table `t1`. Every expanded text expression is sliced with
//! `substr(e, 1, 6)` on every table, ungrouped and grouped, and checked
//! against the oracle. A start position of 0 and every misuse of the
//! function must be rejected.

use crate::catalog::{ColumnDef, ColumnRole, DataType, SchemaBuilder, TableDef};
use crate::datagen::{DataGenerator, Dataset, GeneratorConfig, TimestampLayout, ValueProfile, DAY_MS};
use crate::error::HarnessResult;
use crate::executor::TestCase;
use crate::expand::{
    expand, expand_invalid, CallForm, Combination, Expr, InvalidRule, InvalidTemplate, RoleBindings, Shape,
    SqlFragment, Template,
};
use crate::oracle::{self, Target};
use crate::session::TestSession;
use crate::value::Datum;

use super::{invalid_cases, run_plan, Phase, Setup, SuitePlan, SuiteReport};

pub const SUITE: &str = "substr";

/// Start position and length of every valid slice
pub const POS: i64 = 1;
pub const LEN: i64 = 6;
/// Start position the server must reject
pub const BAD_POS: i64 = 0;

/// Target type of every cast in the conditions
pub const TEXT: DataType = DataType::Binary(16);

const ROWS: usize = 10;
const HOUR_MS: i64 = 3_600_000;

/// Constant condition with padding, punctuation and an embedded quote
pub const LITERAL: &str = "   test1234!@#$%^&*()  :'><?/.,][}{   ";

pub fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("ts", DataType::Timestamp),
        ColumnDef::new("c1", DataType::Int),
        ColumnDef::new("c2", DataType::BigInt),
        ColumnDef::new("c3", DataType::SmallInt),
        ColumnDef::new("c4", DataType::TinyInt),
        ColumnDef::new("c5", DataType::Float),
        ColumnDef::new("c6", DataType::Double),
        ColumnDef::new("c7", DataType::Bool),
        ColumnDef::new("c8", DataType::Binary(16)),
        ColumnDef::new("c9", DataType::NChar(32)),
        ColumnDef::new("c10", DataType::Timestamp),
    ]
}

/// Text expressions `substr` is applied to
pub fn condition_template() -> Template {
    use ColumnRole::{Boolean, Character, Numeric, Timestamp};

    Template::new("substr_conditions", TEXT)
        .combination(Combination::unary(Shape::Bare, Character))
        .combination(Combination::unary(Shape::Upper, Character))
        .combination(Combination::unary(Shape::CastText, Numeric))
        .combination(Combination::pair(Shape::CastSum, Character, Numeric))
        .combination(Combination::pair(Shape::ConcatCastSum, Character, Numeric))
        .combination(Combination::unary(Shape::CastText, Boolean))
        .combination(Combination::pair(Shape::CastSum, Character, Boolean))
        .combination(Combination::unary(Shape::CastText, Timestamp))
        .combination(Combination::pair(Shape::CastSum, Character, Character))
        .combination(Combination::pair(Shape::Concat, Character, Character))
        .combination(Combination::pair(Shape::CastSum, Numeric, Boolean))
        .combination(Combination::pair(Shape::CastSum, Numeric, Timestamp).skip_float(0))
        .combination(Combination::pair(Shape::CastSum, Boolean, Timestamp))
        .literal(Expr::Literal(Datum::from(LITERAL)))
}

/// Statements misusing `substr`
pub fn invalid_template() -> InvalidTemplate {
    use ColumnRole::{Boolean, Character, Numeric, Timestamp};

    let quoted_one = || vec![Datum::from("1")];
    let call = |shape, left, right| InvalidRule::rejected(Combination::pair(shape, left, right), CallForm::Call);

    InvalidTemplate::new("substr_invalid", "substr", TEXT)
        .rule(InvalidRule::rejected(Combination::unary(Shape::Bare, Numeric), CallForm::Call))
        .rule(InvalidRule::rejected(Combination::unary(Shape::Ceil, Numeric), CallForm::Call))
        .rule(InvalidRule::rejected(Combination::unary(Shape::Bare, Numeric), CallForm::GroupBy))
        .rule(call(Shape::Sum, Character, Numeric))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Numeric),
            CallForm::WithColumn(Timestamp),
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Numeric),
            CallForm::WithColumn(Boolean),
        ))
        .rule(call(Shape::Sum, Timestamp, Boolean))
        .rule(call(Shape::Sum, Numeric, Timestamp))
        .rule(call(Shape::Sum, Numeric, Boolean))
        .rule(call(Shape::Sum, Numeric, Numeric))
        .rule(call(Shape::Sum, Timestamp, Timestamp))
        .rule(call(Shape::Sum, Boolean, Boolean))
        .rule(call(Shape::Sum, Character, Character))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Numeric),
            CallForm::WithLiterals(quoted_one()),
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Timestamp),
            CallForm::WithLiterals(quoted_one()),
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Boolean),
            CallForm::WithLiterals(quoted_one()),
        ))
        .rule(InvalidRule::rejected(
            Combination::unary(Shape::Bare, Character),
            CallForm::Windowed {
                args: quoted_one(),
                interval: "2d".to_string(),
                sliding: "1d".to_string(),
            },
        ))
        .rule(InvalidRule::unresolved(
            Combination::pair(Shape::CastSum, Character, Timestamp),
            CallForm::WithLiterals(vec![Datum::Int(POS), Datum::Int(LEN)]),
            "text plus timestamp inside a cast has no settled meaning",
        ))
        .raw_call(vec![])
        .raw_call(vec![Expr::Star])
        .raw_call(vec![Expr::Ident("ccccccc".to_string())])
        .raw_call(vec![Expr::Literal(Datum::Int(111))])
}

/// Build the suite against the tables of `schema`
///
/// `base_ts` anchors every generated timestamp.
pub fn plan(schema: &mut SchemaBuilder, base_ts: i64) -> HarnessResult<SuitePlan> {
    let stb = schema.define_super_table("stb1", columns(), vec![ColumnDef::new("tag1", DataType::Int)])?;
    let t1 = schema.define_table("t1", columns())?;
    let mut children = Vec::new();
    for i in 1..=4 {
        children.push(schema.define_subtable(&stb, format!("ct{}", i), vec![Datum::Int(i)])?);
    }

    let generate = |table: &TableDef, profile: ValueProfile, layout: TimestampLayout, edges: bool| {
        DataGenerator::new(GeneratorConfig {
            profile,
            layout,
            boundary_rows: edges,
            null_rows: if edges { 3 } else { 0 },
        })
        .generate(table, ROWS, base_ts)
    };
    let quarter = TimestampLayout::Descending { step_ms: 90 * DAY_MS };
    let ct1 = generate(
        &children[0],
        ValueProfile::Scaled,
        TimestampLayout::Descending { step_ms: 1_000 },
        false,
    )?;
    let ct2 = generate(&children[1], ValueProfile::Negated, quarter, true)?;
    let ct3 = Dataset::empty(children[2].clone());
    let ct4 = generate(&children[3], ValueProfile::Scaled, quarter, true)?;
    let t1_rows = generate(&t1, ValueProfile::Scaled, TimestampLayout::Mixed { step_ms: HOUR_MS }, true)?;

    let mut setup = vec![Setup::Create(stb.clone()), Setup::Create(t1.clone())];
    setup.extend(children.iter().cloned().map(Setup::Create));
    setup.extend(
        [&ct1, &ct2, &ct4, &t1_rows]
            .into_iter()
            .map(|d| Setup::Insert(d.clone())),
    );

    let targets = [
        Target::from_dataset(&ct1),
        Target::from_dataset(&ct2),
        Target::from_dataset(&ct3),
        Target::from_dataset(&ct4),
        Target::from_dataset(&t1_rows),
        Target::union(&stb, &[&ct1, &ct2, &ct3, &ct4]),
    ];

    let conditions = expand(&condition_template(), &RoleBindings::from_table(&stb));
    let mut valid = Phase::new("conditions").with_flush_rerun();
    valid.setup = setup;
    for target in &targets {
        for condition in &conditions {
            valid.cases.extend(condition_cases(target, condition)?);
        }
    }

    let invalid = expand_invalid(&invalid_template(), &RoleBindings::from_table(&stb));
    let mut misuse = Phase::new("misuse").with_flush_rerun();
    for target in &targets {
        misuse.cases.extend(invalid_cases(&invalid, &target.name));
        misuse.cases.extend(conditions.iter().map(|condition| {
            TestCase::reject(format!(
                "select substr({c}, {p}, {l}), {c} from {t}",
                c = condition.sql,
                p = BAD_POS,
                l = LEN,
                t = target.name
            ))
            .with_origin(condition.origin.clone())
        }));
    }

    Ok(SuitePlan {
        suite: SUITE.to_string(),
        phases: vec![valid, misuse],
    })
}

/// Run the suite in `session` with timestamps around `base_ts`
pub async fn run(session: &mut TestSession, base_ts: i64) -> HarnessResult<SuiteReport> {
    let plan = plan(session.schema(), base_ts)?;
    run_plan(session, &plan).await
}

/// Run the suite with timestamps around the current time
pub async fn run_now(session: &mut TestSession) -> HarnessResult<SuiteReport> {
    run(session, chrono::Utc::now().timestamp_millis()).await
}

/// Ungrouped, grouped and grouped-with-having queries of one condition
fn condition_cases(target: &Target, condition: &SqlFragment) -> HarnessResult<Vec<TestCase>> {
    let (c, t) = (&condition.sql, &target.name);
    let slice = format!("substr({}, {}, {})", c, POS, LEN);

    let cases = vec![
        TestCase::verify(
            format!("select {}, tbname, ts from {}", slice, t),
            oracle::substr_rows(target, &condition.expr, POS, Some(LEN))?,
        ),
        TestCase::verify(
            format!("select {}, {} from {} group by {}", slice, c, t, c),
            oracle::substr_groups(target, &condition.expr, POS, Some(LEN), false)?,
        ),
        TestCase::verify(
            format!("select {}, {} from {} group by {} having {} is not null", slice, c, t, c, c),
            oracle::substr_groups(target, &condition.expr, POS, Some(LEN), true)?,
        ),
    ];
    Ok(cases
        .into_iter()
        .map(|case| case.with_origin(condition.origin.clone()))
        .collect())
}
