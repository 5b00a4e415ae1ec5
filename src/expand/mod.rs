//! Case expander - combinatorial SQL argument generation
//!
//! Templates are declarative: each [`Combination`] names an expression
//! [`Shape`] and the column roles that fill its slots. Expansion takes the
//! cross-product over the role lists bound in [`RoleBindings`], in binding
//! order, so the output is stable across runs and every combination appears
//! exactly once.

pub mod expr;

use std::collections::{BTreeMap, HashSet};

pub use expr::{ColumnRef, Expr};

use crate::catalog::{ColumnRole, DataType, TableDef};
use crate::value::Datum;

/// Column lists per role, threaded explicitly into every expansion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleBindings {
    groups: BTreeMap<ColumnRole, Vec<ColumnRef>>,
}

impl RoleBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group a table's data columns by role, in column order
    ///
    /// The primary timestamp is not bound to any role.
    pub fn from_table(table: &TableDef) -> Self {
        let mut bindings = Self::new();
        for col in table.data_columns() {
            bindings
                .groups
                .entry(col.role())
                .or_default()
                .push(ColumnRef::new(col.name.clone(), col.data_type));
        }
        bindings
    }

    /// Replace the column list of one role
    #[must_use]
    pub fn with(mut self, role: ColumnRole, columns: Vec<ColumnRef>) -> Self {
        self.groups.insert(role, columns);
        self
    }

    /// Columns bound to a role (empty if none)
    pub fn get(&self, role: ColumnRole) -> &[ColumnRef] {
        self.groups.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Expression shape filled by one or two role-bound columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `a`
    Bare,
    /// `upper(a)`
    Upper,
    /// `ceil(a)`
    Ceil,
    /// `cast(a as <text>)`
    CastText,
    /// `a + b`
    Sum,
    /// `cast(a + b as <text>)`
    CastSum,
    /// `concat(cast(a + b as <text>), a)`
    ConcatCastSum,
    /// `concat(a, b)`
    Concat,
}

impl Shape {
    /// Number of columns the shape consumes
    pub fn arity(&self) -> usize {
        match self {
            Shape::Bare | Shape::Upper | Shape::Ceil | Shape::CastText => 1,
            Shape::Sum | Shape::CastSum | Shape::ConcatCastSum | Shape::Concat => 2,
        }
    }

    /// Build the expression from exactly `arity()` operands
    pub fn build(&self, operands: &[Expr], text: DataType) -> Expr {
        let a = || operands[0].clone();
        let b = || operands[1].clone();
        match self {
            Shape::Bare => a(),
            Shape::Upper => Expr::upper(a()),
            Shape::Ceil => Expr::ceil(a()),
            Shape::CastText => Expr::cast(a(), text),
            Shape::Sum => Expr::add(a(), b()),
            Shape::CastSum => Expr::cast(Expr::add(a(), b()), text),
            Shape::ConcatCastSum => Expr::concat(Expr::cast(Expr::add(a(), b()), text), a()),
            Shape::Concat => Expr::concat(a(), b()),
        }
    }
}

/// One cross-product rule of a template
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub shape: Shape,
    pub roles: Vec<ColumnRole>,
    /// Slot positions whose floating point columns are left out
    pub skip_float: Vec<usize>,
}

impl Combination {
    pub fn unary(shape: Shape, role: ColumnRole) -> Self {
        Self {
            shape,
            roles: vec![role],
            skip_float: Vec::new(),
        }
    }

    pub fn pair(shape: Shape, left: ColumnRole, right: ColumnRole) -> Self {
        Self {
            shape,
            roles: vec![left, right],
            skip_float: Vec::new(),
        }
    }

    /// Leave out floating point columns in slot `position`
    #[must_use]
    pub fn skip_float(mut self, position: usize) -> Self {
        self.skip_float.push(position);
        self
    }

    /// Every operand tuple, in role-list order
    fn operands(&self, bindings: &RoleBindings) -> Vec<Vec<Expr>> {
        let mut tuples: Vec<Vec<Expr>> = vec![Vec::new()];
        for (position, role) in self.roles.iter().enumerate() {
            let columns: Vec<&ColumnRef> = bindings
                .get(*role)
                .iter()
                .filter(|c| !(self.skip_float.contains(&position) && c.data_type.is_float()))
                .collect();
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    columns.iter().map(move |col| {
                        let mut next = prefix.clone();
                        next.push(Expr::Column((*col).clone()));
                        next
                    })
                })
                .collect();
        }
        tuples
    }

    fn expressions(&self, bindings: &RoleBindings, text: DataType) -> Vec<Expr> {
        debug_assert_eq!(self.roles.len(), self.shape.arity());
        self.operands(bindings)
            .iter()
            .map(|ops| self.shape.build(ops, text))
            .collect()
    }
}

/// Where a generated case came from, for reproducing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOrigin {
    /// Template name
    pub template: String,
    /// Index of the rule within the template (`None` for literal cases)
    pub rule: Option<usize>,
    /// Running index of the case within the expansion
    pub index: usize,
}

impl std::fmt::Display for CaseOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rule {
            Some(rule) => write!(f, "{}[rule {}, case {}]", self.template, rule, self.index),
            None => write!(f, "{}[literal, case {}]", self.template, self.index),
        }
    }
}

/// A generated expression together with its SQL text and origin
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub expr: Expr,
    pub sql: String,
    pub origin: CaseOrigin,
}

/// Declarative description of the argument expressions to test
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    /// Target type of the shapes that cast to text
    pub text_type: DataType,
    pub combinations: Vec<Combination>,
    /// Constant expressions appended after the combinations
    pub literals: Vec<Expr>,
}

impl Template {
    pub fn new(name: impl Into<String>, text_type: DataType) -> Self {
        Self {
            name: name.into(),
            text_type,
            combinations: Vec::new(),
            literals: Vec::new(),
        }
    }

    #[must_use]
    pub fn combination(mut self, combination: Combination) -> Self {
        self.combinations.push(combination);
        self
    }

    #[must_use]
    pub fn literal(mut self, expr: Expr) -> Self {
        self.literals.push(expr);
        self
    }
}

/// Expand a template into every combination over the bound role lists
///
/// A combination that renders to SQL already emitted by an earlier rule is
/// dropped, so each distinct expression appears once.
pub fn expand(template: &Template, bindings: &RoleBindings) -> Vec<SqlFragment> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let ruled = template
        .combinations
        .iter()
        .enumerate()
        .flat_map(|(rule, combo)| {
            combo
                .expressions(bindings, template.text_type)
                .into_iter()
                .map(move |expr| (Some(rule), expr))
        });
    let literals = template.literals.iter().cloned().map(|expr| (None, expr));

    for (rule, expr) in ruled.chain(literals) {
        let sql = expr.to_string();
        if !seen.insert(sql.clone()) {
            continue;
        }
        let origin = CaseOrigin {
            template: template.name.clone(),
            rule,
            index: out.len(),
        };
        out.push(SqlFragment { expr, sql, origin });
    }
    out
}

/// How an invalid argument expression is wrapped into a statement
#[derive(Debug, Clone, PartialEq)]
pub enum CallForm {
    /// `select f(e) from t`
    Call,
    /// `select f(e, lit, ...) from t`
    WithLiterals(Vec<Datum>),
    /// `select f(e, col) from t` for every column of the role
    WithColumn(ColumnRole),
    /// `select e from t group by f(e)`
    GroupBy,
    /// `select f(e, lit, ...) from t interval(i) sliding(s)`
    Windowed {
        args: Vec<Datum>,
        interval: String,
        sliding: String,
    },
}

/// Whether the server is required to reject a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidStatus {
    /// The statement must fail
    Rejected,
    /// Intended semantics are unsettled; the outcome is recorded, not judged
    Unresolved { reason: String },
}

/// One rule of an invalid-combination template
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRule {
    pub combination: Combination,
    pub form: CallForm,
    pub status: InvalidStatus,
}

impl InvalidRule {
    pub fn rejected(combination: Combination, form: CallForm) -> Self {
        Self {
            combination,
            form,
            status: InvalidStatus::Rejected,
        }
    }

    pub fn unresolved(combination: Combination, form: CallForm, reason: impl Into<String>) -> Self {
        Self {
            combination,
            form,
            status: InvalidStatus::Unresolved {
                reason: reason.into(),
            },
        }
    }
}

/// Template of statements that misuse a function
#[derive(Debug, Clone)]
pub struct InvalidTemplate {
    pub name: String,
    pub function: String,
    pub text_type: DataType,
    pub rules: Vec<InvalidRule>,
    /// Literal argument lists, e.g. no arguments or `*`
    pub raw_calls: Vec<Vec<Expr>>,
}

impl InvalidTemplate {
    pub fn new(name: impl Into<String>, function: impl Into<String>, text_type: DataType) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            text_type,
            rules: Vec::new(),
            raw_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn rule(mut self, rule: InvalidRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn raw_call(mut self, args: Vec<Expr>) -> Self {
        self.raw_calls.push(args);
        self
    }
}

/// A statement shape that misuses the function under test
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCase {
    pub function: String,
    pub args: Vec<Expr>,
    pub group_by: bool,
    pub window: Option<(String, String)>,
    pub status: InvalidStatus,
    pub origin: CaseOrigin,
}

impl InvalidCase {
    /// The call expression, e.g. `substr(c1, '1')`
    pub fn call_sql(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Expr::to_string).collect();
        format!("{}({})", self.function, args.join(", "))
    }

    /// Full statement against `table`
    pub fn render(&self, table: &str) -> String {
        if self.group_by {
            let subject = self
                .args
                .first()
                .map(Expr::to_string)
                .unwrap_or_else(|| "*".to_string());
            return format!("select {} from {} group by {}", subject, table, self.call_sql());
        }
        let mut sql = format!("select {} from {}", self.call_sql(), table);
        if let Some((interval, sliding)) = &self.window {
            sql.push_str(&format!(" interval({}) sliding({})", interval, sliding));
        }
        sql
    }
}

/// Expand every invalid combination of a template
///
/// The rules of a template are expected to cover its function's whole
/// type-compatibility matrix; this function only enumerates them.
pub fn expand_invalid(template: &InvalidTemplate, bindings: &RoleBindings) -> Vec<InvalidCase> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |case: InvalidCase, out: &mut Vec<InvalidCase>| {
        if seen.insert(case.render("")) {
            out.push(case);
        }
    };

    for (rule_idx, rule) in template.rules.iter().enumerate() {
        for expr in rule.combination.expressions(bindings, template.text_type) {
            let arg_lists: Vec<(Vec<Expr>, bool, Option<(String, String)>)> = match &rule.form {
                CallForm::Call => vec![(vec![expr], false, None)],
                CallForm::GroupBy => vec![(vec![expr], true, None)],
                CallForm::WithLiterals(lits) => {
                    vec![(with_literals(expr, lits), false, None)]
                }
                CallForm::WithColumn(role) => bindings
                    .get(*role)
                    .iter()
                    .map(|col| (vec![expr.clone(), Expr::Column(col.clone())], false, None))
                    .collect(),
                CallForm::Windowed {
                    args,
                    interval,
                    sliding,
                } => vec![(
                    with_literals(expr, args),
                    false,
                    Some((interval.clone(), sliding.clone())),
                )],
            };

            for (args, group_by, window) in arg_lists {
                let case = InvalidCase {
                    function: template.function.clone(),
                    args,
                    group_by,
                    window,
                    status: rule.status.clone(),
                    origin: CaseOrigin {
                        template: template.name.clone(),
                        rule: Some(rule_idx),
                        index: out.len(),
                    },
                };
                push(case, &mut out);
            }
        }
    }

    for args in &template.raw_calls {
        let case = InvalidCase {
            function: template.function.clone(),
            args: args.clone(),
            group_by: false,
            window: None,
            status: InvalidStatus::Rejected,
            origin: CaseOrigin {
                template: template.name.clone(),
                rule: None,
                index: out.len(),
            },
        };
        push(case, &mut out);
    }
    out
}

fn with_literals(expr: Expr, literals: &[Datum]) -> Vec<Expr> {
    std::iter::once(expr)
        .chain(literals.iter().cloned().map(Expr::Literal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, SchemaBuilder};

    fn bindings() -> RoleBindings {
        let mut builder = SchemaBuilder::new("db");
        let table = builder
            .define_table(
                "t1",
                vec![
                    ColumnDef::new("ts", DataType::Timestamp),
                    ColumnDef::new("c1", DataType::Int),
                    ColumnDef::new("c5", DataType::Float),
                    ColumnDef::new("c7", DataType::Bool),
                    ColumnDef::new("c8", DataType::Binary(16)),
                    ColumnDef::new("c9", DataType::NChar(32)),
                    ColumnDef::new("c10", DataType::Timestamp),
                ],
            )
            .unwrap();
        RoleBindings::from_table(&table)
    }

    #[test]
    fn test_bindings_exclude_primary_timestamp() {
        let b = bindings();
        let names: Vec<&str> = b
            .get(ColumnRole::Timestamp)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["c10"]);
        assert_eq!(b.get(ColumnRole::Numeric).len(), 2);
        assert_eq!(b.get(ColumnRole::Character).len(), 2);
    }

    #[test]
    fn test_cross_product_order_and_count() {
        let template = Template::new("t", DataType::Binary(16))
            .combination(Combination::pair(
                Shape::Concat,
                ColumnRole::Character,
                ColumnRole::Character,
            ))
            .combination(Combination::unary(Shape::CastText, ColumnRole::Numeric));
        let cases = expand(&template, &bindings());
        let sql: Vec<&str> = cases.iter().map(|c| c.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "concat(c8, c8)",
                "concat(c8, c9)",
                "concat(c9, c8)",
                "concat(c9, c9)",
                "cast(c1 as binary(16))",
                "cast(c5 as binary(16))",
            ]
        );
        assert_eq!(cases[4].origin.rule, Some(1));
        assert_eq!(cases[4].origin.index, 4);
    }

    #[test]
    fn test_overlapping_rules_emit_once() {
        let template = Template::new("t", DataType::Binary(16))
            .combination(Combination::unary(Shape::Bare, ColumnRole::Character))
            .combination(Combination::unary(Shape::Bare, ColumnRole::Character))
            .literal(Expr::Column(ColumnRef::new("c8", DataType::Binary(16))));
        let cases = expand(&template, &bindings());
        assert_eq!(cases.len(), 2);
    }

    #[test]
    fn test_skip_float_slot() {
        let template = Template::new("t", DataType::Binary(16)).combination(
            Combination::pair(Shape::CastSum, ColumnRole::Numeric, ColumnRole::Timestamp)
                .skip_float(0),
        );
        let cases = expand(&template, &bindings());
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].sql, "cast(c1 + c10 as binary(16))");
    }

    #[test]
    fn test_empty_role_produces_nothing() {
        let b = bindings().with(ColumnRole::Boolean, Vec::new());
        let template = Template::new("t", DataType::Binary(16))
            .combination(Combination::pair(Shape::CastSum, ColumnRole::Numeric, ColumnRole::Boolean));
        assert!(expand(&template, &b).is_empty());
    }

    #[test]
    fn test_expand_invalid_forms() {
        let template = InvalidTemplate::new("bad", "substr", DataType::Binary(16))
            .rule(InvalidRule::rejected(
                Combination::unary(Shape::Bare, ColumnRole::Numeric),
                CallForm::WithColumn(ColumnRole::Boolean),
            ))
            .rule(InvalidRule::rejected(
                Combination::unary(Shape::Bare, ColumnRole::Numeric),
                CallForm::GroupBy,
            ))
            .rule(InvalidRule::rejected(
                Combination::unary(Shape::Bare, ColumnRole::Character),
                CallForm::Windowed {
                    args: vec![Datum::from("1")],
                    interval: "2d".to_string(),
                    sliding: "1d".to_string(),
                },
            ))
            .raw_call(vec![])
            .raw_call(vec![Expr::Star]);

        let cases = expand_invalid(&template, &bindings());
        let sql: Vec<String> = cases.iter().map(|c| c.render("db.t1")).collect();
        assert_eq!(
            sql,
            vec![
                "select substr(c1, c7) from db.t1",
                "select substr(c5, c7) from db.t1",
                "select c1 from db.t1 group by substr(c1)",
                "select c5 from db.t1 group by substr(c5)",
                "select substr(c8, '1') from db.t1 interval(2d) sliding(1d)",
                "select substr(c9, '1') from db.t1 interval(2d) sliding(1d)",
                "select substr() from db.t1",
                "select substr(*) from db.t1",
            ]
        );
        assert!(cases.iter().all(|c| c.status == InvalidStatus::Rejected));
        assert_eq!(cases[6].origin.rule, None);
    }

    #[test]
    fn test_unresolved_status_carried() {
        let template = InvalidTemplate::new("bad", "substr", DataType::Binary(16)).rule(
            InvalidRule::unresolved(
                Combination::pair(Shape::CastSum, ColumnRole::Character, ColumnRole::Timestamp),
                CallForm::WithLiterals(vec![Datum::Int(1), Datum::Int(6)]),
                "character plus timestamp",
            ),
        );
        let cases = expand_invalid(&template, &bindings());
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].call_sql(), "substr(cast(c8 + c10 as binary(16)), 1, 6)");
        assert!(matches!(cases[0].status, InvalidStatus::Unresolved { .. }));
    }
}
