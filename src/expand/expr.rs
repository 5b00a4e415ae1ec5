//! Expression descriptors and their SQL rendering

use std::fmt;

use crate::catalog::DataType;
use crate::value::Datum;

/// A typed reference to a table column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Argument expression passed to the function under test
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column of the queried table
    Column(ColumnRef),
    /// A constant
    Literal(Datum),
    /// An identifier that names no column
    Ident(String),
    /// `*`
    Star,
    Upper(Box<Expr>),
    Ceil(Box<Expr>),
    Cast { expr: Box<Expr>, target: DataType },
    Add(Box<Expr>, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>, data_type: DataType) -> Self {
        Expr::Column(ColumnRef::new(name, data_type))
    }

    pub fn upper(e: Expr) -> Self {
        Expr::Upper(Box::new(e))
    }

    pub fn ceil(e: Expr) -> Self {
        Expr::Ceil(Box::new(e))
    }

    pub fn cast(e: Expr, target: DataType) -> Self {
        Expr::Cast {
            expr: Box::new(e),
            target,
        }
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::Add(Box::new(a), Box::new(b))
    }

    pub fn concat(a: Expr, b: Expr) -> Self {
        Expr::Concat(Box::new(a), Box::new(b))
    }

    /// Columns referenced anywhere in the expression
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) | Expr::Ident(_) | Expr::Star => {}
            Expr::Upper(e) | Expr::Ceil(e) | Expr::Cast { expr: e, .. } => e.collect_columns(out),
            Expr::Add(a, b) | Expr::Concat(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c.name),
            Expr::Literal(d) => write!(f, "{}", d.to_sql_literal()),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Star => write!(f, "*"),
            Expr::Upper(e) => write!(f, "upper({})", e),
            Expr::Ceil(e) => write!(f, "ceil({})", e),
            Expr::Cast { expr, target } => write!(f, "cast({} as {})", expr, target.sql_name()),
            Expr::Add(a, b) => write!(f, "{} + {}", a, b),
            Expr::Concat(a, b) => write!(f, "concat({}, {})", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested() {
        let c8 = Expr::column("c8", DataType::Binary(16));
        let c1 = Expr::column("c1", DataType::Int);
        let e = Expr::concat(
            Expr::cast(Expr::add(c8.clone(), c1), DataType::Binary(16)),
            c8,
        );
        assert_eq!(e.to_string(), "concat(cast(c8 + c1 as binary(16)), c8)");
        let names: Vec<&str> = e.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c8", "c1", "c8"]);
    }

    #[test]
    fn test_render_literal_with_quotes() {
        let e = Expr::Literal(Datum::from("  :'><?  "));
        assert_eq!(e.to_string(), "\"  :'><?  \"");
    }
}
