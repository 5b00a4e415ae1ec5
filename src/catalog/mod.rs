//! Catalog - table and column definitions for test schemas
//!
//! The schema builder validates definitions before any DDL is sent, so a
//! malformed schema aborts a session without touching the server. Ordinary
//! tables, super-tables (column templates with tag columns), and subtables
//! (children of a super-table with fixed tag values) are all described by
//! `TableDef`.

pub mod error;

use std::collections::{HashMap, HashSet};

pub use error::{SchemaError, SchemaResult};

use crate::value::Datum;

/// Scalar column types supported by the server under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit signed integer
    TinyInt,
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    BigInt,
    /// 8-bit unsigned integer
    UTinyInt,
    /// 16-bit unsigned integer
    USmallInt,
    /// 32-bit unsigned integer
    UInt,
    /// 64-bit unsigned integer
    UBigInt,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Boolean (true/false)
    Bool,
    /// Fixed-length binary text, width in bytes
    Binary(u32),
    /// Wide (multi-byte) text, width in characters
    NChar(u32),
    /// Millisecond timestamp
    Timestamp,
}

/// Role of a column in combinatorial case expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnRole {
    Numeric,
    Character,
    Boolean,
    Timestamp,
}

impl ColumnRole {
    /// All roles in expansion order
    pub const ALL: [ColumnRole; 4] = [
        ColumnRole::Numeric,
        ColumnRole::Character,
        ColumnRole::Boolean,
        ColumnRole::Timestamp,
    ];
}

impl DataType {
    /// The expansion role this type belongs to
    pub fn role(&self) -> ColumnRole {
        match self {
            DataType::Bool => ColumnRole::Boolean,
            DataType::Binary(_) | DataType::NChar(_) => ColumnRole::Character,
            DataType::Timestamp => ColumnRole::Timestamp,
            _ => ColumnRole::Numeric,
        }
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        self.role() == ColumnRole::Numeric
    }

    /// Check if this type is an unsigned integer
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            DataType::UTinyInt | DataType::USmallInt | DataType::UInt | DataType::UBigInt
        )
    }

    /// Check if this type is floating point
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    /// Check if this type is a text type
    pub fn is_text(&self) -> bool {
        self.role() == ColumnRole::Character
    }

    /// SQL spelling of the type in DDL
    pub fn sql_name(&self) -> String {
        match self {
            DataType::TinyInt => "tinyint".to_string(),
            DataType::SmallInt => "smallint".to_string(),
            DataType::Int => "int".to_string(),
            DataType::BigInt => "bigint".to_string(),
            DataType::UTinyInt => "tinyint unsigned".to_string(),
            DataType::USmallInt => "smallint unsigned".to_string(),
            DataType::UInt => "int unsigned".to_string(),
            DataType::UBigInt => "bigint unsigned".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Bool => "bool".to_string(),
            DataType::Binary(n) => format!("binary({})", n),
            DataType::NChar(n) => format!("nchar({})", n),
            DataType::Timestamp => "timestamp".to_string(),
        }
    }

    /// Smallest representable value, for numeric types
    pub fn min_value(&self) -> Option<Datum> {
        let value = match self {
            DataType::TinyInt => Datum::Int(i8::MIN.into()),
            DataType::SmallInt => Datum::Int(i16::MIN.into()),
            DataType::Int => Datum::Int(i32::MIN.into()),
            DataType::BigInt => Datum::Int(i64::MIN),
            DataType::UTinyInt | DataType::USmallInt | DataType::UInt | DataType::UBigInt => {
                Datum::UInt(0)
            }
            DataType::Float => Datum::Float(f32::MIN.into()),
            DataType::Double => Datum::Float(f64::MIN),
            _ => return None,
        };
        Some(value)
    }

    /// Largest representable value, for numeric types
    pub fn max_value(&self) -> Option<Datum> {
        let value = match self {
            DataType::TinyInt => Datum::Int(i8::MAX.into()),
            DataType::SmallInt => Datum::Int(i16::MAX.into()),
            DataType::Int => Datum::Int(i32::MAX.into()),
            DataType::BigInt => Datum::Int(i64::MAX),
            DataType::UTinyInt => Datum::UInt(u8::MAX.into()),
            DataType::USmallInt => Datum::UInt(u16::MAX.into()),
            DataType::UInt => Datum::UInt(u32::MAX.into()),
            DataType::UBigInt => Datum::UInt(u64::MAX),
            DataType::Float => Datum::Float(f32::MAX.into()),
            DataType::Double => Datum::Float(f64::MAX),
            _ => return None,
        };
        Some(value)
    }

    /// Check whether a value can be stored in a column of this type
    pub fn accepts(&self, value: &Datum) -> bool {
        match (self, value) {
            (_, Datum::Null) => true,
            (DataType::Bool, Datum::Bool(_)) => true,
            (DataType::Timestamp, Datum::Timestamp(_) | Datum::Int(_)) => true,
            (DataType::Float | DataType::Double, Datum::Float(_) | Datum::Int(_)) => true,
            (DataType::Binary(n), Datum::String(s)) => s.len() <= *n as usize,
            (DataType::NChar(n), Datum::String(s)) => s.chars().count() <= *n as usize,
            (ty, Datum::Int(i)) if ty.is_numeric() && !ty.is_float() => {
                match (ty.min_value(), ty.max_value()) {
                    (Some(min), Some(max)) => {
                        let lo = min.as_f64().unwrap_or(f64::MIN);
                        let hi = max.as_f64().unwrap_or(f64::MAX);
                        (lo..=hi).contains(&(*i as f64))
                    }
                    _ => false,
                }
            }
            (ty, Datum::UInt(u)) if ty.is_unsigned() => match ty.max_value() {
                Some(Datum::UInt(max)) => *u <= max,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// The expansion role of this column
    pub fn role(&self) -> ColumnRole {
        self.data_type.role()
    }
}

/// What kind of table a definition describes
#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    /// Ordinary table
    Normal,
    /// Template table whose children add tag values
    Super { tags: Vec<ColumnDef> },
    /// Child of a super-table, distinguished by its tag values
    Child {
        parent: String,
        tags: Vec<ColumnDef>,
        tag_values: Vec<Datum>,
    },
}

/// Table definition
///
/// Immutable once created; the first column is always the primary timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    /// Database the table lives in
    pub database: String,
    /// Table name
    pub name: String,
    /// Column definitions (primary timestamp first)
    pub columns: Vec<ColumnDef>,
    /// Ordinary, super, or child table
    pub kind: TableKind,
}

impl TableDef {
    /// `database.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// The primary timestamp column; `None` for a definition built without columns
    pub fn primary_column(&self) -> Option<&ColumnDef> {
        self.columns.first()
    }

    /// Columns other than the primary timestamp
    pub fn data_columns(&self) -> &[ColumnDef] {
        self.columns.get(1..).unwrap_or_default()
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Check if this is a super-table
    pub fn is_super(&self) -> bool {
        matches!(self.kind, TableKind::Super { .. })
    }

    /// CREATE TABLE statement for this definition
    pub fn create_sql(&self) -> String {
        match &self.kind {
            TableKind::Normal => format!(
                "create table {} ({})",
                self.qualified_name(),
                render_columns(&self.columns)
            ),
            TableKind::Super { tags } => format!(
                "create table {} ({}) tags ({})",
                self.qualified_name(),
                render_columns(&self.columns),
                render_columns(tags)
            ),
            TableKind::Child {
                parent, tag_values, ..
            } => format!(
                "create table {} using {}.{} tags ({})",
                self.qualified_name(),
                self.database,
                parent,
                tag_values
                    .iter()
                    .map(Datum::to_sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// DROP TABLE statement for this definition
    pub fn drop_sql(&self) -> String {
        format!("drop table if exists {}", self.qualified_name())
    }
}

fn render_columns(columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.data_type.sql_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validating builder for the tables of one test database
#[derive(Debug)]
pub struct SchemaBuilder {
    database: String,
    tables: HashMap<String, TableDef>,
    /// Creation order, so teardown can drop children before parents
    order: Vec<String>,
}

impl SchemaBuilder {
    /// Create a builder for tables in `database`
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            tables: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Database the tables are defined in
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Define an ordinary table
    pub fn define_table(
        &mut self,
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> SchemaResult<TableDef> {
        let name = name.into();
        validate_columns(&name, &columns)?;
        self.register(TableDef {
            database: self.database.clone(),
            name,
            columns,
            kind: TableKind::Normal,
        })
    }

    /// Define a super-table with its tag columns
    pub fn define_super_table(
        &mut self,
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        tags: Vec<ColumnDef>,
    ) -> SchemaResult<TableDef> {
        let name = name.into();
        validate_columns(&name, &columns)?;
        if tags.is_empty() {
            return Err(SchemaError::NoTags(name));
        }

        let data_names: HashSet<String> =
            columns.iter().map(|c| c.name.to_lowercase()).collect();
        let mut tag_names = HashSet::new();
        for tag in &tags {
            let key = tag.name.to_lowercase();
            if data_names.contains(&key) {
                return Err(SchemaError::TagCollision {
                    table: name,
                    tag: tag.name.clone(),
                });
            }
            if !tag_names.insert(key) {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: tag.name.clone(),
                });
            }
            check_width(&name, tag)?;
        }

        self.register(TableDef {
            database: self.database.clone(),
            name,
            columns,
            kind: TableKind::Super { tags },
        })
    }

    /// Define a subtable of `parent` with fixed tag values
    pub fn define_subtable(
        &mut self,
        parent: &TableDef,
        name: impl Into<String>,
        tag_values: Vec<Datum>,
    ) -> SchemaResult<TableDef> {
        let name = name.into();
        let TableKind::Super { tags } = &parent.kind else {
            return Err(SchemaError::NotSuperTable(parent.name.clone()));
        };
        if tags.len() != tag_values.len() {
            return Err(SchemaError::TagArity {
                table: name,
                expected: tags.len(),
                got: tag_values.len(),
            });
        }
        for (tag, value) in tags.iter().zip(&tag_values) {
            if !tag.data_type.accepts(value) {
                return Err(SchemaError::TagType {
                    table: name,
                    tag: tag.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        self.register(TableDef {
            database: self.database.clone(),
            name,
            columns: parent.columns.clone(),
            kind: TableKind::Child {
                parent: parent.name.clone(),
                tags: tags.clone(),
                tag_values,
            },
        })
    }

    /// Get a defined table by name
    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Definitions in creation order
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.order.iter().filter_map(|name| self.tables.get(name))
    }

    /// Children of a super-table, in creation order
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a TableDef> {
        self.tables().filter(move |t| {
            matches!(&t.kind, TableKind::Child { parent: p, .. } if p == parent)
        })
    }

    fn register(&mut self, def: TableDef) -> SchemaResult<TableDef> {
        if self.tables.contains_key(&def.name) {
            return Err(SchemaError::TableExists(def.name));
        }
        self.order.push(def.name.clone());
        self.tables.insert(def.name.clone(), def.clone());
        Ok(def)
    }
}

fn validate_columns(table: &str, columns: &[ColumnDef]) -> SchemaResult<()> {
    let first = columns
        .first()
        .ok_or_else(|| SchemaError::NoColumns(table.to_string()))?;
    if first.data_type != DataType::Timestamp {
        return Err(SchemaError::MissingPrimaryTimestamp {
            table: table.to_string(),
            column: first.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    for col in columns {
        if !seen.insert(col.name.to_lowercase()) {
            return Err(SchemaError::DuplicateColumn {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
        check_width(table, col)?;
    }
    Ok(())
}

fn check_width(table: &str, col: &ColumnDef) -> SchemaResult<()> {
    if matches!(col.data_type, DataType::Binary(0) | DataType::NChar(0)) {
        return Err(SchemaError::InvalidWidth {
            table: table.to_string(),
            column: col.name.clone(),
        });
    }
    Ok(())
}
