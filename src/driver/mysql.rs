//! Production driver over a MySQL-compatible endpoint

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Opts, OptsBuilder, Value};
use tracing::debug;

use super::{
    render_flush, Connection, Credentials, DriverError, DriverResult, Endpoint, ResultSet,
    DEFAULT_FLUSH_TEMPLATE,
};
use crate::value::{Datum, Row};

/// Text layouts accepted for timestamp columns
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Connect to the server at `endpoint`
///
/// Any failure to reach or authenticate against the server is reported as
/// [`DriverError::Connection`].
pub async fn connect(endpoint: &Endpoint, credentials: &Credentials) -> DriverResult<MySqlConnection> {
    let opts: Opts = OptsBuilder::default()
        .ip_or_hostname(endpoint.host.clone())
        .tcp_port(endpoint.port)
        .user(Some(credentials.user.clone()))
        .pass(credentials.password.clone())
        .into();

    let conn = Conn::new(opts)
        .await
        .map_err(|e| DriverError::Connection(format!("{}: {}", endpoint, e)))?;
    debug!(endpoint = %endpoint, "connected");

    Ok(MySqlConnection {
        conn,
        flush_template: DEFAULT_FLUSH_TEMPLATE.to_string(),
    })
}

/// A live server connection
pub struct MySqlConnection {
    conn: Conn,
    flush_template: String,
}

impl MySqlConnection {
    /// Use a different flush statement; `{database}` is replaced by the database name
    #[must_use]
    pub fn with_flush_template(mut self, template: impl Into<String>) -> Self {
        self.flush_template = template.into();
        self
    }

    /// Close the connection gracefully
    pub async fn disconnect(self) -> DriverResult<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn execute(&mut self, sql: &str) -> DriverResult<()> {
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> DriverResult<ResultSet> {
        let raw: Vec<mysql_async::Row> = self.conn.query(sql).await?;

        let columns = raw
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|c| c.name_str().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        let rows = raw
            .into_iter()
            .map(decode_row)
            .collect::<DriverResult<Vec<_>>>()?;

        Ok(ResultSet::new(sql, columns, rows))
    }

    async fn flush(&mut self, database: &str) -> DriverResult<()> {
        let sql = render_flush(&self.flush_template, database);
        self.conn.query_drop(sql).await?;
        Ok(())
    }
}

fn decode_row(row: mysql_async::Row) -> DriverResult<Row> {
    let columns = row.columns();
    let values = row.unwrap();
    columns
        .iter()
        .zip(values)
        .map(|(col, value)| decode_value(col, value))
        .collect::<DriverResult<Vec<_>>>()
        .map(Row::new)
}

fn decode_value(col: &Column, value: Value) -> DriverResult<Datum> {
    let unsigned = col.flags().contains(ColumnFlags::UNSIGNED_FLAG);
    match value {
        Value::NULL => Ok(Datum::Null),
        Value::Int(i) if unsigned => u64::try_from(i)
            .map(Datum::UInt)
            .map_err(|_| decode_error(col, format!("negative unsigned value {}", i))),
        Value::Int(i) => Ok(Datum::Int(i)),
        Value::UInt(u) => Ok(Datum::UInt(u)),
        Value::Float(f) => Ok(Datum::Float(f64::from(f))),
        Value::Double(d) => Ok(Datum::Float(d)),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros)
                })
                .map(|dt| Datum::Timestamp(dt.and_utc().timestamp_millis()))
                .ok_or_else(|| decode_error(col, "invalid date"))
        }
        Value::Time(..) => Err(decode_error(col, "time values are not supported")),
        Value::Bytes(bytes) => decode_text(col, bytes, unsigned),
    }
}

/// Decode a text-protocol cell according to its column type
fn decode_text(col: &Column, bytes: Vec<u8>, unsigned: bool) -> DriverResult<Datum> {
    let text = String::from_utf8(bytes).map_err(|e| decode_error(col, e.to_string()))?;
    match col.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                text.parse::<u64>()
                    .map(Datum::UInt)
                    .map_err(|e| decode_error(col, e.to_string()))
            } else {
                text.parse::<i64>()
                    .map(Datum::Int)
                    .map_err(|e| decode_error(col, e.to_string()))
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT
        | ColumnType::MYSQL_TYPE_DOUBLE
        | ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL => text
            .parse::<f64>()
            .map(Datum::Float)
            .map_err(|e| decode_error(col, e.to_string())),
        ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2
        | ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_DATE => parse_timestamp(&text)
            .map(Datum::Timestamp)
            .ok_or_else(|| decode_error(col, format!("unrecognized timestamp {:?}", text))),
        _ => Ok(Datum::String(text)),
    }
}

/// Parse a timestamp rendered as text into epoch milliseconds (UTC)
pub(crate) fn parse_timestamp(text: &str) -> Option<i64> {
    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn decode_error(col: &Column, message: impl Into<String>) -> DriverError {
    DriverError::Decode {
        column: col.name_str().into_owned(),
        message: message.into(),
    }
}
