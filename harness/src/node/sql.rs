//! Dynamically typed SQL values
//!
//! Queries issued by the harness return a handful of scalar types; anything
//! else is expected to be cast to `text` in the query itself.

use sqlx::postgres::{PgArguments, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{Row, TypeInfo, ValueRef};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub type SqlRow = Vec<SqlValue>;

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, parsing text columns when needed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.pad(""),
            SqlValue::Bool(b) => f.pad(if *b { "t" } else { "f" }),
            SqlValue::Int(i) => f.pad(&i.to_string()),
            SqlValue::Float(x) => f.pad(&x.to_string()),
            SqlValue::Text(s) => f.pad(s),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<u16> for SqlValue {
    fn from(value: u16) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

pub(crate) fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(x) => query.bind(*x),
        SqlValue::Text(s) => query.bind(s.as_str()),
    }
}

pub(crate) fn decode_row(row: &PgRow) -> Result<SqlRow, sqlx::Error> {
    (0..row.len()).map(|index| decode_column(row, index)).collect()
}

fn decode_column(row: &PgRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Int(row.try_get(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(SqlValue::from("42").as_i64(), Some(42));
        assert_eq!(SqlValue::from(7u32).as_i64(), Some(7));
        assert_eq!(SqlValue::from(true).as_bool(), Some(true));
        assert_eq!(SqlValue::from("secondary").as_str(), Some("secondary"));
        assert!(SqlValue::from(None::<String>).is_null());
        assert_eq!(SqlValue::Float(1.5).as_i64(), None);
    }

    #[test]
    fn test_display_honours_width() {
        assert_eq!(format!("{:>4}", SqlValue::Int(3)), "   3");
        assert_eq!(format!("{:<8}|", SqlValue::from("node")), "node    |");
        assert_eq!(format!("{}", SqlValue::Bool(false)), "f");
        assert_eq!(SqlValue::Null.to_text(), "");
    }
}
