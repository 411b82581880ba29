use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use std::fmt;

/// A single cell as returned by the engine.
///
/// SQLite storage classes map one-to-one onto the variants, so rendering and
/// export code can match exhaustively instead of sniffing runtime types.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            CellValue::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Text shown in the table view. `NULL` is spelled out here, unlike in
    /// CSV exports where it becomes an empty field.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            other => other.export_text(),
        }
    }

    /// Text written to CSV. Blobs fall back to a lossy UTF-8 decode.
    pub fn export_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(f) => CellValue::Real(f),
            ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => CellValue::Blob(bytes.to_vec()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl FromSql for CellValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(value.into())
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            CellValue::Null => ValueRef::Null,
            CellValue::Integer(i) => ValueRef::Integer(*i),
            CellValue::Real(f) => ValueRef::Real(*f),
            CellValue::Text(s) => ValueRef::Text(s.as_bytes()),
            CellValue::Blob(bytes) => ValueRef::Blob(bytes),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}
