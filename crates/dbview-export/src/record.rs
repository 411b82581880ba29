use crate::{ExportError, Result};
use dbview_storage::engine::quote_ident;
use dbview_storage::{CellValue, Engine};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Stands in for binary values in JSON and XLSX output.
pub const BLOB_PLACEHOLDER: &str = "[BLOB]";

/// A whole table as fetched from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExport {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TableExport {
    pub fn load(engine: &Engine, table: &str) -> Result<Self> {
        let result = engine.query(&format!("SELECT * FROM {}", quote_ident(table)))?;
        if !result.has_result_set() {
            return Err(ExportError::NoResultSet(table.to_string()));
        }
        Ok(Self {
            table_name: table.to_string(),
            columns: result.columns,
            rows: result.rows,
        })
    }

    pub fn records(&self) -> Vec<ExportRecord> {
        self.rows
            .iter()
            .map(|row| ExportRecord {
                fields: self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(ExportValue::from))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&CellValue> for ExportValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Null => ExportValue::Null,
            CellValue::Integer(i) => ExportValue::Integer(*i),
            CellValue::Real(f) => ExportValue::Real(*f),
            CellValue::Text(s) => ExportValue::Text(s.clone()),
            CellValue::Blob(_) => ExportValue::Text(BLOB_PLACEHOLDER.to_string()),
        }
    }
}

/// One row as an ordered column-to-value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub fields: Vec<(String, ExportValue)>,
}

impl ExportRecord {
    pub fn get(&self, column: &str) -> Option<&ExportValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

// Serialized as a map so keys keep column order.
impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
