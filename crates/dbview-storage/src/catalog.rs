use crate::engine::{quote_ident, Engine, Result};
use crate::value::CellValue;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
}

/// User tables in engine order. Engine-internal `sqlite_*` tables are hidden.
pub fn list_tables(engine: &Engine) -> Result<Vec<TableDescriptor>> {
    let result = engine.query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;

    Ok(result
        .rows
        .into_iter()
        .filter_map(|row| match row.into_iter().next() {
            Some(CellValue::Text(name)) => Some(TableDescriptor { name }),
            _ => None,
        })
        .collect())
}

pub fn drop_table(engine: &Engine, name: &str) -> Result<()> {
    engine.execute(&format!("DROP TABLE {}", quote_ident(name)))
}
