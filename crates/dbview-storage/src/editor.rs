use crate::engine::{quote_ident, Engine, StorageError};
use crate::value::CellValue;
use crate::viewer::RowKey;
use rusqlite::params;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("table {0} has no primary key; cells cannot be edited safely")]
    NoPrimaryKey(String),
    #[error("primary key column {0} is read-only")]
    KeyColumn(String),
    #[error("no row of {table} has {column} = {value}")]
    RowNotFound {
        table: String,
        column: String,
        value: CellValue,
    },
    #[error("column {0} holds binary data and cannot be edited as text")]
    BinaryCell(String),
    #[error("no rendered cell at row {row}, column {column}")]
    NoSuchCell { row: usize, column: String },
    #[error(transparent)]
    Engine(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The committed text matched what was rendered; nothing was written.
    Unchanged,
    Updated,
}

/// A proposed single-cell change, as committed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub table: String,
    pub key: Option<RowKey>,
    pub column: String,
    /// The value captured when the row was rendered.
    pub old_value: CellValue,
    pub new_text: String,
}

/// Surrounding whitespace picked up while editing in place is not part of
/// the value.
pub fn normalize_edit(text: &str) -> &str {
    text.trim()
}

/// The committed text matches what was rendered, either exactly or once
/// surrounding whitespace is ignored on both sides.
pub fn is_unchanged(old_value: &CellValue, new_text: &str) -> bool {
    let rendered = old_value.display_text();
    new_text == rendered || normalize_edit(new_text) == rendered.trim()
}

/// Apply `edit` as a single-row update keyed by the captured primary key.
///
/// Both the new text and the key value are bound, never interpolated.
pub fn propose_edit(engine: &Engine, edit: &CellEdit) -> Result<EditOutcome, EditError> {
    let key = edit
        .key
        .as_ref()
        .ok_or_else(|| EditError::NoPrimaryKey(edit.table.clone()))?;
    if key.column == edit.column {
        return Err(EditError::KeyColumn(key.column.clone()));
    }

    if is_unchanged(&edit.old_value, &edit.new_text) {
        return Ok(EditOutcome::Unchanged);
    }

    let sql = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        quote_ident(&edit.table),
        quote_ident(&edit.column),
        quote_ident(&key.column)
    );
    let new_value = normalize_edit(&edit.new_text);
    let changed = engine.execute_params(&sql, params![new_value, key.value])?;
    log::debug!(
        "updated {}.{} where {} = {} ({changed} row(s))",
        edit.table,
        edit.column,
        key.column,
        key.value
    );

    if changed == 0 {
        return Err(EditError::RowNotFound {
            table: edit.table.clone(),
            column: key.column.clone(),
            value: key.value.clone(),
        });
    }
    Ok(EditOutcome::Updated)
}
