use crate::record::TableExport;
use crate::Result;

/// Pretty-printed array of row objects, keys in column order.
pub fn to_json(export: &TableExport) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export.records())?)
}
