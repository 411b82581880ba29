//! Table exports for dbview.
//!
//! Exports always cover the whole table: the current page and filter of the
//! view are ignored. Byte-level encoding of workbooks and archives is left to
//! `rust_xlsxwriter` and `zip`; this crate supplies the row-to-record
//! transform and the CSV/JSON text.

mod archive;
mod csv;
mod json;
mod record;
mod xlsx;

use dbview_storage::catalog;
use dbview_storage::{Engine, StorageError};
use thiserror::Error;

pub use crate::archive::bundle;
pub use crate::csv::{escape_csv, to_csv};
pub use crate::json::to_json;
pub use crate::record::{ExportRecord, ExportValue, TableExport, BLOB_PLACEHOLDER};
pub use crate::xlsx::{sheet_name, to_workbook, to_xlsx};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("query for table {0} returned no result set")]
    NoResultSet(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Csv,
    Json,
    Spreadsheet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Spreadsheet => "xlsx",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8",
            ExportFormat::Json => "application/json;charset=utf-8",
            ExportFormat::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    /// File name of the all-tables bundle for this format.
    pub fn archive_name(self) -> &'static str {
        match self {
            ExportFormat::Csv => "database_export.zip",
            ExportFormat::Json => "database_export_json.zip",
            ExportFormat::Spreadsheet => "database_export_xlsx.zip",
        }
    }
}

/// A finished download: what to call it and what to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

fn encode(export: &TableExport, format: ExportFormat) -> Result<Vec<u8>> {
    Ok(match format {
        ExportFormat::Csv => to_csv(export).into_bytes(),
        ExportFormat::Json => to_json(export)?.into_bytes(),
        ExportFormat::Spreadsheet => to_xlsx(export)?,
    })
}

/// Export one table as `<table>.<ext>`.
pub fn export_table(engine: &Engine, table: &str, format: ExportFormat) -> Result<ExportArtifact> {
    let export = TableExport::load(engine, table)?;
    Ok(ExportArtifact {
        file_name: format!("{table}.{}", format.extension()),
        mime: format.mime(),
        bytes: encode(&export, format)?,
    })
}

fn load_all(engine: &Engine) -> Result<Vec<TableExport>> {
    let mut exports = Vec::new();
    for table in catalog::list_tables(engine)? {
        match TableExport::load(engine, &table.name) {
            Ok(export) => exports.push(export),
            Err(err) => log::warn!("skipping table {} in export: {err}", table.name),
        }
    }
    Ok(exports)
}

/// Export every table in `format` and bundle the files into one zip.
///
/// Empty tables are included; tables whose query yields no result set are
/// skipped.
pub fn export_all_tables(engine: &Engine, format: ExportFormat) -> Result<ExportArtifact> {
    let mut entries = Vec::new();
    for export in load_all(engine)? {
        let name = format!("{}.{}", export.table_name, format.extension());
        entries.push((name, encode(&export, format)?));
    }

    Ok(ExportArtifact {
        file_name: format.archive_name().to_string(),
        mime: "application/zip",
        bytes: bundle(&entries)?,
    })
}

/// Export every table into a single workbook, one sheet per table.
pub fn export_workbook(engine: &Engine) -> Result<ExportArtifact> {
    let exports = load_all(engine)?;
    Ok(ExportArtifact {
        file_name: "database_export.xlsx".to_string(),
        mime: ExportFormat::Spreadsheet.mime(),
        bytes: to_workbook(&exports)?,
    })
}
