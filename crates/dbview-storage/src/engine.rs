use crate::value::CellValue;
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName, ToSql};
use std::io::Write;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table not found: {0}")]
    TableNotFound(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Rows returned by a query, with column names in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    /// A statement that produced no columns (e.g. DDL) has no result set.
    pub fn has_result_set(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub is_primary_key: bool,
    pub ordinal_position: i64,
}

/// Bracket-quote an identifier for interpolation into SQL.
///
/// Names come from catalog metadata, so nothing beyond quoting is applied.
pub fn quote_ident(name: &str) -> String {
    format!("[{name}]")
}

/// Thin synchronous wrapper around one in-memory SQLite connection.
#[derive(Debug)]
pub struct Engine {
    conn: Connection,
}

impl Engine {
    pub fn open_empty() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Load a serialized database image.
    ///
    /// The bytes are staged to a temp file and restored into a private
    /// in-memory connection. `Connection::deserialize` would avoid the temp
    /// file but needs a buffer allocated by `sqlite3_malloc`.
    pub fn open_bytes(bytes: &[u8]) -> Result<Self> {
        let mut staged = NamedTempFile::new()?;
        staged.as_file_mut().write_all(bytes)?;
        staged.as_file_mut().flush()?;

        let mut conn = Connection::open_in_memory()?;
        conn.restore(DatabaseName::Main, staged.path(), None::<fn(Progress)>)?;

        // Restoring garbage may only fail once a page is actually read.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))?;

        Ok(Self { conn })
    }

    /// Serialize the whole database to the on-disk file format.
    ///
    /// A database with no pages yet serializes to an empty image, which
    /// SQLite also accepts as an empty database.
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        let pages: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |r| r.get(0))?;
        if pages == 0 {
            return Ok(Vec::new());
        }
        Ok(self.conn.serialize(DatabaseName::Main)?.to_vec())
    }

    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.query_params(sql, &[])
    }

    pub fn query_params(&self, sql: &str, params: &[&dyn ToSql]) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params)?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(row.get::<_, CellValue>(idx)?);
            }
            rows.push(values);
        }

        Ok(QueryResult { columns, rows })
    }

    /// Run one or more statements that return no rows.
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a single bound statement and report the number of affected rows.
    pub fn execute_params(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Columns of `table` in ordinal order.
    ///
    /// Only the column the engine flags with `pk = 1` is treated as the
    /// primary key, so composite keys surface their first member only.
    pub fn table_metadata(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cid, name, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt.query_map([table], |r| {
            let pk: i64 = r.get(2)?;
            Ok(ColumnDescriptor {
                ordinal_position: r.get(0)?,
                name: r.get(1)?,
                is_primary_key: pk == 1,
            })
        })?;

        let mut columns = Vec::new();
        for column in rows {
            columns.push(column?);
        }

        if columns.is_empty() {
            return Err(StorageError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }
}
