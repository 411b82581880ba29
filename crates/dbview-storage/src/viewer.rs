//! Paged, filterable table view.
//!
//! A page is fully materialized from the engine before anything is handed to
//! the caller, so a failing query never yields a partial table.

use crate::engine::{quote_ident, ColumnDescriptor, Engine, QueryResult, Result};
use crate::value::CellValue;
use serde::Serialize;

/// Rows per page.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub table_name: String,
    /// `None` or an empty string disables filtering.
    pub filter: Option<String>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl PageQuery {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            filter: None,
            page: 1,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn active_filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.trim().is_empty())
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub total_pages: usize,
    pub total_rows: u64,
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page: usize, total_rows: u64, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = (total_rows as usize).div_ceil(page_size);
        Self {
            page: page.max(1),
            total_pages,
            total_rows,
            page_size,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Controls are only shown when there is more than one page.
    pub fn is_visible(&self) -> bool {
        self.total_pages > 1
    }
}

/// Identity of a rendered row: the primary-key column and the value it held
/// when the page was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey {
    pub column: String,
    pub value: CellValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Null,
    Text,
    Link { url: String },
    Image { mime: &'static str },
    Blob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCell {
    pub column: String,
    pub value: CellValue,
    pub kind: CellKind,
    pub is_primary_key: bool,
    pub editable: bool,
}

impl RenderedCell {
    pub fn text(&self) -> String {
        match &self.kind {
            CellKind::Image { mime } => format!("[IMAGE {mime}]"),
            CellKind::Blob => "[BLOB]".to_string(),
            _ => self.value.display_text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub key: Option<RowKey>,
    pub cells: Vec<RenderedCell>,
}

impl RenderedRow {
    pub fn cell(&self, column: &str) -> Option<&RenderedCell> {
        self.cells.iter().find(|c| c.column == column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePage {
    pub table_name: String,
    pub filter: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<String>,
    pub rows: Vec<RenderedRow>,
    pub pagination: Pagination,
    /// Render pass this page belongs to; async work started for it carries
    /// the same tag.
    pub generation: u64,
}

impl TablePage {
    pub fn link_urls(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter_map(|c| match &c.kind {
                CellKind::Link { url } => Some(url.as_str()),
                _ => None,
            })
    }
}

/// Absolute `http`/`https` URL check.
pub fn is_link(text: &str) -> bool {
    url::Url::parse(text)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Build the `WHERE` body matching `filter` as a case-insensitive substring of
/// any column's text form.
///
/// Quotes in the filter are doubled; `%` and `_` keep their `LIKE` meaning.
pub fn filter_predicate(columns: &[ColumnDescriptor], filter: &str) -> Option<String> {
    if filter.trim().is_empty() || columns.is_empty() {
        return None;
    }
    let escaped = filter.replace('\'', "''");
    let clauses: Vec<String> = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT) LIKE '%{escaped}%'", quote_ident(&c.name)))
        .collect();
    Some(format!("({})", clauses.join(" OR ")))
}

fn where_clause(columns: &[ColumnDescriptor], filter: Option<&str>) -> String {
    match filter.and_then(|f| filter_predicate(columns, f)) {
        Some(predicate) => format!(" WHERE {predicate}"),
        None => String::new(),
    }
}

pub fn count_matching(
    engine: &Engine,
    table: &str,
    columns: &[ColumnDescriptor],
    filter: Option<&str>,
) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_ident(table),
        where_clause(columns, filter)
    );
    let result = engine.query(&sql)?;
    let count = match result.rows.first().and_then(|r| r.first()) {
        Some(CellValue::Integer(n)) => (*n).max(0) as u64,
        _ => 0,
    };
    Ok(count)
}

/// Fetch one page in engine scan order. There is no `ORDER BY`, so page
/// boundaries are only as stable as the engine's default order.
pub fn fetch_page(
    engine: &Engine,
    query: &PageQuery,
    columns: &[ColumnDescriptor],
) -> Result<QueryResult> {
    let sql = format!(
        "SELECT * FROM {}{} LIMIT {} OFFSET {}",
        quote_ident(&query.table_name),
        where_clause(columns, query.active_filter()),
        query.page_size,
        query.offset()
    );
    engine.query(&sql)
}

fn classify(value: &CellValue) -> CellKind {
    match value {
        CellValue::Null => CellKind::Null,
        CellValue::Blob(bytes) => match infer::get(bytes) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => CellKind::Image {
                mime: kind.mime_type(),
            },
            _ => CellKind::Blob,
        },
        CellValue::Text(text) if is_link(text) => CellKind::Link { url: text.clone() },
        _ => CellKind::Text,
    }
}

pub fn render_page(engine: &Engine, query: &PageQuery, generation: u64) -> Result<TablePage> {
    let columns = engine.table_metadata(&query.table_name)?;
    let primary_key = columns
        .iter()
        .find(|c| c.is_primary_key)
        .map(|c| c.name.clone());

    let total_rows = count_matching(engine, &query.table_name, &columns, query.active_filter())?;
    let pagination = Pagination::new(query.page, total_rows, query.page_size);
    let fetched = fetch_page(engine, query, &columns)?;

    let key_index = primary_key.as_deref().and_then(|pk| fetched.column_index(pk));
    let rows = fetched
        .rows
        .into_iter()
        .map(|values| {
            let key = match (&primary_key, key_index) {
                (Some(column), Some(idx)) => Some(RowKey {
                    column: column.clone(),
                    value: values[idx].clone(),
                }),
                _ => None,
            };
            let cells = fetched
                .columns
                .iter()
                .zip(values)
                .map(|(column, value)| {
                    let is_primary_key = primary_key.as_deref() == Some(column.as_str());
                    let kind = classify(&value);
                    let editable = key.is_some()
                        && !is_primary_key
                        && !matches!(kind, CellKind::Blob | CellKind::Image { .. });
                    RenderedCell {
                        column: column.clone(),
                        value,
                        kind,
                        is_primary_key,
                        editable,
                    }
                })
                .collect();
            RenderedRow { key, cells }
        })
        .collect();

    Ok(TablePage {
        table_name: query.table_name.clone(),
        filter: query.active_filter().map(str::to_string),
        columns,
        primary_key,
        rows,
        pagination,
        generation,
    })
}
