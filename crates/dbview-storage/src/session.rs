use crate::catalog::{self, TableDescriptor};
use crate::editor::{self, CellEdit, EditError, EditOutcome};
use crate::engine::{Engine, StorageError};
use crate::notify::Notification;
use crate::viewer::{self, CellKind, PageQuery, TablePage};
use crate::working_file::{write_atomic, WorkingFile, WorkingFileStore};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// File name offered when the modified database is saved.
pub const DEFAULT_SAVE_FILE_NAME: &str = "database_modifiee.db";

const EDIT_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewState {
    table: String,
    filter: Option<String>,
    page: usize,
}

/// One open database file.
///
/// The session is the only owner of the engine handle; every mutation goes
/// through it, is followed by a write of the full database image to the
/// working-file store, and is visible to the next render.
pub struct Session {
    engine: Engine,
    file_name: String,
    last_touched_at: DateTime<Utc>,
    is_modified: bool,
    store: Arc<dyn WorkingFileStore>,
    tables: Vec<TableDescriptor>,
    active: Option<ViewState>,
    view: Option<TablePage>,
    generation: u64,
    notifications: Vec<Notification>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("file_name", &self.file_name)
            .field("last_touched_at", &self.last_touched_at)
            .field("is_modified", &self.is_modified)
            .field("tables", &self.tables)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open `bytes` as a new session and persist them as the working file.
    pub fn load(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        store: Arc<dyn WorkingFileStore>,
    ) -> Result<Self, StorageError> {
        let engine = Engine::open_bytes(&bytes)?;
        let mut session = Self::with_engine(engine, file_name.into(), store, Utc::now(), false);
        session.persist_bytes(bytes);
        session.refresh_catalog();
        Ok(session)
    }

    /// Reopen the persisted working file, if one exists and has not expired.
    ///
    /// A store that cannot be read is treated as empty.
    pub fn restore(
        store: Arc<dyn WorkingFileStore>,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, StorageError> {
        let file = match store.get(now) {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(None),
            Err(err) => {
                log::warn!("failed to read working file: {err}");
                return Ok(None);
            }
        };

        let engine = Engine::open_bytes(&file.bytes)?;
        let mut session =
            Self::with_engine(engine, file.file_name, store, file.touched_at, file.modified);
        session.refresh_catalog();
        Ok(Some(session))
    }

    fn with_engine(
        engine: Engine,
        file_name: String,
        store: Arc<dyn WorkingFileStore>,
        last_touched_at: DateTime<Utc>,
        is_modified: bool,
    ) -> Self {
        Self {
            engine,
            file_name,
            last_touched_at,
            is_modified,
            store,
            tables: Vec::new(),
            active: None,
            view: None,
            generation: 0,
            notifications: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn last_touched_at(&self) -> DateTime<Utc> {
        self.last_touched_at
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn current_view(&self) -> Option<&TablePage> {
        self.view.as_ref()
    }

    pub fn active_table(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.table.as_str())
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn refresh_catalog(&mut self) {
        match catalog::list_tables(&self.engine) {
            Ok(tables) => self.tables = tables,
            Err(err) => {
                log::error!("failed to list tables of {}: {err}", self.file_name);
                self.tables.clear();
                self.notify(Notification::error(format!("Could not list tables: {err}")));
            }
        }
    }

    /// Show page 1 of `table`. The filter is kept when re-selecting the
    /// active table and cleared otherwise.
    pub fn show_table(&mut self, table: &str) -> bool {
        let filter = self
            .active
            .as_ref()
            .filter(|a| a.table == table)
            .and_then(|a| a.filter.clone());
        self.render(ViewState {
            table: table.to_string(),
            filter,
            page: 1,
        })
    }

    /// Show `page` of `table` with `filter` in a single render.
    pub fn show(&mut self, table: &str, page: usize, filter: Option<String>) -> bool {
        self.render(ViewState {
            table: table.to_string(),
            filter: filter.filter(|f| !f.trim().is_empty()),
            page: page.max(1),
        })
    }

    pub fn show_page(&mut self, page: usize) -> bool {
        let Some(active) = self.active.clone() else {
            return false;
        };
        self.render(ViewState {
            page: page.max(1),
            ..active
        })
    }

    pub fn next_page(&mut self) -> bool {
        match self.view.as_ref().map(|v| v.pagination) {
            Some(p) if p.has_next() => self.show_page(p.page + 1),
            _ => false,
        }
    }

    pub fn prev_page(&mut self) -> bool {
        match self.view.as_ref().map(|v| v.pagination) {
            Some(p) if p.has_prev() => self.show_page(p.page - 1),
            _ => false,
        }
    }

    /// Apply a new filter to the active table, returning to page 1.
    pub fn set_filter(&mut self, filter: Option<String>) -> bool {
        let Some(active) = self.active.clone() else {
            return false;
        };
        self.render(ViewState {
            table: active.table,
            filter: filter.filter(|f| !f.trim().is_empty()),
            page: 1,
        })
    }

    /// Re-render the active page from the engine.
    pub fn reload(&mut self) -> bool {
        match self.active.clone() {
            Some(active) => self.render(active),
            None => false,
        }
    }

    fn render(&mut self, state: ViewState) -> bool {
        let query = PageQuery::new(state.table.clone())
            .with_filter(state.filter.clone())
            .with_page(state.page);
        let generation = self.generation + 1;

        match viewer::render_page(&self.engine, &query, generation) {
            Ok(page) => {
                if page.primary_key.is_none() {
                    self.notify(Notification::warning(format!(
                        "Table {} has no primary key; cells are read-only.",
                        page.table_name
                    )));
                }
                self.generation = generation;
                self.view = Some(page);
                self.active = Some(state);
                true
            }
            Err(err) => {
                log::error!("failed to display table {}: {err}", state.table);
                self.notify(Notification::error(format!(
                    "Could not display table {}: {err}",
                    state.table
                )));
                false
            }
        }
    }

    /// Commit an edit proposed against the current view.
    ///
    /// A failed edit re-renders the page so the view matches what is stored.
    pub fn commit_edit(&mut self, edit: &CellEdit) -> Result<EditOutcome, EditError> {
        match editor::propose_edit(&self.engine, edit) {
            Ok(EditOutcome::Unchanged) => Ok(EditOutcome::Unchanged),
            Ok(EditOutcome::Updated) => {
                self.is_modified = true;
                self.persist();
                let preview: String = editor::normalize_edit(&edit.new_text)
                    .chars()
                    .take(EDIT_PREVIEW_CHARS)
                    .collect();
                self.notify(Notification::info(format!(
                    "Updated {}.{} to \"{preview}\".",
                    edit.table, edit.column
                )));
                self.reload();
                Ok(EditOutcome::Updated)
            }
            Err(err) => {
                log::warn!("edit of {}.{} failed: {err}", edit.table, edit.column);
                self.notify(Notification::error(format!("Update failed: {err}")));
                self.reload();
                Err(err)
            }
        }
    }

    /// Edit the cell at `row` (0-based within the current page) of `column`.
    pub fn edit_cell(
        &mut self,
        row: usize,
        column: &str,
        new_text: &str,
    ) -> Result<EditOutcome, EditError> {
        let no_such_cell = || EditError::NoSuchCell {
            row,
            column: column.to_string(),
        };
        let view = self.view.as_ref().ok_or_else(no_such_cell)?;
        let rendered = view.rows.get(row).ok_or_else(no_such_cell)?;
        let cell = rendered.cell(column).ok_or_else(no_such_cell)?;
        if matches!(cell.kind, CellKind::Blob | CellKind::Image { .. }) {
            return Err(EditError::BinaryCell(column.to_string()));
        }

        let edit = CellEdit {
            table: view.table_name.clone(),
            key: rendered.key.clone(),
            column: column.to_string(),
            old_value: cell.value.clone(),
            new_text: new_text.to_string(),
        };
        self.commit_edit(&edit)
    }

    /// Drop `table` once `confirm` agrees.
    ///
    /// Returns `true` only when the table was dropped. A failed drop leaves
    /// both the catalog and the current view as they were.
    pub fn delete_table(&mut self, table: &str, confirm: impl FnOnce(&str) -> bool) -> bool {
        if !confirm(table) {
            return false;
        }

        if let Err(err) = catalog::drop_table(&self.engine, table) {
            log::error!("failed to drop table {table}: {err}");
            self.notify(Notification::error(format!(
                "Could not delete table {table}: {err}"
            )));
            return false;
        }

        self.notify(Notification::info(format!("Table {table} deleted.")));
        self.is_modified = true;
        self.persist();

        if self.active_table() == Some(table) {
            self.active = None;
            self.view = None;
        }
        self.refresh_catalog();
        true
    }

    /// Write the current database image to `path` and clear the modified flag.
    pub fn save_to(&mut self, path: &Path) -> Result<(), StorageError> {
        let result = self
            .engine
            .export_bytes()
            .and_then(|bytes| write_atomic(path, &bytes).map(|()| bytes).map_err(Into::into));

        match result {
            Ok(bytes) => {
                self.is_modified = false;
                self.persist_bytes(bytes);
                self.notify(Notification::info(format!(
                    "Database saved to {}.",
                    path.display()
                )));
                Ok(())
            }
            Err(err) => {
                log::error!("failed to save database to {}: {err}", path.display());
                self.notify(Notification::error(format!("Save failed: {err}")));
                Err(err)
            }
        }
    }

    /// Forget the persisted working file.
    pub fn discard(self) {
        if let Err(err) = self.store.clear() {
            log::warn!("failed to clear working file: {err}");
        }
    }

    fn persist(&mut self) {
        match self.engine.export_bytes() {
            Ok(bytes) => self.persist_bytes(bytes),
            Err(err) => log::warn!("failed to export database for persistence: {err}"),
        }
    }

    fn persist_bytes(&mut self, bytes: Vec<u8>) {
        self.last_touched_at = Utc::now();
        let file = WorkingFile {
            bytes,
            file_name: self.file_name.clone(),
            touched_at: self.last_touched_at,
            modified: self.is_modified,
        };
        if let Err(err) = self.store.put(&file) {
            log::warn!("failed to persist working file {}: {err}", self.file_name);
        }
    }
}
