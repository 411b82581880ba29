//! In-memory SQLite sessions for dbview.
//!
//! A [`Session`] owns the single engine handle for one open database file and
//! exposes:
//! - the table catalog (list / drop)
//! - a paged, filterable table view with primary-key awareness
//! - single-cell edits keyed by the primary key captured at render time
//! - persistence of the working file with a fixed inactivity expiry
//!
//! Every engine call is synchronous; the session is the only owner of the
//! connection so a render always observes the last committed edit.

pub mod catalog;
pub mod editor;
pub mod engine;
mod notify;
pub mod session;
pub mod value;
pub mod viewer;
pub mod working_file;

pub use catalog::TableDescriptor;
pub use editor::{CellEdit, EditError, EditOutcome};
pub use engine::{ColumnDescriptor, Engine, QueryResult, StorageError};
pub use notify::{Level, Notification};
pub use session::{Session, DEFAULT_SAVE_FILE_NAME};
pub use value::CellValue;
pub use viewer::{
    CellKind, PageQuery, Pagination, RenderedCell, RenderedRow, RowKey, TablePage, PAGE_SIZE,
};
pub use working_file::{
    FsWorkingFileStore, InMemoryWorkingFileStore, PersistError, WorkingFile, WorkingFileStore,
    SESSION_TTL,
};
