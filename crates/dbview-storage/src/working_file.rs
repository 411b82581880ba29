use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Inactivity window after which a persisted working file is discarded.
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

const BYTES_FILE: &str = "working.db";
const META_FILE: &str = "working.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The raw bytes of the open database plus what is needed to restore the
/// session around them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub touched_at: DateTime<Utc>,
    pub modified: bool,
}

impl WorkingFile {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.touched_at).to_std() {
            Ok(age) => age >= ttl,
            // Touched in the future (clock skew): keep it.
            Err(_) => false,
        }
    }
}

/// Single-slot persistence for the working file.
pub trait WorkingFileStore: Send + Sync {
    fn put(&self, file: &WorkingFile) -> Result<(), PersistError>;

    /// Read the slot without applying expiry.
    fn get_raw(&self) -> Result<Option<WorkingFile>, PersistError>;

    fn clear(&self) -> Result<(), PersistError>;

    fn ttl(&self) -> Duration {
        SESSION_TTL
    }

    /// Read the slot, treating an expired entry as absent and clearing it.
    fn get(&self, now: DateTime<Utc>) -> Result<Option<WorkingFile>, PersistError> {
        let Some(file) = self.get_raw()? else {
            return Ok(None);
        };
        if file.is_expired(now, self.ttl()) {
            log::debug!("working file {} expired; clearing", file.file_name);
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(file))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWorkingFileStore {
    slot: Mutex<Option<WorkingFile>>,
    ttl: Option<Duration>,
}

impl InMemoryWorkingFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl WorkingFileStore for InMemoryWorkingFileStore {
    fn put(&self, file: &WorkingFile) -> Result<(), PersistError> {
        *self.slot.lock().expect("working file mutex poisoned") = Some(file.clone());
        Ok(())
    }

    fn get_raw(&self) -> Result<Option<WorkingFile>, PersistError> {
        Ok(self.slot.lock().expect("working file mutex poisoned").clone())
    }

    fn clear(&self) -> Result<(), PersistError> {
        *self.slot.lock().expect("working file mutex poisoned") = None;
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl.unwrap_or(SESSION_TTL)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkingFileMeta {
    file_name: String,
    touched_at: DateTime<Utc>,
    #[serde(default)]
    modified: bool,
}

/// Directory-backed store: the database image and a small JSON sidecar.
#[derive(Debug, Clone)]
pub struct FsWorkingFileStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FsWorkingFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bytes_path(&self) -> PathBuf {
        self.dir.join(BYTES_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }
}

/// Write via a temp file in the destination directory and rename into place,
/// so a crash never leaves a half-written slot behind.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let err = match tmp.persist(path) {
        Ok(_) => return Ok(()),
        Err(err) => err,
    };
    if err.error.kind() != std::io::ErrorKind::AlreadyExists {
        return Err(err.error);
    }

    // Platforms that refuse to rename over an existing file: clear the slot
    // and retry once.
    if let Err(remove_err) = std::fs::remove_file(path) {
        log::debug!(
            "could not remove {} before replacing it: {remove_err}",
            path.display()
        );
    }
    err.file.persist(path).map(|_| ()).map_err(|e| e.error)
}

impl WorkingFileStore for FsWorkingFileStore {
    fn put(&self, file: &WorkingFile) -> Result<(), PersistError> {
        let meta = WorkingFileMeta {
            file_name: file.file_name.clone(),
            touched_at: file.touched_at,
            modified: file.modified,
        };
        // Bytes first: a sidecar never points at a missing image.
        write_atomic(&self.bytes_path(), &file.bytes)?;
        write_atomic(&self.meta_path(), &serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    fn get_raw(&self) -> Result<Option<WorkingFile>, PersistError> {
        let meta = match std::fs::read(self.meta_path()) {
            Ok(raw) => serde_json::from_slice::<WorkingFileMeta>(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let bytes = match std::fs::read(self.bytes_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(WorkingFile {
            bytes,
            file_name: meta.file_name,
            touched_at: meta.touched_at,
            modified: meta.modified,
        }))
    }

    fn clear(&self) -> Result<(), PersistError> {
        for path in [self.meta_path(), self.bytes_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(touched_at: DateTime<Utc>) -> WorkingFile {
        WorkingFile {
            bytes: vec![1, 2, 3],
            file_name: "app.db".to_string(),
            touched_at,
            modified: false,
        }
    }

    #[test]
    fn entry_expires_after_ttl() {
        let now = Utc::now();
        let store = InMemoryWorkingFileStore::new();
        store.put(&sample(now)).unwrap();

        assert!(store.get(now + chrono::Duration::seconds(299)).unwrap().is_some());
        assert!(store.get(now + chrono::Duration::seconds(300)).unwrap().is_none());
        // Expired reads clear the slot.
        assert!(store.get_raw().unwrap().is_none());
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("working.db");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn future_timestamps_are_not_expired() {
        let now = Utc::now();
        let file = sample(now + chrono::Duration::hours(1));
        assert!(!file.is_expired(now, SESSION_TTL));
    }
}
