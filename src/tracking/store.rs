//! Tracker Storage
//!
//! Three whole documents, each read in full and replaced atomically:
//! write to a temp file in the same directory, fsync, rename over the
//! target, fsync the directory. Readers never see a torn file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {document}: {source}")]
    Json {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The three logical documents owned by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    CurrentState,
    History,
    Killed,
}

impl Document {
    pub const ALL: [Document; 3] = [Document::CurrentState, Document::History, Document::Killed];

    pub fn file_name(self) -> &'static str {
        match self {
            Document::CurrentState => "current_zombies.json",
            Document::History => "zombie_history.json",
            Document::Killed => "killed_zombies.json",
        }
    }
}

/// Whole-document storage with atomic replace
pub trait TrackerStore: Send + Sync {
    /// Raw bytes of a document, `None` if it was never written
    fn load(&self, document: Document) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace a document atomically
    fn save(&self, document: Document, bytes: &[u8]) -> Result<(), StoreError>;

    /// Lock serialising read-modify-write cycles on this storage area
    fn write_lock(&self) -> Arc<Mutex<()>>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

// ============================================================================
// FILE STORE
// ============================================================================

/// One lock per data directory, shared by every store opened on it
static DIRECTORY_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn directory_lock(dir: &Path) -> Arc<Mutex<()>> {
    DIRECTORY_LOCKS
        .lock()
        .entry(dir.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// JSON files in a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open (and create if needed) a data directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let dir = dir.canonicalize().map_err(|e| StoreError::io(dir, e))?;

        Ok(Self {
            lock: directory_lock(&dir),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, document: Document) -> PathBuf {
        self.dir.join(document.file_name())
    }
}

impl TrackerStore for FileStore {
    fn load(&self, document: Document) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(document);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn save(&self, document: Document, bytes: &[u8]) -> Result<(), StoreError> {
        write_atomic(&self.path(document), bytes)
    }

    fn write_lock(&self) -> Arc<Mutex<()>> {
        self.lock.clone()
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Write-temp-then-rename in the target's directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Unavailable(format!("{} has no parent directory", path.display())))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        sync_directory(parent)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StoreError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Document, Vec<u8>>>,
    lock: Arc<Mutex<()>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a document without going through the tracker
    pub fn put_raw(&self, document: Document, bytes: impl Into<Vec<u8>>) {
        self.documents.write().insert(document, bytes.into());
    }

    pub fn get_raw(&self, document: Document) -> Option<Vec<u8>> {
        self.documents.read().get(&document).cloned()
    }

    /// Make every subsequent save fail, simulating a full or read-only disk
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl TrackerStore for MemoryStore {
    fn load(&self, document: Document) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get_raw(document))
    }

    fn save(&self, document: Document, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "write to {} rejected",
                document.file_name()
            )));
        }
        self.put_raw(document, bytes.to_vec());
        Ok(())
    }

    fn write_lock(&self) -> Arc<Mutex<()>> {
        self.lock.clone()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
