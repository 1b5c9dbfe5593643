//! Persistent key-value media backing the expiring cache
//!
//! A store holds whole records (one string per record name). The cache writes
//! its full state as a single record, so stores never need partial updates.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised by a persistent store
///
/// The cache treats all of these as non-fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the underlying medium failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The cache state could not be encoded or decoded
    #[error("Storage record is malformed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A medium that stores named string records
pub trait KeyValueStore: Send + Sync {
    /// Reads a record, returning `Ok(None)` if it does not exist
    fn read(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// Writes (or replaces) a record
    fn write(&self, name: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a record; removing a missing record is not an error
    fn remove(&self, name: &str) -> Result<(), StorageError>;
}

/// Stores each record as a JSON file in a directory
///
/// Uses an XDG-compliant cache directory by default (`~/.cache/quizfetch/` on
/// Linux).
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where record files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore in the platform cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "quizfetch")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Returns the directory records are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.record_path(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.record_path(name), value)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps records in process memory; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty MemoryStore
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.records.lock().get(name).cloned())
    }

    fn write(&self, name: &str, value: &str) -> Result<(), StorageError> {
        self.records
            .lock()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.records.lock().remove(name);
        Ok(())
    }
}
