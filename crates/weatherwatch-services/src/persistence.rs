//! Persistence adapters for locally stored state.
//!
//! Stores are thin state managers over a `Persistence<T>`: `load` once at
//! startup, `save` after every mutation.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use weatherwatch_core::StorageError;

pub trait Persistence<T>: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>, StorageError>;

    fn save(&self, value: &T) -> Result<(), StorageError>;
}

/// Pretty-printed JSON file. A missing file loads as `None`.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl<T> Persistence<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path).map_err(|e| StorageError::ReadFailed {
            path: self.display_path(),
            message: e.to_string(),
        })?;

        let value = serde_json::from_str(&json)
            .map_err(|e| StorageError::Corruption(format!("{}: {}", self.display_path(), e)))?;

        Ok(Some(value))
    }

    fn save(&self, value: &T) -> Result<(), StorageError> {
        let write_failed = |message: String| StorageError::WriteFailed {
            path: self.display_path(),
            message,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_failed(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(value).map_err(|e| write_failed(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| write_failed(e.to_string()))?;

        tracing::debug!("Saved {}", self.display_path());
        Ok(())
    }
}

/// In-process store. Failures can be switched on to exercise the
/// degraded paths of the stores built on top of it.
#[derive(Debug)]
pub struct MemoryStore<T> {
    value: Mutex<Option<T>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            fail_loads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        let store = Self::default();
        *store.value.lock() = Some(value);
        store
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<T> {
        self.value.lock().clone()
    }
}

impl<T> Persistence<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Option<T>, StorageError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                path: "memory".into(),
                message: "memory store load disabled".into(),
            });
        }
        Ok(self.value.lock().clone())
    }

    fn save(&self, value: &T) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                path: "memory".into(),
                message: "memory store save disabled".into(),
            });
        }
        *self.value.lock() = Some(value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
