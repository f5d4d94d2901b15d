//! JSON file store

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the scratch files a save writes before renaming them into place
const TEMP_SUFFIX: &str = ".tmp";

/// Pretty-printed JSON files under one base directory.
///
/// Every save goes through a uniquely named temporary sibling followed by a
/// rename, so a reader sees either the previous content or the new one, and
/// concurrent writers never share a scratch file. Read-modify-write
/// sequences that span files go through [`JsonStore::with_lock`].
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Global settings (`<config dir>/relay/`)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join("relay");
        Ok(Self::new(dir))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::storage(parent, format!("failed to create directory: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Create a sub directory (and the base directory) if missing
    pub fn ensure_dir(&self, subdir: &str) -> Result<PathBuf> {
        let dir = self.file_path(subdir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::storage(&dir, format!("failed to create directory: {}", e)))?;
        Ok(dir)
    }

    /// Load and parse a file
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::storage(&path, format!("failed to read: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::storage(&path, format!("failed to parse: {}", e)))
    }

    /// Load, `None` when the file does not exist
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    /// Save atomically: write `.<file>.<random>.tmp`, then rename over `<file>`
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);
        Self::ensure_parent(&path)?;
        let dir = path.parent().unwrap_or(&self.base_dir);
        let prefix = format!(
            ".{}.",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("data")
        );

        let content = serde_json::to_string_pretty(data)?;
        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| Error::storage(dir, format!("failed to create temp file: {}", e)))?;
        temp.write_all(content.as_bytes())
            .map_err(|e| Error::storage(temp.path(), format!("failed to write: {}", e)))?;
        // A failed persist drops (and deletes) the temp file
        temp.persist(&path)
            .map_err(|e| Error::storage(&path, format!("failed to replace: {}", e.error)))?;
        Ok(())
    }

    /// Run `f` while holding an exclusive lock on `lock_file`.
    ///
    /// The lock is an OS file lock, so it excludes other processes opening
    /// the same directory as well as other handles in this one. It is
    /// released when `f` returns.
    pub fn with_lock<T>(&self, lock_file: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let path = self.file_path(lock_file);
        Self::ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::storage(&path, format!("failed to open lock file: {}", e)))?;

        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock
            .write()
            .map_err(|e| Error::storage(&path, format!("failed to lock: {}", e)))?;
        f()
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }

    /// Delete a file; a missing file is not an error
    pub fn remove(&self, filename: &str) -> Result<()> {
        let path = self.file_path(filename);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(&path, format!("failed to remove: {}", e))),
        }
    }

    /// File stems of the `.json` files directly inside `subdir`, sorted.
    ///
    /// Leftover temp files are ignored. A missing directory yields nothing.
    pub fn list_stems(&self, subdir: &str) -> Result<Vec<String>> {
        let dir = self.file_path(subdir);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(&dir, format!("failed to list: {}", e))),
        };

        let mut stems = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }
}
