//! Locked, atomically-written JSON documents.
//!
//! Every registry file goes through this type: an exclusive advisory lock
//! on a sibling `.lock` file is held across the whole load-mutate-store
//! sequence, and writes land via temp-file-plus-rename so a crash mid-write
//! never truncates the live document.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

pub(crate) struct JsonDocument<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> JsonDocument<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: path.with_extension("lock"),
            path,
            _marker: PhantomData,
        }
    }

    /// Read the document under the lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let _lock = self.acquire_lock()?;
        let doc = load_or_recover(&self.path);
        Ok(f(&doc))
    }

    /// Mutate the document under the lock and write it back atomically.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _lock = self.acquire_lock()?;
        let mut doc = load_or_recover(&self.path);
        let result = f(&mut doc);
        atomic_write(&self.path, &doc)?;
        Ok(result)
    }

    fn acquire_lock(&self) -> Result<fs::File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = fs::File::create(&self.lock_path)?;
        lock_file
            .lock_exclusive()
            .map_err(|e| Error::LockFailed(e.to_string()))?;
        Ok(lock_file)
    }
}

/// Load a document, recovering from corruption.
///
/// An unparsable file is renamed aside as a timestamped backup and replaced
/// with an empty document; it is never silently discarded.
pub(crate) fn load_or_recover<T: Default + DeserializeOwned>(path: &Path) -> T {
    let content = match fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => content,
        _ => return T::default(),
    };

    match serde_json::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            let backup = backup_path(path);
            tracing::warn!(
                "Registry {} is unparsable ({}); moving it to {} and reinitializing",
                path.display(),
                e,
                backup.display()
            );
            if let Err(rename_err) = fs::rename(path, &backup) {
                tracing::warn!("Failed to back up corrupt registry: {}", rename_err);
            }
            T::default()
        }
    }
}

/// Write a document atomically: temp file in the same directory, then rename.
pub(crate) fn atomic_write<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, serde_json::to_string_pretty(doc)?)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "registry".to_string());
    path.with_file_name(format!(
        "{}.corrupt-{}.bak",
        stem,
        chrono::Utc::now().timestamp()
    ))
}
