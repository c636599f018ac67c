use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::patch_api::{PatchError, PatchErrorCode};
use crate::store::DatasetStore;

pub const BACKUP_EXTENSION: &str = "backup";

/// `data.js` -> `data.js.backup`, next to the dataset.
pub fn backup_path_for(dataset: &Path) -> PathBuf {
    let mut name = dataset
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("dataset"));
    name.push(".");
    name.push(BACKUP_EXTENSION);
    dataset.with_file_name(name)
}

/// Snapshot of a dataset taken before any edit of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    path: PathBuf,
    contents: String,
    persisted: bool,
}

impl Backup {
    pub fn create<S: DatasetStore>(store: &S, dataset: &Dataset) -> Result<Self, PatchError> {
        let path = backup_path_for(dataset.path());
        store
            .write(&path, dataset.text().as_bytes())
            .map_err(|e| {
                PatchError::new(
                    PatchErrorCode::BackupFailed,
                    format!("failed to write backup {}: {e}", path.display()),
                )
            })?;
        tracing::info!(backup = %path.display(), bytes = dataset.text().len(), "backup created");

        Ok(Self {
            path,
            contents: dataset.text().to_string(),
            persisted: true,
        })
    }

    /// A snapshot that lives only in memory, for dry runs.
    pub fn in_memory(dataset: &Dataset) -> Self {
        Self {
            path: backup_path_for(dataset.path()),
            contents: dataset.text().to_string(),
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Writes the snapshot over `target`.
    pub fn restore_to<S: DatasetStore>(&self, store: &S, target: &Path) -> Result<(), PatchError> {
        store
            .write(target, self.contents.as_bytes())
            .map_err(|e| PatchError::io("restore backup to", target, e))?;
        tracing::warn!(dataset = %target.display(), backup = %self.path.display(), "dataset restored from backup");
        Ok(())
    }

    pub fn clear<S: DatasetStore>(self, store: &S) -> Result<(), PatchError> {
        if self.persisted && store.exists(&self.path) {
            store
                .remove(&self.path)
                .map_err(|e| PatchError::io("remove backup", &self.path, e))?;
        }
        Ok(())
    }
}
