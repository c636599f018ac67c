use std::path::Path;
use std::time::Instant;

use crate::backup::Backup;
use crate::dataset::Dataset;
use crate::store::{DatasetStore, FsStore};

use super::error::{PatchError, PatchErrorCode};
use super::patch::{apply_edits, summarize, verify};
use super::types::{EditRequest, EditResult, RunOptions, RunOutcome, RunState};

#[derive(Debug, Default, Clone, Copy)]
pub struct Patcher<S = FsStore> {
    store: S,
}

/// Tracks one run through `Idle -> BackedUp -> Edited -> Verified -> Written`
/// or `... -> VerifyFailed -> RolledBack`.
#[derive(Debug)]
pub struct PatchRun {
    state: RunState,
}

impl PatchRun {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), PatchError> {
        if !self.state.can_advance_to(next) {
            return Err(PatchError::new(
                PatchErrorCode::InvalidTransition,
                format!("patch run cannot move from {:?} to {:?}", self.state, next),
            ));
        }
        tracing::debug!(from = ?self.state, to = ?next, "patch run state change");
        self.state = next;
        Ok(())
    }
}

impl Default for PatchRun {
    fn default() -> Self {
        Self::new()
    }
}

impl Patcher<FsStore> {
    pub fn new() -> Self {
        Self { store: FsStore }
    }
}

impl<S: DatasetStore> Patcher<S> {
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load_dataset(&self, path: &Path) -> Result<Dataset, PatchError> {
        let bytes = self
            .store
            .read(path)
            .map_err(|e| PatchError::io("read dataset", path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| {
            PatchError::new(
                PatchErrorCode::Io,
                format!("dataset {} is not valid UTF-8: {e}", path.display()),
            )
        })?;
        Ok(Dataset::new(path, text))
    }

    pub fn create_backup(&self, dataset: &Dataset) -> Result<Backup, PatchError> {
        Backup::create(&self.store, dataset)
    }

    pub fn apply_edits(
        &self,
        dataset: Dataset,
        edits: &[EditRequest],
    ) -> (Dataset, Vec<EditResult>) {
        apply_edits(dataset, edits)
    }

    pub fn verify(&self, dataset: &Dataset, results: &[EditResult]) -> bool {
        verify(dataset, results)
    }

    pub fn write_dataset(&self, dataset: &Dataset, path: &Path) -> Result<(), PatchError> {
        self.store
            .write(path, dataset.text().as_bytes())
            .map_err(|e| PatchError::io("write dataset", path, e))?;
        tracing::info!(dataset = %path.display(), bytes = dataset.text().len(), "dataset written");
        Ok(())
    }

    /// Runs a full batch: backup, edit, verify, write, read back.
    ///
    /// A failed verification restores the backup and returns an outcome in
    /// the `RolledBack` state. I/O failures are errors; once the backup
    /// exists it is left on disk whatever happens afterwards.
    pub fn run(
        &self,
        path: &Path,
        edits: &[EditRequest],
        options: RunOptions,
    ) -> Result<RunOutcome, PatchError> {
        let started = Instant::now();
        let mut run = PatchRun::new();

        let dataset = self.load_dataset(path)?;
        let backup = if options.dry_run {
            Backup::in_memory(&dataset)
        } else {
            self.create_backup(&dataset)?
        };
        run.advance(RunState::BackedUp)?;

        let (dataset, results) = apply_edits(dataset, edits);
        run.advance(RunState::Edited)?;
        let report = summarize(&results);

        let outcome = |state: RunState, backup: Option<&Backup>| RunOutcome {
            state,
            dataset_path: path.to_path_buf(),
            backup_path: backup
                .filter(|b| b.is_persisted())
                .map(|b| b.path().to_path_buf()),
            report: report.clone(),
            elapsed: started.elapsed(),
        };

        if !verify(&dataset, &results) {
            run.advance(RunState::VerifyFailed)?;
            tracing::error!(dataset = %path.display(), "verification failed; rolling back");
            if backup.is_persisted() {
                backup.restore_to(&self.store, path)?;
            }
            run.advance(RunState::RolledBack)?;
            return Ok(outcome(run.state(), Some(&backup)));
        }
        run.advance(RunState::Verified)?;

        if options.dry_run {
            return Ok(outcome(run.state(), None));
        }

        if let Err(e) = self.write_dataset(&dataset, path) {
            tracing::error!(dataset = %path.display(), backup = %backup.path().display(), "write failed: {e}");
            if let Err(restore) = backup.restore_to(&self.store, path) {
                tracing::error!("restore after failed write also failed: {restore}");
            }
            return Err(e);
        }

        let on_disk = self
            .store
            .read(path)
            .map_err(|e| PatchError::io("read back dataset", path, e))?;
        if on_disk != dataset.text().as_bytes() {
            run.advance(RunState::VerifyFailed)?;
            tracing::error!(dataset = %path.display(), "read-back differs from written text; rolling back");
            backup.restore_to(&self.store, path)?;
            run.advance(RunState::RolledBack)?;
            return Ok(outcome(run.state(), Some(&backup)));
        }
        run.advance(RunState::Written)?;

        if options.clear_backup {
            backup.clear(&self.store)?;
            return Ok(outcome(run.state(), None));
        }
        Ok(outcome(run.state(), Some(&backup)))
    }
}

impl RunOutcome {
    /// `Err(VerifyFailed)` for a rolled back run.
    pub fn ensure_written(&self) -> Result<(), PatchError> {
        match self.state {
            RunState::RolledBack | RunState::VerifyFailed => Err(PatchError::new(
                PatchErrorCode::VerifyFailed,
                format!(
                    "verification failed for {}; dataset left as it was before the run",
                    self.dataset_path.display()
                ),
            )),
            _ => Ok(()),
        }
    }
}
