use std::io;
use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatchErrorCode {
    Io,
    MalformedEditBatch,
    BackupFailed,
    VerifyFailed,
    InvalidTransition,
    UnknownCategory,
    ChunkLoad,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct PatchError {
    pub code: PatchErrorCode,
    pub message: String,
}

impl PatchError {
    pub fn new(code: PatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn io(action: &str, path: &Path, err: io::Error) -> Self {
        Self::new(
            PatchErrorCode::Io,
            format!("failed to {action} {}: {err}", path.display()),
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::new(PatchErrorCode::MalformedEditBatch, message)
    }
}
