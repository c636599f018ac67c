mod engine;
mod error;
mod patch;
mod types;

pub use engine::{PatchRun, Patcher};
pub use error::{PatchError, PatchErrorCode};
pub use patch::{apply_edits, summarize, verify};
pub(crate) use types::edit_label;
pub use types::{
    DiffEntry, EditIssue, EditRequest, EditResult, EditScope, Report, RunOptions, RunOutcome,
    RunState,
};
