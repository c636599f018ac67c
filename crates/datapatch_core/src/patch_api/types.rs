use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::EditValue;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    Record(String),
    /// A record looked up only among the direct children of `category`.
    Grouped {
        category: String,
        record: String,
    },
    Everywhere,
}

impl EditScope {
    pub fn record_key(&self) -> Option<&str> {
        match self {
            Self::Record(key) | Self::Grouped { record: key, .. } => Some(key),
            Self::Everywhere => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Grouped { category, .. } => Some(category),
            Self::Record(_) | Self::Everywhere => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditRequest {
    pub scope: EditScope,
    pub property: String,
    pub value: EditValue,
}

impl EditRequest {
    pub fn scoped(
        record_key: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<EditValue>,
    ) -> Self {
        Self {
            scope: EditScope::Record(record_key.into()),
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn grouped(
        category: impl Into<String>,
        record_key: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<EditValue>,
    ) -> Self {
        Self {
            scope: EditScope::Grouped {
                category: category.into(),
                record: record_key.into(),
            },
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn everywhere(property: impl Into<String>, value: impl Into<EditValue>) -> Self {
        Self {
            scope: EditScope::Everywhere,
            property: property.into(),
            value: value.into(),
        }
    }

    /// `key.property` for scoped edits, `category.key.property` for grouped
    /// edits, `*.property` for mass edits.
    pub fn label(&self) -> String {
        edit_label(&self.scope, &self.property)
    }
}

pub(crate) fn edit_label(scope: &EditScope, property: &str) -> String {
    match scope {
        EditScope::Record(key) => format!("{key}.{property}"),
        EditScope::Grouped { category, record } => format!("{category}.{record}.{property}"),
        EditScope::Everywhere => format!("*.{property}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditIssue {
    UnmatchedEdit,
    DuplicateRecord { records: usize },
    AmbiguousMatch { occurrences: usize },
    NonPrimitiveTarget { sites: usize },
    TypeMismatch {
        existing: String,
        requested: String,
    },
}

impl EditIssue {
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::UnmatchedEdit)
    }
}

impl fmt::Display for EditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedEdit => f.write_str("no matching record or property"),
            Self::DuplicateRecord { records } => {
                write!(f, "record key opens {records} records; first one edited")
            }
            Self::AmbiguousMatch { occurrences } => {
                write!(f, "property appears {occurrences} times in record; first one edited")
            }
            Self::NonPrimitiveTarget { sites } => {
                write!(f, "{sites} site(s) hold an object or array and were left alone")
            }
            Self::TypeMismatch {
                existing,
                requested,
            } => write!(f, "existing value is {existing} but new value is a {requested}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResult {
    pub scope: EditScope,
    pub property: String,
    pub value: EditValue,
    pub matched: bool,
    /// Sites located for this edit within its scope.
    pub occurrences: usize,
    /// Sites whose text was replaced.
    pub rewritten: usize,
    pub previous: Option<String>,
    pub written: Option<String>,
    pub issues: Vec<EditIssue>,
}

impl EditResult {
    pub(crate) fn pending(edit: &EditRequest) -> Self {
        Self {
            scope: edit.scope.clone(),
            property: edit.property.clone(),
            value: edit.value.clone(),
            matched: false,
            occurrences: 0,
            rewritten: 0,
            previous: None,
            written: None,
            issues: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        edit_label(&self.scope, &self.property)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(EditIssue::is_warning)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffEntry {
    pub label: String,
    pub removed: Option<String>,
    pub added: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub requested: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub sites_changed: usize,
    pub warnings: usize,
    pub results: Vec<EditResult>,
    pub diff: Vec<DiffEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    BackedUp,
    Edited,
    Verified,
    Written,
    VerifyFailed,
    RolledBack,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, BackedUp)
                | (BackedUp, Edited)
                | (Edited, Verified)
                | (Edited, VerifyFailed)
                | (Verified, Written)
                | (Verified, VerifyFailed)
                | (VerifyFailed, RolledBack)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Written | Self::RolledBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Apply and verify in memory only; nothing is written.
    pub dry_run: bool,
    /// Delete the backup once the dataset has been written and checked.
    pub clear_backup: bool,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub dataset_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub report: Report,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self.state, RunState::VerifyFailed | RunState::RolledBack)
    }

    /// Edits processed per second, `None` when no time was measured.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.report.requested as f64 / secs)
    }
}
