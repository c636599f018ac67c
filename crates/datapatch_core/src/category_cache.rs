use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::patch_api::{PatchError, PatchErrorCode};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    Error(String),
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not_loaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadEvent {
    Begin,
    Success,
    Failure,
}

fn accepts(from: &LoadState, event: LoadEvent) -> bool {
    matches!(
        (from, event),
        (LoadState::NotLoaded | LoadState::Error(_), LoadEvent::Begin)
            | (LoadState::Loading, LoadEvent::Success | LoadEvent::Failure)
    )
}

/// Source of category chunks.
pub trait ChunkLoader {
    fn load(&self, category: &str) -> Result<JsonValue, PatchError>;
}

/// Reads `<dir>/<category>.json`.
#[derive(Debug, Clone)]
pub struct FsChunkLoader {
    dir: PathBuf,
}

impl FsChunkLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn chunk_path(&self, category: &str) -> PathBuf {
        self.dir.join(format!("{category}.json"))
    }
}

impl ChunkLoader for FsChunkLoader {
    fn load(&self, category: &str) -> Result<JsonValue, PatchError> {
        let path = self.chunk_path(category);
        let text = fs::read_to_string(&path).map_err(|e| {
            PatchError::new(
                PatchErrorCode::ChunkLoad,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PatchError::new(
                PatchErrorCode::ChunkLoad,
                format!("failed to parse {}: {e}", path.display()),
            )
        })
    }
}

#[derive(Debug)]
struct Entry {
    state: LoadState,
    chunk: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub not_loaded: usize,
    pub loading: usize,
    pub loaded: usize,
    pub failed: usize,
}

/// Per-category chunk cache handed to whoever needs category data.
#[derive(Debug)]
pub struct CategoryCache<L> {
    loader: L,
    retry_attempts: u32,
    entries: BTreeMap<String, Entry>,
}

impl<L: ChunkLoader> CategoryCache<L> {
    pub fn new<I, S>(loader: L, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = categories
            .into_iter()
            .map(|name| {
                (
                    name.into(),
                    Entry {
                        state: LoadState::NotLoaded,
                        chunk: None,
                    },
                )
            })
            .collect();
        Self {
            loader,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            entries,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn state(&self, category: &str) -> Option<&LoadState> {
        self.entries.get(category).map(|e| &e.state)
    }

    pub fn is_loaded(&self, category: &str) -> bool {
        matches!(self.state(category), Some(LoadState::Loaded))
    }

    /// Returns the cached chunk, loading it first when needed.
    pub fn load(&mut self, category: &str) -> Result<&JsonValue, PatchError> {
        let entry = self.entries.get_mut(category).ok_or_else(|| {
            PatchError::new(
                PatchErrorCode::UnknownCategory,
                format!("unknown category {category:?}"),
            )
        })?;

        if entry.state != LoadState::Loaded {
            transition(category, entry, LoadEvent::Begin, None)?;
            let mut last_error = None;
            for attempt in 1..=self.retry_attempts {
                match self.loader.load(category) {
                    Ok(chunk) => {
                        last_error = None;
                        entry.chunk = Some(chunk);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(category, attempt, "chunk load failed: {e}");
                        last_error = Some(e);
                    }
                }
            }
            if let Some(e) = last_error {
                transition(category, entry, LoadEvent::Failure, Some(e.message.clone()))?;
                return Err(e);
            }
            transition(category, entry, LoadEvent::Success, None)?;
            tracing::info!(category, "category loaded");
        }

        entry.chunk.as_ref().ok_or_else(|| {
            PatchError::new(
                PatchErrorCode::ChunkLoad,
                format!("category {category:?} is loaded but has no chunk"),
            )
        })
    }

    /// Loads each category, returning how many succeeded.
    pub fn preload<'a>(&mut self, categories: impl IntoIterator<Item = &'a str>) -> usize {
        let mut loaded = 0;
        for category in categories {
            match self.load(category) {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!(category, "preload failed: {e}"),
            }
        }
        loaded
    }

    /// Drops every chunk and returns all categories to `NotLoaded`.
    pub fn clear(&mut self) {
        for entry in self.entries.values_mut() {
            entry.state = LoadState::NotLoaded;
            entry.chunk = None;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries.values() {
            match entry.state {
                LoadState::NotLoaded => stats.not_loaded += 1,
                LoadState::Loading => stats.loading += 1,
                LoadState::Loaded => stats.loaded += 1,
                LoadState::Error(_) => stats.failed += 1,
            }
        }
        stats
    }
}

fn transition(
    category: &str,
    entry: &mut Entry,
    event: LoadEvent,
    message: Option<String>,
) -> Result<(), PatchError> {
    if !accepts(&entry.state, event) {
        return Err(PatchError::new(
            PatchErrorCode::InvalidTransition,
            format!(
                "category {category:?} cannot handle {event:?} while {}",
                entry.state.as_str()
            ),
        ));
    }
    entry.state = match event {
        LoadEvent::Begin => LoadState::Loading,
        LoadEvent::Success => LoadState::Loaded,
        LoadEvent::Failure => {
            entry.chunk = None;
            LoadState::Error(message.unwrap_or_default())
        }
    };
    Ok(())
}
