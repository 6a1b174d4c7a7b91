//! Persisted selection state and favourites
//!
//! Both files live in the profile directory and are written atomically
//! (temp file + rename) so a crash mid-write can never leave a truncated
//! document behind. Reads are forgiving: a missing or corrupt file resets
//! to defaults instead of failing playback.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{StateError, StateResult};
use crate::models::{SelectionMeta, SelectionState};

/// Read selection state from disk.
///
/// Accepts the current `{ "indices": ..., "meta": ... }` document and the
/// older flat `{channel_id: index}` layout. Anything unreadable yields
/// defaults.
pub fn load_selection_state(path: &Path) -> SelectionState {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return SelectionState::default(),
    };
    let value: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("selection state {} is corrupt: {e}", path.display());
            return SelectionState::default();
        }
    };

    let Value::Object(map) = &value else {
        warn!("selection state {} has unexpected shape", path.display());
        return SelectionState::default();
    };

    if map.contains_key("indices") || map.contains_key("meta") {
        match serde_json::from_value::<SelectionState>(value.clone()) {
            Ok(state) => state,
            Err(e) => {
                warn!("selection state {} failed to decode: {e}", path.display());
                SelectionState::default()
            }
        }
    } else {
        // legacy flat layout
        debug!("selection state {} uses the flat layout", path.display());
        let mut state = SelectionState::default();
        for (k, v) in map {
            if let Some(idx) = v.as_u64() {
                state.indices.insert(k.clone(), idx as usize);
            }
        }
        state.meta = SelectionMeta::default();
        state
    }
}

pub fn save_selection_state(path: &Path, state: &SelectionState) -> StateResult<()> {
    let body = serde_json::to_string(state).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    write_atomically(path, body.as_bytes())
}

/// Channels the user starred. Persisted as a sorted JSON array of ids.
#[derive(Debug, Clone, Default)]
pub struct FavouriteSet {
    ids: BTreeSet<String>,
}

impl FavouriteSet {
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => Self {
                ids: list.into_iter().collect(),
            },
            Err(e) => {
                warn!("favourites {} are corrupt: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> StateResult<()> {
        let list: Vec<&String> = self.ids.iter().collect();
        let body = serde_json::to_string(&list).map_err(|e| StateError::WriteFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        write_atomically(path, body.as_bytes())
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.ids.contains(channel_id)
    }

    pub fn add(&mut self, channel_id: &str) -> bool {
        !channel_id.is_empty() && self.ids.insert(channel_id.to_string())
    }

    pub fn remove(&mut self, channel_id: &str) -> bool {
        self.ids.remove(channel_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> StateResult<()> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tmp.write_all(bytes).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tmp.persist(path).map_err(|e| StateError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}
