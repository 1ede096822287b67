//! Session-scoped memory store
//!
//! A small JSON document holding the user profile, remembered facts and the
//! time of the last interaction. The top-level process loads it at start and
//! saves it at checkpoints; the dispatcher only reads it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Memory store shared between the dispatcher and the process lifecycle
pub type SharedMemory = Arc<RwLock<MemoryStore>>;

/// Who the assistant is talking to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Preferred form of address ("Sir")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Create a profile
    #[must_use]
    pub fn new(name: Option<String>, nickname: Option<String>) -> Self {
        Self {
            name,
            nickname,
            extra: serde_json::Map::new(),
        }
    }

    /// True when nothing is known about the user
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.nickname.is_none()
    }
}

/// Something the user asked to be remembered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub fact: String,

    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
}

/// On-disk layout; unknown keys are carried through untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    user_profile: UserProfile,

    #[serde(default)]
    facts: Vec<Fact>,

    #[serde(default)]
    last_interaction: Option<NaiveDateTime>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Persistent memory, loaded once and saved at checkpoints
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    data: MemoryFile,
    dirty: bool,
    read_only: bool,
}

impl MemoryStore {
    /// Load the store from `path`
    ///
    /// A missing file gives an empty store. A file that cannot be read or
    /// parsed is logged and left untouched: the store runs empty and never
    /// overwrites it.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let (data, read_only) = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(data) => {
                    tracing::debug!(path = %path.display(), "memory loaded");
                    (data, false)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "memory file corrupt, running without it");
                    (MemoryFile::default(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (MemoryFile::default(), false),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read memory file");
                (MemoryFile::default(), true)
            }
        };

        Self {
            path,
            data,
            dirty: false,
            read_only,
        }
    }

    /// Wrap in the shared handle used by the dispatcher
    #[must_use]
    pub fn shared(self) -> SharedMemory {
        Arc::new(RwLock::new(self))
    }

    /// Write the store to disk if it changed since the last save
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.read_only {
            tracing::debug!(path = %self.path.display(), "memory file unreadable at load, not overwriting");
            self.dirty = false;
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        tracing::debug!(path = %self.path.display(), "memory saved");
        Ok(())
    }

    /// Record that an interaction just happened
    pub fn touch(&mut self) {
        self.data.last_interaction = Some(Local::now().naive_local());
        self.dirty = true;
    }

    /// Remember a fact about the user
    pub fn remember(&mut self, fact: impl Into<String>) {
        self.data.facts.push(Fact {
            fact: fact.into(),
            recorded_at: Some(Local::now().naive_local()),
        });
        self.dirty = true;
    }

    /// Replace the user profile
    pub fn set_profile(&mut self, profile: UserProfile) {
        self.data.user_profile = profile;
        self.dirty = true;
    }

    #[must_use]
    pub const fn profile(&self) -> &UserProfile {
        &self.data.user_profile
    }

    /// The most recent `limit` facts, oldest first
    #[must_use]
    pub fn recent_facts(&self, limit: usize) -> &[Fact] {
        let start = self.data.facts.len().saturating_sub(limit);
        &self.data.facts[start..]
    }

    #[must_use]
    pub const fn last_interaction(&self) -> Option<NaiveDateTime> {
        self.data.last_interaction
    }

    /// True when there are unsaved changes
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(dir.path().join("memory.json"));
        assert!(store.profile().is_empty());
        assert!(store.recent_facts(3).is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let mut store = MemoryStore::load(&path);
        store.set_profile(UserProfile::new(Some("Ada".to_string()), Some("Sir".to_string())));
        store.remember("likes green tea");
        store.touch();
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reloaded = MemoryStore::load(&path);
        assert_eq!(reloaded.profile().name.as_deref(), Some("Ada"));
        assert_eq!(reloaded.recent_facts(5)[0].fact, "likes green tea");
        assert!(reloaded.last_interaction().is_some());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(
            &path,
            r#"{"user_profile":{"name":"Ada","mood_history":[1]},"care_history":["walk"],"facts":[]}"#,
        )
        .unwrap();

        let mut store = MemoryStore::load(&path);
        store.touch();
        store.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["care_history"][0], "walk");
        assert_eq!(raw["user_profile"]["mood_history"][0], 1);
    }

    #[test]
    fn test_corrupt_file_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{{{{").unwrap();

        let mut store = MemoryStore::load(&path);
        assert!(store.profile().is_empty());

        store.remember("new fact");
        store.save().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{{{{");
    }

    #[test]
    fn test_recent_facts_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json"));
        for i in 0..5 {
            store.remember(format!("fact {i}"));
        }
        let recent: Vec<&str> = store.recent_facts(3).iter().map(|f| f.fact.as_str()).collect();
        assert_eq!(recent, vec!["fact 2", "fact 3", "fact 4"]);
    }

    #[test]
    fn test_clean_store_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mut store = MemoryStore::load(&path);
        store.save().unwrap();
        assert!(!path.exists());
    }
}
