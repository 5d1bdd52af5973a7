//! Persistent label registry — bidirectional identity name <-> id mapping.
//!
//! The registry is the only authority for integer label ids. All mutations
//! funnel through one `Mutex<LabelStore>` owned by the daemon, so id
//! assignment is linearized; the original's reread-then-rewrite race cannot
//! assign the same id twice.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// On-disk registry shape: `name_to_id` and its inverse with string ids,
/// human-readable JSON, non-ASCII names preserved verbatim. The format is
/// kept bit-compatible with existing deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelRegistry {
    pub name_to_id: BTreeMap<String, u32>,
    pub id_to_name: BTreeMap<String, String>,
}

impl LabelRegistry {
    /// Read persisted state, or an empty registry when none exists.
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes).map_err(io::Error::other)
    }

    /// Persist the whole registry: write-to-temp + atomic rename, so a
    /// crash mid-write never truncates the canonical file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let encoded = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Next id to assign: `1 + max(existing ids)`, 1 for an empty registry.
    fn next_id(&self) -> u32 {
        1 + self
            .id_to_name
            .keys()
            .filter_map(|k| k.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
    }
}

/// The registry plus its storage path; the single-writer owner of all
/// label mutations.
pub struct LabelStore {
    path: PathBuf,
    registry: LabelRegistry,
    /// Raw spellings seen per slug this session. Not persisted — the
    /// on-disk registry format is fixed — so only collisions observed
    /// within one daemon lifetime are flagged.
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl LabelStore {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let registry = LabelRegistry::load(&path)?;
        if !registry.name_to_id.is_empty() {
            tracing::info!(
                identities = registry.name_to_id.len(),
                path = %path.display(),
                "label registry loaded"
            );
        }
        Ok(Self {
            path,
            registry,
            aliases: BTreeMap::new(),
        })
    }

    /// Record the raw spelling behind a registration for `slug`.
    ///
    /// Returns true when a different raw name has already registered under
    /// the same slug — a genuine sanitization collision whose samples and
    /// label are about to merge. Re-registering the same raw name is not a
    /// collision.
    pub fn note_alias(&mut self, slug: &str, raw: &str) -> bool {
        let spellings = self.aliases.entry(slug.to_string()).or_default();
        spellings.insert(raw.trim().to_string());
        spellings.len() > 1
    }

    /// Look up `name`, assigning and persisting a fresh id if absent.
    ///
    /// The id is written through to disk before it is returned, so a crash
    /// after this call cannot forget an assignment the caller observed.
    pub fn get_or_create(&mut self, name: &str) -> Result<u32, ServiceError> {
        let name = name.trim();
        if let Some(&id) = self.registry.name_to_id.get(name) {
            return Ok(id);
        }

        let id = self.registry.next_id();
        self.registry.name_to_id.insert(name.to_string(), id);
        self.registry.id_to_name.insert(id.to_string(), name.to_string());
        if let Err(e) = self.registry.save(&self.path) {
            // Keep memory consistent with disk: the assignment is only
            // real once it is persisted.
            self.registry.name_to_id.remove(name);
            self.registry.id_to_name.remove(&id.to_string());
            return Err(e.into());
        }
        tracing::info!(name, id, "registered new identity label");
        Ok(id)
    }

    /// Identity name for a label id, if registered.
    pub fn name_for(&self, id: u32) -> Option<&str> {
        self.registry.id_to_name.get(&id.to_string()).map(|s| s.as_str())
    }

    /// All known identity names.
    pub fn names(&self) -> Vec<String> {
        self.registry.name_to_id.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.registry.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.name_to_id.is_empty()
    }
}

/// Lock helper that survives a poisoned mutex: registry state is plain
/// data, safe to keep using after a panicking writer.
pub fn lock_store(store: &Mutex<LabelStore>) -> MutexGuard<'_, LabelStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_assigned_sequentially() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = LabelStore::open(dir.path().join("labels.json")).expect("open");

        let ids: Vec<u32> = ["alice", "bob", "carol"]
            .iter()
            .map(|n| store.get_or_create(n).expect("get_or_create"))
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = LabelStore::open(dir.path().join("labels.json")).expect("open");

        let a = store.get_or_create("alice").expect("first");
        let b = store.get_or_create("alice").expect("second");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_maps_stay_mutual_inverses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = LabelStore::open(dir.path().join("labels.json")).expect("open");
        store.get_or_create("alice").expect("alice");
        store.get_or_create("bob").expect("bob");

        for (name, id) in &store.registry.name_to_id {
            assert_eq!(store.registry.id_to_name.get(&id.to_string()), Some(name));
        }
        assert_eq!(store.registry.name_to_id.len(), store.registry.id_to_name.len());
    }

    #[test]
    fn test_unicode_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labels.json");

        let mut store = LabelStore::open(path.clone()).expect("open");
        store.get_or_create("张伟").expect("create");
        store.get_or_create("Łukasz").expect("create");
        let saved = store.registry.clone();

        let reloaded = LabelRegistry::load(&path).expect("reload");
        assert_eq!(reloaded, saved);

        // Non-ASCII must be stored verbatim, not \u-escaped.
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("张伟"));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LabelStore::open(dir.path().join("labels.json")).expect("open");
        assert!(store.is_empty());
        assert!(store.names().is_empty());
    }

    #[test]
    fn test_ids_survive_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labels.json");

        {
            let mut store = LabelStore::open(path.clone()).expect("open");
            store.get_or_create("alice").expect("alice");
            store.get_or_create("bob").expect("bob");
        }

        let mut store = LabelStore::open(path).expect("reopen");
        // New names continue past the persisted maximum.
        assert_eq!(store.get_or_create("carol").expect("carol"), 3);
        assert_eq!(store.get_or_create("alice").expect("alice"), 1);
    }

    #[test]
    fn test_alias_tracking_flags_cross_name_merges_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = LabelStore::open(dir.path().join("labels.json")).expect("open");

        // First registration and re-registrations of the same raw name
        // are not collisions, even though the raw name differs from its
        // slug.
        assert!(!store.note_alias("alice_bob", "alice bob"));
        assert!(!store.note_alias("alice_bob", "alice bob"));

        // A different raw spelling landing on the same slug is.
        assert!(store.note_alias("alice_bob", "alice/bob"));

        // Unrelated identities stay quiet.
        assert!(!store.note_alias("carol", "carol"));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labels.json");
        let mut store = LabelStore::open(path.clone()).expect("open");
        store.get_or_create("alice").expect("alice");

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!Path::new(&tmp).exists());
        assert!(path.exists());
    }
}
