use dashmap::{DashMap, DashSet};

/// Tombstone set and rename map for base-origin paths.
///
/// Both containers are sharded concurrent maps: a single key read or write is
/// atomic, anything spanning several keys (collapsing a rename chain, say) is
/// not. Callers that need multi-key isolation serialize above this type.
#[derive(Debug, Default)]
pub struct Bookkeeping {
    /// Paths treated as deleted regardless of what either layer holds
    tombstones: DashSet<String>,
    /// Original base path -> current location
    renames: DashMap<String, String>,
}

impl Bookkeeping {
    /// Empty tombstone set and rename map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tombstoned(&self, path: &str) -> bool {
        self.tombstones.contains(path)
    }

    /// Returns `true` if the path was not tombstoned before.
    pub fn insert_tombstone(&self, path: &str) -> bool {
        self.tombstones.insert(path.to_string())
    }

    /// Returns `true` if a tombstone was actually removed.
    pub fn clear_tombstone(&self, path: &str) -> bool {
        self.tombstones.remove(path).is_some()
    }

    /// Current location recorded for the base path `path`, one hop only.
    pub fn rename_target(&self, path: &str) -> Option<String> {
        self.renames.get(path).map(|target| target.value().clone())
    }

    /// Record that base path `from` now lives at `to`.
    ///
    /// An existing mapping for `from` is overwritten. No chain collapsing
    /// happens here; the composite rewrites affected entries itself.
    ///
    /// # Arguments
    /// * `from` - Original base-origin path (cleaned)
    /// * `to` - Its current location (cleaned)
    pub fn set_rename(&self, from: &str, to: &str) {
        self.renames.insert(from.to_string(), to.to_string());
    }

    /// Drop the mapping keyed on `from`.
    ///
    /// # Returns
    /// The target it pointed at, or `None` if `from` had no mapping.
    pub fn remove_rename(&self, from: &str) -> Option<String> {
        self.renames.remove(from).map(|(_, to)| to)
    }

    /// Every rename source whose current location is `target`, sorted.
    pub fn sources_pointing_at(&self, target: &str) -> Vec<String> {
        // collect before anyone mutates: holding a shard guard while writing deadlocks
        let mut sources: Vec<String> = self
            .renames
            .iter()
            .filter(|entry| entry.value() == target)
            .map(|entry| entry.key().clone())
            .collect();
        sources.sort();
        sources
    }

    /// `(source, target)` for every rename whose target is `dir` or lies below it, sorted.
    pub fn sources_pointing_into(&self, dir: &str) -> Vec<(String, String)> {
        let prefix = format!("{}/", dir);
        let mut pairs: Vec<(String, String)> = self
            .renames
            .iter()
            .filter(|entry| entry.value() == dir || entry.value().starts_with(&prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// All tombstoned paths, sorted.
    pub fn tombstones(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.tombstones.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }

    /// All `(source, target)` mappings, sorted by source.
    pub fn renames(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .renames
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Sorted union of tombstoned paths and rename sources: every base path a
    /// patch against the base layer has to delete.
    pub fn deleted(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .tombstones
            .iter()
            .map(|p| p.key().clone())
            .chain(self.renames.iter().map(|entry| entry.key().clone()))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn reset(&self) {
        self.tombstones.clear();
        self.renames.clear();
    }
}
