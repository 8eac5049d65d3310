use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CowError, Result};
use crate::overlay::store::Bookkeeping;

/// Rename mappings a lookup may follow before the chain is declared corrupt.
pub const DEFAULT_MAX_RENAME_HOPS: usize = 1000;

/// Follows rename chains from a path to its current location.
///
/// Chains are collapsed on every rename so a lookup normally takes one hop;
/// the hop limit and the visited set only guard against a corrupted map
/// (hand-edited whiteout logs, or a crash between bookkeeping steps).
#[derive(Debug)]
pub struct PathResolver {
    store: Arc<Bookkeeping>,
    max_hops: usize,
}

impl PathResolver {
    /// # Arguments
    /// * `store` - Shared bookkeeping whose rename map and tombstones are consulted
    /// * `max_hops` - Most rename mappings a single lookup may follow
    pub fn new(store: Arc<Bookkeeping>, max_hops: usize) -> Self {
        PathResolver { store, max_hops }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Follow the rename map until a path with no mapping; tombstones are not
    /// consulted. At most `max_hops` mappings are followed.
    pub fn resolve_terminal(&self, path: &str) -> Result<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut current = path.to_string();
        let mut hops = 0;

        loop {
            if !seen.insert(current.clone()) {
                return Err(CowError::invalid(format!(
                    "rename cycle through {} (starting at {})",
                    current, path
                )));
            }

            match self.store.rename_target(&current) {
                Some(next) if next == current => {
                    return Err(CowError::invalid(format!("{} is renamed to itself", current)));
                }
                Some(next) => {
                    hops += 1;
                    if hops > self.max_hops {
                        return Err(CowError::invalid(format!(
                            "rename chain from {} exceeds {} hops",
                            path, self.max_hops
                        )));
                    }
                    tracing::trace!("resolve: {} -> {}", current, next);
                    current = next;
                }
                None => return Ok(current),
            }
        }
    }

    /// Like [`resolve_terminal`](Self::resolve_terminal), but a tombstoned
    /// terminal path is reported as missing.
    pub fn resolve_path(&self, path: &str) -> Result<String> {
        let terminal = self.resolve_terminal(path)?;
        if self.store.is_tombstoned(&terminal) {
            return Err(CowError::not_exist(path));
        }
        Ok(terminal)
    }
}
