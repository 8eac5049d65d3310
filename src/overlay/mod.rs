//! Copy-on-write composite of a read-only base and a writable overlay.
//!
//! Every mutation lands in the overlay. Base paths that were deleted are
//! remembered as tombstones; base paths that were moved are remembered in the
//! rename map (original path -> current path). Both live in [`Bookkeeping`]
//! and can optionally be mirrored to a whiteout log inside the overlay so a
//! later composite over the same overlay picks them up again.
//!
//! Multi-step operations (rename, directory removal, copy-up) are not
//! transactional. Concurrent callers can observe intermediate states; a
//! caller that needs isolation serializes access to the whole composite.

mod copy_up;
mod mutate;
mod open;
pub mod path_resolver;
pub mod store;
pub mod types;
pub mod union_dir;
pub mod whiteout;

pub use path_resolver::{PathResolver, DEFAULT_MAX_RENAME_HOPS};
pub use store::Bookkeeping;
pub use types::Handle;
pub use union_dir::{DirHandle, DirectoryView, HideFn};
pub use whiteout::{LoadStats, WhiteoutLog};

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::{validate_config, CowConfig};
use crate::error::{CowError, Result};
use crate::vfs::{clean_path, DirEntry, FileSystem, Metadata, OpenFlags, VirtualFile};

/// Operations that would act on the composite root itself are invalid.
fn reject_root(path: &str, op: &str) -> Result<()> {
    if path == "." {
        return Err(CowError::invalid(format!("cannot {} the root", op)));
    }
    Ok(())
}

/// Copy-on-write composite of a read-only base and a writable overlay.
///
/// Reads fall through to the base until a path is modified; every change
/// lands in the overlay. Deletions and moves of base content are tracked as
/// tombstones and rename mappings, optionally mirrored to a whiteout log so a
/// later composite over the same overlay picks them up again.
#[derive(Debug)]
pub struct CowFs<B, O> {
    base: B,
    overlay: O,
    store: Arc<Bookkeeping>,
    resolver: PathResolver,
    whiteout: RwLock<Option<WhiteoutLog>>,
    scaffold_mode: u32,
    whiteout_file_mode: u32,
}

impl<B: FileSystem, O: FileSystem> CowFs<B, O> {
    /// Composite with default settings and no whiteout log.
    ///
    /// # Arguments
    /// * `base` - Read-only lower layer; never written to
    /// * `overlay` - Layer that receives every change
    pub fn new(base: B, overlay: O) -> Self {
        let config = CowConfig::default();
        Self::build(base, overlay, &config)
    }

    /// Build a composite from `config`, enabling the whiteout log right away
    /// when `whiteout_dir` is set.
    pub fn with_config(base: B, overlay: O, config: &CowConfig) -> Result<Self> {
        validate_config(config)?;
        let fs = Self::build(base, overlay, config);
        if let Some(dir) = config.get_whiteout_dir() {
            fs.whiteout(&dir)?;
        }
        Ok(fs)
    }

    fn build(base: B, overlay: O, config: &CowConfig) -> Self {
        let store = Arc::new(Bookkeeping::new());
        CowFs {
            base,
            overlay,
            resolver: PathResolver::new(store.clone(), config.get_max_rename_hops()),
            store,
            whiteout: RwLock::new(None),
            scaffold_mode: config.get_scaffold_dir_mode(),
            whiteout_file_mode: config.get_whiteout_file_mode(),
        }
    }

    /// The read-only layer.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// The writable layer.
    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    /// Enable the whiteout log rooted at `dir` inside the overlay.
    ///
    /// Creates the log layout, merges any entries a previous composite left
    /// there into the in-memory state, then writes out the in-memory state so
    /// the log covers everything recorded before this call. From then on
    /// every tombstone and rename change is written before the triggering
    /// operation returns.
    pub fn whiteout(&self, dir: &str) -> Result<()> {
        let log = WhiteoutLog::open(
            &self.overlay,
            dir,
            self.scaffold_mode,
            self.whiteout_file_mode,
        )?;
        let stats = log.load(&self.overlay, &self.store)?;
        log.persist_all(&self.overlay, &self.store)?;
        tracing::debug!(
            "Whiteout log enabled at {}: loaded {} tombstones, {} renames ({} skipped)",
            log.root(),
            stats.tombstones,
            stats.renames,
            stats.skipped
        );
        *self.whiteout.write() = Some(log);
        Ok(())
    }

    /// Root of the active whiteout log, if [`whiteout`](Self::whiteout) was called.
    pub fn whiteout_dir(&self) -> Option<String> {
        self.whiteout
            .read()
            .as_ref()
            .map(|log| log.root().to_string())
    }

    /// Every base path a patch against the base layer has to delete:
    /// tombstones plus rename sources, sorted.
    pub fn deleted(&self) -> Vec<String> {
        self.store.deleted()
    }

    /// Forget all tombstones and renames. Neither layer is touched, and
    /// neither is the whiteout log.
    pub fn reset(&self) {
        tracing::debug!("Resetting copy-on-write bookkeeping");
        self.store.reset();
    }

    /// Whether `path` (taken literally) is hidden by a tombstone.
    pub fn tombstoned(&self, path: &str) -> bool {
        self.store.is_tombstoned(&clean_path(path))
    }

    /// Direct rename mapping for `path`, without following chains.
    pub fn rename_target(&self, path: &str) -> Option<String> {
        self.store.rename_target(&clean_path(path))
    }

    /// Snapshot of the rename map as sorted `(original, current)` pairs.
    pub fn renames(&self) -> Vec<(String, String)> {
        self.store.renames()
    }

    /// Follow the rename map from `path`; tombstones are not consulted.
    pub fn resolve_terminal(&self, path: &str) -> Result<String> {
        self.resolver.resolve_terminal(&clean_path(path))
    }

    /// Follow the rename map from `path` and reject a tombstoned result.
    pub fn resolve_path(&self, path: &str) -> Result<String> {
        self.resolver.resolve_path(&clean_path(path))
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Bookkeeping {
        &self.store
    }

    fn hide_fn(&self, dir: &str) -> HideFn {
        let store = self.store.clone();
        let dir = dir.to_string();
        Arc::new(move |name: &str| store.is_tombstoned(&crate::vfs::join(&dir, name)))
    }

    pub(crate) fn tombstone(&self, path: &str) -> Result<()> {
        if self.store.insert_tombstone(path) {
            tracing::debug!("Tombstoned {}", path);
        }
        if let Some(log) = self.whiteout.read().as_ref() {
            log.record_delete(&self.overlay, path)?;
        }
        Ok(())
    }

    pub(crate) fn untombstone(&self, path: &str) -> Result<()> {
        if !self.store.clear_tombstone(path) {
            return Ok(());
        }
        tracing::debug!("Cleared tombstone on {}", path);
        if let Some(log) = self.whiteout.read().as_ref() {
            log.clear_delete(&self.overlay, path)?;
        }
        Ok(())
    }

    pub(crate) fn record_rename(&self, from: &str, to: &str) -> Result<()> {
        tracing::debug!("Rename map: {} -> {}", from, to);
        self.store.set_rename(from, to);
        if let Some(log) = self.whiteout.read().as_ref() {
            log.record_rename(&self.overlay, from, to)?;
        }
        Ok(())
    }

    pub(crate) fn drop_rename(&self, from: &str) -> Result<()> {
        if self.store.remove_rename(from).is_none() {
            return Ok(());
        }
        tracing::debug!("Rename map: dropped {}", from);
        if let Some(log) = self.whiteout.read().as_ref() {
            log.clear_rename(&self.overlay, from)?;
        }
        Ok(())
    }

    /// Final step of anything that puts fresh content at exactly `path`: the
    /// name no longer forwards elsewhere and is no longer deleted.
    pub(crate) fn revive(&self, path: &str) -> Result<()> {
        self.drop_rename(path)?;
        self.untombstone(path)
    }
}

impl<B: FileSystem, O: FileSystem> FileSystem for CowFs<B, O> {
    fn open(&self, path: &str, flags: OpenFlags, perm: u32) -> Result<Box<dyn VirtualFile>> {
        self.open_file(path, flags, perm)?.into_file()
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        CowFs::stat(self, path)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        CowFs::read_dir(self, path)
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        CowFs::mkdir(self, path, perm)
    }

    fn remove(&self, path: &str) -> Result<()> {
        CowFs::remove(self, path)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        CowFs::rename(self, from, to)
    }

    fn symlink(&self, target: &str, link: &str) -> Result<()> {
        CowFs::symlink(self, target, link)
    }

    fn readlink(&self, path: &str) -> Result<String> {
        CowFs::readlink(self, path)
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        CowFs::chmod(self, path, mode)
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        CowFs::chown(self, path, uid, gid)
    }

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        CowFs::chtimes(self, path, accessed, modified)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::fixture;
    use super::*;
    use crate::vfs::mem::MemFs;
    use crate::vfs::read_file;

    #[test]
    fn test_deleted_and_reset() {
        let (_base, _overlay, fs) = fixture();
        fs.remove("file1.txt").unwrap();
        fs.rename("file2.txt", "moved.txt").unwrap();

        assert_eq!(fs.deleted(), vec!["file1.txt", "file2.txt"]);
        assert!(fs.tombstoned("/file1.txt"));
        assert_eq!(fs.rename_target("file2.txt").as_deref(), Some("moved.txt"));

        fs.reset();
        assert!(fs.deleted().is_empty());
        // the overlay copy made by the rename is still there
        assert_eq!(read_file(&fs, "moved.txt").unwrap(), b"base content 2");
        assert_eq!(read_file(&fs, "file2.txt").unwrap(), b"base content 2");
    }

    #[test]
    fn test_with_config_enables_whiteout() {
        let base = Arc::new(MemFs::new());
        let overlay = Arc::new(MemFs::new());
        let config = CowConfig {
            whiteout_dir: Some(".wh".to_string()),
            ..Default::default()
        };
        let fs = CowFs::with_config(base, overlay.clone(), &config).unwrap();
        assert_eq!(fs.whiteout_dir().as_deref(), Some(".wh"));
        assert!(overlay.stat(".wh/deletes").unwrap().is_dir());
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = CowConfig {
            max_rename_hops: Some(0),
            ..Default::default()
        };
        let result = CowFs::with_config(MemFs::new(), MemFs::new(), &config);
        assert!(matches!(result, Err(CowError::Config(_))));
    }

    #[test]
    fn test_composite_is_a_filesystem() {
        let (_base, _overlay, fs) = fixture();
        let stacked: &dyn FileSystem = &fs;
        assert!(stacked.stat("dir1/dir2/file4.txt").unwrap().is_file());
        assert!(matches!(
            stacked.open("dir1", OpenFlags::READ, 0),
            Err(CowError::IsADirectory(_))
        ));
    }
}
