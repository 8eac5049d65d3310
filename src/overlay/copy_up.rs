use crate::error::{CowError, Result};
use crate::overlay::CowFs;
use crate::vfs::{copy_fs_filtered, join, mkdir_all, parent_of, stat_opt, FileSystem};

impl<B: FileSystem, O: FileSystem> CowFs<B, O> {
    /// True when `path` is missing from the overlay but present in the base.
    /// A path in neither layer is an error.
    pub(crate) fn should_copy(&self, path: &str) -> Result<bool> {
        if stat_opt(&self.overlay, path)?.is_some() {
            return Ok(false);
        }
        if stat_opt(&self.base, path)?.is_some() {
            return Ok(true);
        }
        Err(CowError::not_exist(path))
    }

    /// Resolve `name` and make sure the result lives in the overlay, copying
    /// the base entry (a whole subtree for directories) when it does not.
    /// Returns the resolved path.
    pub(crate) fn copy_if_needed(&self, name: &str) -> Result<String> {
        let path = self.resolver.resolve_path(name)?;
        if self.should_copy(&path)? {
            self.copy_up(&path, &path)?;
        }
        Ok(path)
    }

    /// Copy the base entry at `src` to `dst` in the overlay, leaving out
    /// tombstoned descendants.
    pub(crate) fn copy_up(&self, src: &str, dst: &str) -> Result<()> {
        tracing::debug!("Copying up {} -> {}", src, dst);
        let skip = |path: &str| self.store.is_tombstoned(path);
        copy_fs_filtered(&self.base, src, &self.overlay, dst, &skip)
    }

    /// Give an overlay directory every live base child it is missing.
    ///
    /// A directory reaches the overlay either by a full copy-up or as an empty
    /// scaffold for one of its descendants. Before such a directory is moved
    /// as a unit, the base children a scaffold never received are copied in.
    pub(crate) fn fill_from_base(&self, dir: &str) -> Result<()> {
        match stat_opt(&self.base, dir)? {
            Some(meta) if meta.is_dir() => {}
            _ => return Ok(()),
        }
        for entry in self.base.read_dir(dir)? {
            let child = join(dir, &entry.name);
            if self.store.is_tombstoned(&child) {
                continue;
            }
            match stat_opt(&self.overlay, &child)? {
                None => self.copy_up(&child, &child)?,
                Some(meta) if meta.is_dir() && entry.is_dir() => self.fill_from_base(&child)?,
                // overlay entry shadows the base one
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Make sure the parent directory of `path` exists in the overlay.
    ///
    /// A parent found only in the base gets an empty directory stub (no
    /// recursive copy). A parent in neither layer is created when
    /// `create_missing` is set and is an error otherwise.
    pub(crate) fn ensure_overlay_parent(&self, path: &str, create_missing: bool) -> Result<()> {
        let parent = parent_of(path);
        if parent == "." || stat_opt(&self.overlay, &parent)?.is_some() {
            return Ok(());
        }
        if create_missing || stat_opt(&self.base, &parent)?.is_some() {
            tracing::trace!("Scaffolding {} in overlay", parent);
            return mkdir_all(&self.overlay, &parent, self.scaffold_mode);
        }
        Err(CowError::not_exist(parent))
    }
}
