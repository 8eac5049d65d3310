use crate::error::{CowError, Result};
use crate::overlay::types::{Handle, Presence};
use crate::overlay::union_dir::{DirHandle, DirectoryView};
use crate::overlay::CowFs;
use crate::vfs::{clean_path, stat_opt, write_file, DirEntry, FileSystem, Metadata, OpenFlags};

impl<B: FileSystem, O: FileSystem> CowFs<B, O> {
    /// Metadata of `name`, preferring the overlay. Symlinks are not followed.
    pub fn stat(&self, name: &str) -> Result<Metadata> {
        let name = clean_path(name);
        tracing::trace!("stat: {}", name);

        let path = self.resolver.resolve_path(&name)?;
        if let Some(meta) = stat_opt(&self.overlay, &path)? {
            return Ok(meta);
        }
        self.base.stat(&path)
    }

    /// Open `name` read-only. Directories come back as a [`DirHandle`] over
    /// the merged listing.
    pub fn open(&self, name: &str) -> Result<Handle> {
        let name = clean_path(name);
        tracing::trace!("open: {}", name);

        let path = self.resolver.resolve_path(&name)?;
        self.open_resolved(&path, OpenFlags::READ)
    }

    /// Open a path that has already been resolved and checked against
    /// tombstones, without any copy-up.
    fn open_resolved(&self, path: &str, flags: OpenFlags) -> Result<Handle> {
        let presence = Presence::probe(&self.base, &self.overlay, path)?;
        match (presence.overlay, presence.base) {
            (Some(meta), _) if !meta.is_dir() => {
                Ok(Handle::File(self.overlay.open(path, flags, 0)?))
            }
            (Some(meta), Some(base_meta)) if base_meta.is_dir() => {
                let view = DirectoryView::union(
                    self.base.read_dir(path)?,
                    self.overlay.read_dir(path)?,
                    self.hide_fn(path),
                );
                Ok(Handle::Dir(DirHandle::new(path, meta, view)))
            }
            (Some(meta), _) => {
                let view = DirectoryView::overlay_only(self.overlay.read_dir(path)?);
                Ok(Handle::Dir(DirHandle::new(path, meta, view)))
            }
            (None, Some(meta)) if meta.is_dir() => {
                let view = DirectoryView::base_only(self.base.read_dir(path)?, self.hide_fn(path));
                Ok(Handle::Dir(DirHandle::new(path, meta, view)))
            }
            (None, Some(_)) => Ok(Handle::File(self.base.open(path, flags, 0)?)),
            (None, None) => Err(CowError::not_exist(path)),
        }
    }

    /// Open `name` with POSIX-style `flags`.
    ///
    /// Read-only opens never touch the overlay. Any write-mode flag (write,
    /// read-write, append, create, truncate) makes sure the file lives in the
    /// overlay first:
    ///
    /// - a base-only file is copied up in full, unless `TRUNCATE` is set;
    /// - with `CREATE | TRUNCATE` an empty file is written instead;
    /// - with `TRUNCATE` alone nothing is copied and the overlay open fails
    ///   with NotExist;
    /// - a missing parent is scaffolded when it exists in the base, or
    ///   created outright when `CREATE` is set.
    ///
    /// Without `TRUNCATE` an existing file is opened at offset 0 and
    /// overwritten in place; shorter writes leave the old tail behind.
    pub fn open_file(&self, name: &str, flags: OpenFlags, perm: u32) -> Result<Handle> {
        let name = clean_path(name);
        tracing::debug!("open_file: {} {:?} {:o}", name, flags, perm);

        let creating = flags.contains(OpenFlags::CREATE);
        let path = match self.resolver.resolve_path(&name) {
            Ok(path) => path,
            Err(e) if e.is_not_exist() && creating => name.clone(),
            Err(e) => return Err(e),
        };

        let tombstoned = self.store.is_tombstoned(&path);
        if tombstoned && !creating {
            return Err(CowError::not_exist(name));
        }

        let mut presence = Presence::probe(&self.base, &self.overlay, &path)?;
        if tombstoned {
            // a deleted base entry does not exist for anything below
            presence.base = None;
        }

        if creating
            && flags.contains(OpenFlags::EXCLUSIVE)
            && (presence.in_overlay() || presence.in_base())
        {
            return Err(CowError::exist(name));
        }

        if !flags.is_write_mode() {
            return self.open_resolved(&path, flags);
        }

        if let (None, Some(meta)) = (&presence.overlay, &presence.base) {
            if meta.is_dir() {
                return Err(CowError::IsADirectory(name));
            }
        }

        self.ensure_overlay_parent(&path, creating)?;

        if !presence.in_overlay() && presence.in_base() {
            if flags.contains(OpenFlags::TRUNCATE) {
                if creating {
                    tracing::debug!("Creating empty overlay copy of {}", path);
                    write_file(&self.overlay, &path, &[], perm)?;
                }
            } else {
                self.copy_up(&path, &path)?;
            }
        }

        let file = self.overlay.open(&path, flags, perm)?;
        // the handle is already open; a failed log write must not leak it
        if let Err(e) = self.revive(&path) {
            tracing::warn!("Failed to persist revival of {}: {}", path, e);
        }
        Ok(Handle::File(file))
    }

    /// Create or truncate `name` for reading and writing.
    pub fn create(&self, name: &str) -> Result<Handle> {
        self.open_file(
            name,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::READ_WRITE,
            0o666,
        )
    }

    /// Target of the symlink `name`, resolved through renames.
    pub fn readlink(&self, name: &str) -> Result<String> {
        let name = clean_path(name);
        tracing::trace!("readlink: {}", name);

        let path = self.resolver.resolve_path(&name)?;
        if stat_opt(&self.overlay, &path)?.is_some() {
            return self.overlay.readlink(&path);
        }
        self.base.readlink(&path)
    }

    /// The full merged listing of directory `name`.
    pub fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let name = clean_path(name);
        match self.open(&name)? {
            Handle::Dir(dir) => Ok(dir.view().entries()),
            Handle::File(_) => Err(CowError::NotADirectory(name)),
        }
    }
}
