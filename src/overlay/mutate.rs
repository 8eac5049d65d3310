use std::collections::BTreeSet;
use std::time::SystemTime;

use crate::error::{CowError, Result};
use crate::overlay::types::Presence;
use crate::overlay::{reject_root, CowFs};
use crate::vfs::{clean_path, join, stat_opt, walk, FileSystem, Metadata};

/// `target` with its `from` prefix swapped for `to`; `target` is `from` or lies below it.
fn rebase(target: &str, from: &str, to: &str) -> String {
    if target == from {
        to.to_string()
    } else {
        join(to, &target[from.len() + 1..])
    }
}

impl<B: FileSystem, O: FileSystem> CowFs<B, O> {
    /// Names visible below directory `dir` (already resolved): every overlay
    /// entry plus base entries that are not tombstoned.
    fn visible_children(&self, dir: &str, presence: &Presence) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        if presence.base.as_ref().is_some_and(|m| m.is_dir()) {
            for entry in self.base.read_dir(dir)? {
                if !self.store.is_tombstoned(&join(dir, &entry.name)) {
                    names.insert(entry.name);
                }
            }
        }
        if presence.overlay.as_ref().is_some_and(|m| m.is_dir()) {
            for entry in self.overlay.read_dir(dir)? {
                names.insert(entry.name);
            }
        }
        Ok(names)
    }

    /// Make the overlay tree at `root` the only content at that name.
    ///
    /// Every overlay path below `root` (and `root` itself) loses its tombstone
    /// and any rename mapping keyed on it. Base children of a directory that
    /// the overlay does not hold are tombstoned, so a directory stored over a
    /// deleted or moved-away base directory never lets stale base entries back
    /// into the union.
    ///
    /// # Arguments
    ///
    /// * `root` - cleaned path that was just created or moved into the overlay
    fn claim_subtree(&self, root: &str) -> Result<()> {
        let mut claimed: Vec<(String, bool)> = Vec::new();
        walk(&self.overlay, root, &mut |path: &str, meta: &Metadata| -> Result<()> {
            claimed.push((path.to_string(), meta.is_dir()));
            Ok(())
        })?;

        for (path, _) in &claimed {
            self.revive(path)?;
        }

        for (path, is_dir) in &claimed {
            if !is_dir || !stat_opt(&self.base, path)?.is_some_and(|m| m.is_dir()) {
                continue;
            }
            for entry in self.base.read_dir(path)? {
                let child = join(path, &entry.name);
                if !self.store.is_tombstoned(&child) && stat_opt(&self.overlay, &child)?.is_none() {
                    self.tombstone(&child)?;
                }
            }
        }
        Ok(())
    }

    /// Create directory `name` in the overlay. The path is taken literally,
    /// not resolved through renames.
    ///
    /// A directory created over a base directory starts out empty: the base
    /// children are tombstoned.
    pub fn mkdir(&self, name: &str, perm: u32) -> Result<()> {
        let path = clean_path(name);
        tracing::debug!("mkdir: {} {:o}", path, perm);
        if path == "." {
            return Err(CowError::exist(path));
        }

        let presence = Presence::probe(&self.base, &self.overlay, &path)?;
        if presence.in_overlay() {
            return Err(CowError::exist(path));
        }

        self.ensure_overlay_parent(&path, false)?;
        if presence.in_base() {
            self.tombstone(&path)?;
        }
        self.overlay.mkdir(&path, perm)?;
        self.claim_subtree(&path)
    }

    /// Remove a file, symlink or empty directory.
    ///
    /// Removing an already tombstoned path succeeds and only clears a stray
    /// overlay copy. A directory counts as empty when no overlay entry and no
    /// live base entry remains below it.
    pub fn remove(&self, name: &str) -> Result<()> {
        let name = clean_path(name);
        tracing::debug!("remove: {}", name);
        reject_root(&name, "remove")?;

        let target = self.resolver.resolve_terminal(&name)?;
        let presence = Presence::probe(&self.base, &self.overlay, &target)?;

        if self.store.is_tombstoned(&target) {
            if presence.in_overlay() {
                self.overlay.remove(&target)?;
            }
            return Ok(());
        }

        let meta = match presence.effective() {
            Some(meta) => meta.clone(),
            None => return Err(CowError::not_exist(name)),
        };

        if meta.is_dir() && !self.visible_children(&target, &presence)?.is_empty() {
            return Err(CowError::invalid(format!("directory not empty: {}", name)));
        }

        if presence.in_overlay() {
            self.overlay.remove(&target)?;
        }
        if presence.in_base() {
            self.tombstone(&target)?;
        }
        for source in self.store.sources_pointing_at(&target) {
            self.drop_rename(&source)?;
        }
        Ok(())
    }

    /// Move `old` to `new`, replacing whatever `new` held.
    ///
    /// The source is followed through the rename map; the destination is taken
    /// literally. Overlay-resident sources are renamed in place, base-only
    /// sources are copied up under the new name. Base-origin sources are
    /// tombstoned and recorded as `old -> new`, and any rename entry that
    /// pointed at (or below) the source is redirected so chains stay one hop.
    ///
    /// Once moved, the tree at `new` replaces whatever was deleted there
    /// before: tombstones on the moved paths are cleared and base entries below
    /// `new` that the moved tree lacks are hidden.
    ///
    /// Only `old` itself is mapped. Paths below a moved base directory are not
    /// remapped one by one, so `old/child` keeps resolving to itself and reads
    /// fall through to the base copy until that exact path is removed.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = clean_path(old);
        let new = clean_path(new);
        tracing::debug!("rename: {} -> {}", old, new);
        reject_root(&old, "rename")?;
        reject_root(&new, "replace")?;

        let src = self.resolver.resolve_terminal(&old)?;
        let mut src_presence = Presence::probe(&self.base, &self.overlay, &src)?;
        if self.store.is_tombstoned(&src) {
            // deleted base content cannot be moved back into view
            src_presence.base = None;
        }
        if !src_presence.in_overlay() && !src_presence.in_base() {
            return Err(CowError::not_exist(old));
        }

        if src == new {
            return Ok(());
        }
        if new.starts_with(&format!("{}/", src)) {
            return Err(CowError::invalid(format!(
                "cannot move {} into its own subtree {}",
                old, new
            )));
        }

        let src_is_dir = src_presence.effective().is_some_and(|m| m.is_dir());
        let mut dst_presence = Presence::probe(&self.base, &self.overlay, &new)?;
        if self.store.is_tombstoned(&new) {
            dst_presence.base = None;
        }
        if let Some(dst_meta) = dst_presence.effective() {
            if dst_meta.is_dir() {
                if !src_is_dir {
                    return Err(CowError::IsADirectory(new));
                }
                if !self.visible_children(&new, &dst_presence)?.is_empty() {
                    return Err(CowError::invalid(format!("directory not empty: {}", new)));
                }
            } else if src_is_dir {
                return Err(CowError::NotADirectory(new));
            }
        }

        // clear the destination name
        if dst_presence.in_overlay() {
            self.overlay.remove(&new)?;
        }
        if dst_presence.in_base() {
            self.tombstone(&new)?;
        }

        self.ensure_overlay_parent(&new, true)?;

        if src_presence.in_overlay() {
            if src_is_dir && src_presence.in_base() {
                self.fill_from_base(&src)?;
            }
            self.overlay.rename(&src, &new)?;
        } else {
            self.copy_up(&src, &new)?;
        }

        let base_origin = src_presence.in_base();
        if base_origin {
            self.tombstone(&src)?;
            if old != src {
                self.tombstone(&old)?;
            }
        }

        for (source, target) in self.store.sources_pointing_into(&src) {
            let moved = rebase(&target, &src, &new);
            if source == moved {
                self.drop_rename(&source)?;
            } else {
                self.record_rename(&source, &moved)?;
            }
        }

        if base_origin && old != new {
            self.record_rename(&old, &new)?;
        }

        self.claim_subtree(&new)
    }

    /// Create a symlink at `link` pointing to `target`, which need not exist.
    /// Anything already at `link` is replaced.
    pub fn symlink(&self, target: &str, link: &str) -> Result<()> {
        let path = clean_path(link);
        tracing::debug!("symlink: {} -> {}", path, target);
        reject_root(&path, "replace")?;

        self.ensure_overlay_parent(&path, false)?;

        if stat_opt(&self.overlay, &path)?.is_some() {
            self.overlay.remove(&path)?;
        }
        if stat_opt(&self.base, &path)?.is_some() {
            self.tombstone(&path)?;
        }

        self.overlay.symlink(target, &path)?;
        self.revive(&path)
    }

    /// Change permission bits, copying the entry up first when it only lives
    /// in the base.
    pub fn chmod(&self, name: &str, mode: u32) -> Result<()> {
        let name = clean_path(name);
        tracing::debug!("chmod: {} {:o}", name, mode);
        let path = self.copy_if_needed(&name)?;
        self.overlay.chmod(&path, mode)
    }

    /// Like [`CowFs::chmod`], for ownership.
    pub fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()> {
        let name = clean_path(name);
        tracing::debug!("chown: {} {}:{}", name, uid, gid);
        let path = self.copy_if_needed(&name)?;
        self.overlay.chown(&path, uid, gid)
    }

    /// Set access and modification times on the overlay copy of `name`.
    pub fn chtimes(&self, name: &str, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        let name = clean_path(name);
        tracing::debug!("chtimes: {}", name);
        let path = self.copy_if_needed(&name)?;
        self.overlay.chtimes(&path, accessed, modified)
    }
}

#[cfg(test)]
mod tests {
    use super::rebase;
    use crate::error::CowError;
    use crate::overlay::test_support::{fixture, TestFs};
    use crate::vfs::{read_file, write_file, FileSystem, OpenFlags};
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("a", "a", "b"), "b");
        assert_eq!(rebase("a/x/y", "a", "b/c"), "b/c/x/y");
    }

    #[test]
    fn test_mkdir() {
        let (_base, overlay, fs) = fixture();
        fs.mkdir("dir1/dir2/new", 0o700).unwrap();
        assert_eq!(overlay.stat("dir1/dir2/new").unwrap().mode, 0o700);
        assert!(fs.mkdir("dir1/dir2/new", 0o700).unwrap_err().is_exist());
        assert!(fs.mkdir("missing/new", 0o755).unwrap_err().is_not_exist());
        assert!(fs.mkdir("/", 0o755).unwrap_err().is_exist());
    }

    #[test]
    fn test_mkdir_over_base_entry_clears_tombstone() {
        let (_base, _overlay, fs) = fixture();
        fs.remove("file1.txt").unwrap();
        fs.mkdir("file1.txt", 0o755).unwrap();
        assert!(!fs.tombstoned("file1.txt"));
        assert!(fs.stat("file1.txt").unwrap().is_dir());
    }

    #[test]
    fn test_remove_base_file_tombstones() {
        let (base, _overlay, fs) = fixture();
        fs.remove("file1.txt").unwrap();
        assert!(fs.tombstoned("file1.txt"));
        assert!(fs.stat("file1.txt").unwrap_err().is_not_exist());
        assert!(base.stat("file1.txt").unwrap().is_file());
    }

    #[test]
    fn test_remove_overlay_only_file_leaves_no_tombstone() {
        let (_base, overlay, fs) = fixture();
        fs.create("scratch.txt").unwrap();
        fs.remove("scratch.txt").unwrap();
        assert!(!fs.tombstoned("scratch.txt"));
        assert!(overlay.stat("scratch.txt").unwrap_err().is_not_exist());
        assert!(fs.remove("scratch.txt").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_remove_is_idempotent_on_tombstones() {
        let (_base, overlay, fs) = fixture();
        fs.remove("file1.txt").unwrap();
        // a stray copy appears behind the tombstone
        write_file(&*overlay, "file1.txt", b"stray", 0o644).unwrap();
        let before = fs.deleted();

        fs.remove("file1.txt").unwrap();
        assert!(overlay.stat("file1.txt").unwrap_err().is_not_exist());
        assert_eq!(fs.deleted(), before);
    }

    #[test]
    fn test_remove_directory_guard() {
        let (_base, _overlay, fs) = fixture();
        assert!(fs.remove("dir1/dir2").unwrap_err().is_invalid());

        fs.remove("dir1/dir2/file4.txt").unwrap();
        fs.remove("dir1/dir2").unwrap();
        assert!(fs.tombstoned("dir1/dir2"));

        fs.create("dir1/extra.txt").unwrap();
        fs.remove("dir1/file3.txt").unwrap();
        assert!(fs.remove("dir1").unwrap_err().is_invalid());
        fs.remove("dir1/extra.txt").unwrap();
        fs.remove("dir1").unwrap();
        assert!(fs.stat("dir1").unwrap_err().is_not_exist());
        assert!(fs.remove(".").unwrap_err().is_invalid());
    }

    #[test]
    fn test_rename_base_file() {
        let (base, overlay, fs) = fixture();
        fs.rename("file1.txt", "moved.txt").unwrap();

        assert_eq!(read_file(&*overlay, "moved.txt").unwrap(), b"base content 1");
        assert!(base.stat("file1.txt").unwrap().is_file());
        assert!(fs.tombstoned("file1.txt"));
        assert_eq!(fs.rename_target("file1.txt").as_deref(), Some("moved.txt"));
        // the old name follows the file
        assert_eq!(fs.resolve_path("file1.txt").unwrap(), "moved.txt");
        assert_eq!(read_file(&fs, "file1.txt").unwrap(), b"base content 1");
    }

    #[test]
    fn test_rename_chain_collapses() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("file1.txt", "b.txt").unwrap();
        fs.rename("b.txt", "c.txt").unwrap();

        assert_eq!(fs.rename_target("file1.txt").as_deref(), Some("c.txt"));
        assert_eq!(fs.rename_target("b.txt"), None);
        assert_eq!(fs.resolve_path("file1.txt").unwrap(), "c.txt");
        assert!(fs.stat("b.txt").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_rename_back_to_origin_drops_mapping() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("file1.txt", "b.txt").unwrap();
        fs.rename("b.txt", "file1.txt").unwrap();

        assert!(fs.renames().is_empty());
        assert!(!fs.tombstoned("file1.txt"));
        assert_eq!(read_file(&fs, "file1.txt").unwrap(), b"base content 1");
        assert!(fs.stat("b.txt").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_rename_overwrites_destination() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("file1.txt", "base1.moved").unwrap();
        fs.rename("dir1/file3.txt", "base1.moved").unwrap();

        assert_eq!(read_file(&fs, "base1.moved").unwrap(), b"base content 3");
        assert_eq!(fs.resolve_path("file1.txt").unwrap(), "base1.moved");
        assert_eq!(read_file(&fs, "file1.txt").unwrap(), b"base content 3");
    }

    #[test]
    fn test_rename_directory_carries_scaffolded_children() {
        let (_base, _overlay, fs) = fixture();
        // leaves only a stub of dir1 in the overlay
        fs.create("dir1/new.txt").unwrap();
        fs.remove("dir1/file3.txt").unwrap();
        fs.rename("dir1", "renamed").unwrap();

        let names: Vec<String> = fs
            .read_dir("renamed")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["dir2", "new.txt"]);
        assert_eq!(
            read_file(&fs, "renamed/dir2/file4.txt").unwrap(),
            b"base content 4"
        );
        assert!(fs.tombstoned("dir1"));
        assert_eq!(fs.resolve_path("dir1").unwrap(), "renamed");
    }

    fn listing(fs: &TestFs, dir: &str) -> Vec<String> {
        fs.read_dir(dir).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_rename_onto_emptied_directory_shows_moved_children() {
        let (_base, overlay, fs) = fixture();
        fs.remove("dir1/file3.txt").unwrap();
        fs.remove("dir1/dir2/file4.txt").unwrap();
        fs.remove("dir1/dir2").unwrap();

        fs.mkdir("tmp", 0o755).unwrap();
        write_file(&fs, "tmp/file3.txt", b"moved in", 0o644).unwrap();
        fs.rename("tmp", "dir1").unwrap();

        assert!(!fs.tombstoned("dir1/file3.txt"));
        assert!(fs.stat("dir1/file3.txt").unwrap().is_file());
        assert_eq!(read_file(&fs, "dir1/file3.txt").unwrap(), b"moved in");
        assert_eq!(listing(&fs, "dir1"), vec!["file3.txt"]);
        assert!(fs.stat("dir1/dir2").unwrap_err().is_not_exist());
        assert!(overlay.stat("tmp").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_directory_over_moved_away_base_directory_starts_empty() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("dir1", "away").unwrap();
        fs.mkdir("dir1", 0o755).unwrap();

        assert!(listing(&fs, "dir1").is_empty());
        assert!(fs.tombstoned("dir1/file3.txt"));
        assert!(fs.tombstoned("dir1/dir2"));
        assert_eq!(listing(&fs, "away"), vec!["dir2", "file3.txt"]);

        // a moved-in tree replaces the base children the same way
        fs.remove("dir1").unwrap();
        fs.mkdir("tmp", 0o755).unwrap();
        fs.create("tmp/fresh.txt").unwrap();
        fs.rename("tmp", "dir1").unwrap();
        assert_eq!(listing(&fs, "dir1"), vec!["fresh.txt"]);
    }

    #[test]
    fn test_rename_directory_leaves_old_child_paths_alone() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("dir1", "moved").unwrap();

        assert_eq!(fs.resolve_path("dir1").unwrap(), "moved");
        // only the directory name is mapped; its children fall through to the base
        assert_eq!(fs.resolve_path("dir1/file3.txt").unwrap(), "dir1/file3.txt");
        assert_eq!(read_file(&fs, "dir1/file3.txt").unwrap(), b"base content 3");
        assert_eq!(read_file(&fs, "moved/file3.txt").unwrap(), b"base content 3");
    }

    #[test]
    fn test_rename_redirects_entries_inside_moved_directory() {
        let (_base, _overlay, fs) = fixture();
        fs.mkdir("box", 0o755).unwrap();
        fs.rename("file1.txt", "box/file1.txt").unwrap();
        fs.rename("box", "crate").unwrap();

        assert_eq!(fs.rename_target("file1.txt").as_deref(), Some("crate/file1.txt"));
        assert_eq!(read_file(&fs, "file1.txt").unwrap(), b"base content 1");
    }

    #[test]
    fn test_rename_errors() {
        let (_base, _overlay, fs) = fixture();
        assert!(fs.rename("missing", "x").unwrap_err().is_not_exist());
        assert!(fs.rename("dir1", "dir1/inner").unwrap_err().is_invalid());
        assert!(matches!(
            fs.rename("file1.txt", "dir1"),
            Err(CowError::IsADirectory(_))
        ));
        // same name is a no-op
        fs.rename("file2.txt", "file2.txt").unwrap();
        assert!(fs.deleted().is_empty());

        fs.remove("file2.txt").unwrap();
        assert!(fs.rename("file2.txt", "back.txt").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_symlink_replaces_and_dangles() {
        let (_base, overlay, fs) = fixture();
        fs.symlink("does/not/exist", "file1.txt").unwrap();
        assert!(fs.stat("file1.txt").unwrap().is_symlink());
        assert_eq!(fs.readlink("file1.txt").unwrap(), "does/not/exist");
        assert!(!fs.tombstoned("file1.txt"));
        assert!(overlay.stat("file1.txt").unwrap().is_symlink());

        fs.symlink("file2.txt", "dir1/dir2/link").unwrap();
        assert_eq!(fs.readlink("dir1/dir2/link").unwrap(), "file2.txt");
        assert!(fs.symlink("x", "missing/link").unwrap_err().is_not_exist());
    }

    #[test]
    fn test_metadata_changes_copy_up() {
        let (base, overlay, fs) = fixture();
        fs.chmod("file1.txt", 0o600).unwrap();
        assert_eq!(fs.stat("file1.txt").unwrap().mode, 0o600);
        assert_eq!(base.stat("file1.txt").unwrap().mode, 0o644);
        assert_eq!(read_file(&*overlay, "file1.txt").unwrap(), b"base content 1");

        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs.chtimes("file2.txt", when, when).unwrap();
        assert_eq!(overlay.stat("file2.txt").unwrap().modified, when);

        fs.chown("dir1/file3.txt", 42, 7).unwrap();
        let meta = overlay.stat("dir1/file3.txt").unwrap();
        assert_eq!((meta.uid, meta.gid), (42, 7));

        assert!(fs.chmod("missing", 0o600).unwrap_err().is_not_exist());
    }

    #[test]
    fn test_open_through_old_name_after_rename() {
        let (_base, _overlay, fs) = fixture();
        fs.rename("file2.txt", "file2.renamed.txt").unwrap();
        let mut file = fs
            .open_file("file2.txt", OpenFlags::WRITE | OpenFlags::APPEND, 0)
            .unwrap()
            .into_file()
            .unwrap();
        std::io::Write::write_all(&mut file, b"!").unwrap();
        drop(file);
        assert_eq!(
            read_file(&fs, "file2.renamed.txt").unwrap(),
            b"base content 2!"
        );
        assert_eq!(fs.store().rename_target("file2.txt").as_deref(), Some("file2.renamed.txt"));
    }
}
