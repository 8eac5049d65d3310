//! Durable log of tombstones and renames kept inside the overlay.
//!
//! The log lives under a directory chosen by the caller (for example `.wh`)
//! and has two subdirectories:
//!
//! - `deletes/` holds one file per tombstoned path; the file content is the
//!   path itself.
//! - `renames/` holds one file per rename entry; the content is
//!   `"<old> <new>"` on a single line.
//!
//! Each file is named after the BLAKE3 hash (hex) of the path it describes
//! (the tombstoned path, or the rename source). Writing an entry for the same
//! path again therefore replaces the previous file, which keeps persisted
//! rename chains collapsed the same way the in-memory map is. Readers still
//! enumerate the directories and parse content; the file name is only
//! consulted to disambiguate rename paths that contain spaces.

use crate::error::{CowError, Result};
use crate::overlay::store::Bookkeeping;
use crate::vfs::{clean_path, join, mkdir_all, read_file, write_file, FileSystem};

/// Subdirectory holding one file per tombstoned path.
pub const DELETES_DIR: &str = "deletes";
/// Subdirectory holding one `"old new"` file per rename source.
pub const RENAMES_DIR: &str = "renames";

/// Entries read back by [`WhiteoutLog::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub tombstones: usize,
    pub renames: usize,
    pub skipped: usize,
}

/// Handle on an initialized whiteout directory in the overlay.
#[derive(Debug, Clone)]
pub struct WhiteoutLog {
    root: String,
    file_mode: u32,
}

/// Stable file name for the entry describing `path`.
pub fn entry_name(path: &str) -> String {
    blake3::hash(path.as_bytes()).to_hex().to_string()
}

/// Split a rename entry into `(old, new)`.
///
/// Paths may contain spaces, so every space is a candidate separator. The
/// candidate whose `old` half hashes to `file_name` wins; without a match
/// the first space is used.
///
/// # Arguments
/// * `content` - The trimmed file content
/// * `file_name` - Name of the file the content was read from
///
/// # Returns
/// `None` when the content has no separator or either half is empty.
pub fn parse_rename(content: &str, file_name: &str) -> Option<(String, String)> {
    let split_at = content
        .match_indices(' ')
        .map(|(idx, _)| idx)
        .find(|&idx| entry_name(&content[..idx]) == file_name)
        .or_else(|| content.find(' '))?;

    let old = &content[..split_at];
    let new = content[split_at + 1..].trim_start();
    if old.is_empty() || new.is_empty() {
        return None;
    }
    Some((old.to_string(), new.to_string()))
}

impl WhiteoutLog {
    /// Create `<root>`, `<root>/deletes` and `<root>/renames` in `fs` as needed.
    ///
    /// # Arguments
    /// * `fs` - The overlay filesystem
    /// * `root` - Relative directory for the log; must not be the root itself
    /// * `dir_mode` - Permission bits for directories this call creates
    /// * `file_mode` - Permission bits for entry files written later
    pub fn open<F: FileSystem + ?Sized>(
        fs: &F,
        root: &str,
        dir_mode: u32,
        file_mode: u32,
    ) -> Result<Self> {
        let root = clean_path(root);
        if root == "." {
            return Err(CowError::invalid(
                "whiteout directory must name a directory below the overlay root",
            ));
        }
        mkdir_all(fs, &join(&root, DELETES_DIR), dir_mode)?;
        mkdir_all(fs, &join(&root, RENAMES_DIR), dir_mode)?;
        Ok(WhiteoutLog { root, file_mode })
    }

    /// Log directory, relative to the overlay root.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn delete_entry(&self, path: &str) -> String {
        join(&join(&self.root, DELETES_DIR), &entry_name(path))
    }

    fn rename_entry(&self, from: &str) -> String {
        join(&join(&self.root, RENAMES_DIR), &entry_name(from))
    }

    /// Merge every persisted entry into `store`. Existing in-memory entries
    /// are kept; a persisted rename for the same source overrides it.
    ///
    /// Unparseable rename files are logged and skipped rather than failing
    /// the whole load.
    ///
    /// # Returns
    /// How many tombstones and renames were merged, and how many files were skipped.
    pub fn load<F: FileSystem + ?Sized>(&self, fs: &F, store: &Bookkeeping) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        let deletes = join(&self.root, DELETES_DIR);
        for entry in fs.read_dir(&deletes)? {
            if entry.is_dir() {
                continue;
            }
            let data = read_file(fs, &join(&deletes, &entry.name))?;
            let path = String::from_utf8_lossy(&data).trim().to_string();
            if path.is_empty() {
                tracing::warn!("Skipping empty whiteout delete entry {}", entry.name);
                stats.skipped += 1;
                continue;
            }
            store.insert_tombstone(&path);
            stats.tombstones += 1;
        }

        let renames = join(&self.root, RENAMES_DIR);
        for entry in fs.read_dir(&renames)? {
            if entry.is_dir() {
                continue;
            }
            let data = read_file(fs, &join(&renames, &entry.name))?;
            let content = String::from_utf8_lossy(&data);
            match parse_rename(content.trim(), &entry.name) {
                Some((old, new)) => {
                    store.set_rename(&old, &new);
                    stats.renames += 1;
                }
                None => {
                    tracing::warn!(
                        "Skipping malformed whiteout rename entry {}: {:?}",
                        entry.name,
                        content
                    );
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Write an entry for every tombstone and rename currently in `store`.
    pub fn persist_all<F: FileSystem + ?Sized>(&self, fs: &F, store: &Bookkeeping) -> Result<()> {
        for path in store.tombstones() {
            self.record_delete(fs, &path)?;
        }
        for (from, to) in store.renames() {
            self.record_rename(fs, &from, &to)?;
        }
        Ok(())
    }

    /// Write (or rewrite) the delete entry for `path`.
    ///
    /// # Arguments
    /// * `fs` - The overlay filesystem
    /// * `path` - Tombstoned path; stored verbatim as the entry content
    pub fn record_delete<F: FileSystem + ?Sized>(&self, fs: &F, path: &str) -> Result<()> {
        write_file(fs, &self.delete_entry(path), path.as_bytes(), self.file_mode)
    }

    /// Remove the delete entry for `path`; a missing entry is not an error.
    pub fn clear_delete<F: FileSystem + ?Sized>(&self, fs: &F, path: &str) -> Result<()> {
        remove_entry(fs, &self.delete_entry(path))
    }

    /// Write the rename entry keyed on `from`, replacing any earlier target.
    ///
    /// # Arguments
    /// * `fs` - The overlay filesystem
    /// * `from` - Original base path; names the entry file
    /// * `to` - Current location
    pub fn record_rename<F: FileSystem + ?Sized>(&self, fs: &F, from: &str, to: &str) -> Result<()> {
        let content = format!("{} {}", from, to);
        write_file(fs, &self.rename_entry(from), content.as_bytes(), self.file_mode)
    }

    /// Remove the rename entry keyed on `from`, if any.
    pub fn clear_rename<F: FileSystem + ?Sized>(&self, fs: &F, from: &str) -> Result<()> {
        remove_entry(fs, &self.rename_entry(from))
    }
}

fn remove_entry<F: FileSystem + ?Sized>(fs: &F, path: &str) -> Result<()> {
    match fs.remove(path) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_exist() => Ok(()),
        Err(e) => Err(e),
    }
}
