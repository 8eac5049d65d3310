//! Filesystem capability interface consumed by the copy-on-write layer.
//!
//! Paths handed to a [`FileSystem`] are slash-separated and relative to the
//! filesystem root; `"."` names the root itself. Backends clean every path
//! they receive with [`clean_path`], so callers may pass `"/a//b/"` or
//! `"a/./b"` and get the same entry.
//!
//! `stat` never follows a trailing symlink: a symlink (even a dangling one)
//! is reported as an existing entry of type [`FileType::Symlink`]. `open`
//! does follow symlinks.

#[cfg(unix)]
pub mod local;
pub mod mem;
mod util;

pub use util::{
    base_name, clean_path, copy_fs, copy_fs_filtered, exists, is_dir, join, mkdir_all, parent_of,
    read_file, stat_opt, walk, write_file,
};

use std::fmt;
use std::io::{Read, Seek, Write};
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    pub len: u64,
    /// Permission bits only (`0o7777` mask).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        DirEntry {
            name: name.into(),
            file_type,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }
}

/// Open flags in the POSIX shape: one access mode plus modifier bits.
///
/// The access mode is read-only unless `WRITE` or `READ_WRITE` is present.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(0);
    pub const WRITE: OpenFlags = OpenFlags(1 << 0);
    pub const READ_WRITE: OpenFlags = OpenFlags(1 << 1);
    pub const APPEND: OpenFlags = OpenFlags(1 << 2);
    pub const CREATE: OpenFlags = OpenFlags(1 << 3);
    pub const TRUNCATE: OpenFlags = OpenFlags(1 << 4);
    pub const EXCLUSIVE: OpenFlags = OpenFlags(1 << 5);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: OpenFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn readable(self) -> bool {
        !self.contains(Self::WRITE) || self.contains(Self::READ_WRITE)
    }

    pub fn writable(self) -> bool {
        self.intersects(Self::WRITE | Self::READ_WRITE | Self::APPEND)
    }

    /// Any flag that can change content: the trigger for copy-up.
    pub fn is_write_mode(self) -> bool {
        self.intersects(
            Self::WRITE | Self::READ_WRITE | Self::APPEND | Self::CREATE | Self::TRUNCATE,
        )
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::WRITE, "WRITE"),
            (Self::READ_WRITE, "READ_WRITE"),
            (Self::APPEND, "APPEND"),
            (Self::CREATE, "CREATE"),
            (Self::TRUNCATE, "TRUNCATE"),
            (Self::EXCLUSIVE, "EXCLUSIVE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "OpenFlags(READ)")
        } else {
            write!(f, "OpenFlags({})", set.join("|"))
        }
    }
}

/// An open file. Dropping the handle closes it.
pub trait VirtualFile: Read + Write + Seek + Send + fmt::Debug {
    fn metadata(&self) -> Result<Metadata>;

    /// Resize the file; growing fills with zero bytes.
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flush content to durable storage where the backend has any.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait FileSystem: Send + Sync + fmt::Debug {
    fn open(&self, path: &str, flags: OpenFlags, perm: u32) -> Result<Box<dyn VirtualFile>>;
    fn stat(&self, path: &str) -> Result<Metadata>;
    /// Entries sorted by name.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;
    fn mkdir(&self, path: &str, perm: u32) -> Result<()>;
    /// Removes a file, a symlink or an empty directory.
    fn remove(&self, path: &str) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    fn symlink(&self, target: &str, link: &str) -> Result<()>;
    fn readlink(&self, path: &str) -> Result<String>;
    fn chmod(&self, path: &str, mode: u32) -> Result<()>;
    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()>;
    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()>;
}

macro_rules! forward_filesystem {
    ($($ty:ty),*) => {
        $(
            impl<T: FileSystem + ?Sized> FileSystem for $ty {
                fn open(&self, path: &str, flags: OpenFlags, perm: u32) -> Result<Box<dyn VirtualFile>> {
                    (**self).open(path, flags, perm)
                }
                fn stat(&self, path: &str) -> Result<Metadata> {
                    (**self).stat(path)
                }
                fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
                    (**self).read_dir(path)
                }
                fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
                    (**self).mkdir(path, perm)
                }
                fn remove(&self, path: &str) -> Result<()> {
                    (**self).remove(path)
                }
                fn rename(&self, from: &str, to: &str) -> Result<()> {
                    (**self).rename(from, to)
                }
                fn symlink(&self, target: &str, link: &str) -> Result<()> {
                    (**self).symlink(target, link)
                }
                fn readlink(&self, path: &str) -> Result<String> {
                    (**self).readlink(path)
                }
                fn chmod(&self, path: &str, mode: u32) -> Result<()> {
                    (**self).chmod(path, mode)
                }
                fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
                    (**self).chown(path, uid, gid)
                }
                fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()> {
                    (**self).chtimes(path, accessed, modified)
                }
            }
        )*
    };
}

forward_filesystem!(&T, Arc<T>, Box<T>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_flags_modes() {
        assert!(OpenFlags::READ.readable());
        assert!(!OpenFlags::READ.writable());
        assert!(!OpenFlags::READ.is_write_mode());

        assert!(!OpenFlags::WRITE.readable());
        assert!(OpenFlags::WRITE.writable());

        let rw = OpenFlags::READ_WRITE;
        assert!(rw.readable() && rw.writable());

        // CREATE alone counts as a write mode for copy-up purposes
        assert!(OpenFlags::CREATE.is_write_mode());
        assert!(!OpenFlags::CREATE.writable());
    }

    #[test]
    fn test_open_flags_debug() {
        let flags = OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::READ_WRITE;
        assert_eq!(
            format!("{:?}", flags),
            "OpenFlags(READ_WRITE|CREATE|TRUNCATE)"
        );
        assert_eq!(format!("{:?}", OpenFlags::READ), "OpenFlags(READ)");
    }
}
