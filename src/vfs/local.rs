//! Filesystem backend rooted at a directory on the host.

use std::fs::{self, File, FileTimes, OpenOptions, Permissions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CowError, Result};
use crate::vfs::{clean_path, DirEntry, FileSystem, FileType, Metadata, OpenFlags, VirtualFile};

#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Serve the tree below `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| {
            CowError::Config(format!("Failed to open root {}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(CowError::NotADirectory(root.display().to_string()));
        }
        Ok(LocalFs { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let path = clean_path(path);
        if path == "." {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

fn convert_file_type(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Dir
    } else if ft.is_symlink() {
        FileType::Symlink
    } else {
        FileType::File
    }
}

fn convert_metadata(meta: &fs::Metadata) -> Metadata {
    Metadata {
        file_type: convert_file_type(meta.file_type()),
        len: meta.len(),
        mode: meta.mode() & 0o7777,
        uid: meta.uid(),
        gid: meta.gid(),
        accessed: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

/// Attach the composite-relative path to "missing" and "exists" errors.
fn with_path(err: io::Error, path: &str) -> CowError {
    match err.kind() {
        io::ErrorKind::NotFound => CowError::not_exist(path),
        io::ErrorKind::AlreadyExists => CowError::exist(path),
        _ => err.into(),
    }
}

impl FileSystem for LocalFs {
    fn open(&self, path: &str, flags: OpenFlags, perm: u32) -> Result<Box<dyn VirtualFile>> {
        let host = self.host_path(path);
        if let Ok(meta) = fs::metadata(&host) {
            if meta.is_dir() {
                return Err(CowError::IsADirectory(clean_path(path)));
            }
        }

        let creating = flags.contains(OpenFlags::CREATE);
        let truncating = flags.contains(OpenFlags::TRUNCATE);
        // std requires write access for create and truncate
        let write = flags.intersects(OpenFlags::WRITE | OpenFlags::READ_WRITE)
            || ((creating || truncating) && !flags.contains(OpenFlags::APPEND));

        let file = OpenOptions::new()
            .read(flags.readable())
            .write(write)
            .append(flags.contains(OpenFlags::APPEND))
            .truncate(truncating)
            .create(creating && !flags.contains(OpenFlags::EXCLUSIVE))
            .create_new(creating && flags.contains(OpenFlags::EXCLUSIVE))
            .mode(perm)
            .open(&host)
            .map_err(|e| with_path(e, path))?;

        Ok(Box::new(LocalFile { file }))
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let meta = fs::symlink_metadata(self.host_path(path)).map_err(|e| with_path(e, path))?;
        Ok(convert_metadata(&meta))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.host_path(path)).map_err(|e| with_path(e, path))? {
            let entry = entry?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                convert_file_type(entry.file_type()?),
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        fs::DirBuilder::new()
            .mode(perm)
            .create(self.host_path(path))
            .map_err(|e| with_path(e, path))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let host = self.host_path(path);
        let meta = fs::symlink_metadata(&host).map_err(|e| with_path(e, path))?;
        if meta.is_dir() {
            if fs::read_dir(&host)?.next().is_some() {
                return Err(CowError::DirectoryNotEmpty(clean_path(path)));
            }
            fs::remove_dir(&host).map_err(|e| with_path(e, path))
        } else {
            fs::remove_file(&host).map_err(|e| with_path(e, path))
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.host_path(from), self.host_path(to)).map_err(|e| with_path(e, from))
    }

    fn symlink(&self, target: &str, link: &str) -> Result<()> {
        std::os::unix::fs::symlink(target, self.host_path(link)).map_err(|e| with_path(e, link))
    }

    fn readlink(&self, path: &str) -> Result<String> {
        let target = fs::read_link(self.host_path(path)).map_err(|e| with_path(e, path))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        fs::set_permissions(self.host_path(path), Permissions::from_mode(mode & 0o7777))
            .map_err(|e| with_path(e, path))
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        std::os::unix::fs::chown(self.host_path(path), Some(uid), Some(gid))
            .map_err(|e| with_path(e, path))
    }

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        let host = self.host_path(path);
        // write-only files refuse a read handle; timestamps only need one of the two
        let file = match File::open(&host) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => OpenOptions::new()
                .write(true)
                .open(&host)
                .map_err(|e| with_path(e, path))?,
            Err(e) => return Err(with_path(e, path)),
        };
        file.set_times(
            FileTimes::new()
                .set_accessed(accessed)
                .set_modified(modified),
        )?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct LocalFile {
    file: File,
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LocalFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl VirtualFile for LocalFile {
    fn metadata(&self) -> Result<Metadata> {
        Ok(convert_metadata(&self.file.metadata()?))
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
