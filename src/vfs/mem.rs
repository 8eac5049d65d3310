//! In-memory filesystem backend.
//!
//! The whole tree sits behind one `parking_lot::RwLock`. File contents live
//! in a shared inode so that open handles keep working across renames and
//! removals, the way they do on a POSIX filesystem.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{CowError, Result};
use crate::vfs::{
    clean_path, join, parent_of, DirEntry, FileSystem, FileType, Metadata, OpenFlags, VirtualFile,
};

const MAX_SYMLINK_HOPS: usize = 40;
const ROOT_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy)]
struct Attrs {
    mode: u32,
    uid: u32,
    gid: u32,
    accessed: SystemTime,
    modified: SystemTime,
}

impl Attrs {
    fn new(mode: u32) -> Self {
        let now = SystemTime::now();
        Attrs {
            mode: mode & 0o7777,
            uid: 0,
            gid: 0,
            accessed: now,
            modified: now,
        }
    }
}

#[derive(Debug)]
struct FileInode {
    data: RwLock<Vec<u8>>,
    attrs: Mutex<Attrs>,
}

impl FileInode {
    fn metadata(&self) -> Metadata {
        let attrs = *self.attrs.lock();
        Metadata {
            file_type: FileType::File,
            len: self.data.read().len() as u64,
            mode: attrs.mode,
            uid: attrs.uid,
            gid: attrs.gid,
            accessed: attrs.accessed,
            modified: attrs.modified,
        }
    }

    fn touch(&self) {
        self.attrs.lock().modified = SystemTime::now();
    }
}

#[derive(Debug)]
enum Node {
    File(Arc<FileInode>),
    Dir {
        attrs: Attrs,
        children: BTreeMap<String, Node>,
    },
    Symlink {
        attrs: Attrs,
        target: String,
    },
}

impl Node {
    fn new_dir(mode: u32) -> Self {
        Node::Dir {
            attrs: Attrs::new(mode),
            children: BTreeMap::new(),
        }
    }

    fn file_type(&self) -> FileType {
        match self {
            Node::File(_) => FileType::File,
            Node::Dir { .. } => FileType::Dir,
            Node::Symlink { .. } => FileType::Symlink,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            Node::File(inode) => inode.metadata(),
            Node::Dir { attrs, children } => Metadata {
                file_type: FileType::Dir,
                len: children.len() as u64,
                mode: attrs.mode,
                uid: attrs.uid,
                gid: attrs.gid,
                accessed: attrs.accessed,
                modified: attrs.modified,
            },
            Node::Symlink { attrs, target } => Metadata {
                file_type: FileType::Symlink,
                len: target.len() as u64,
                mode: attrs.mode,
                uid: attrs.uid,
                gid: attrs.gid,
                accessed: attrs.accessed,
                modified: attrs.modified,
            },
        }
    }

    fn update_attrs(&mut self, update: impl FnOnce(&mut Attrs)) {
        match self {
            Node::File(inode) => update(&mut inode.attrs.lock()),
            Node::Dir { attrs, .. } | Node::Symlink { attrs, .. } => update(attrs),
        }
    }
}

fn components(path: &str) -> Vec<&str> {
    if path == "." {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

fn lookup<'a>(root: &'a Node, path: &str) -> Result<&'a Node> {
    let mut cur = root;
    for comp in components(path) {
        cur = match cur {
            Node::Dir { children, .. } => children
                .get(comp)
                .ok_or_else(|| CowError::not_exist(path))?,
            _ => return Err(CowError::NotADirectory(path.to_string())),
        };
    }
    Ok(cur)
}

fn lookup_mut<'a>(root: &'a mut Node, path: &str) -> Result<&'a mut Node> {
    let mut cur = root;
    for comp in components(path) {
        cur = match cur {
            Node::Dir { children, .. } => children
                .get_mut(comp)
                .ok_or_else(|| CowError::not_exist(path))?,
            _ => return Err(CowError::NotADirectory(path.to_string())),
        };
    }
    Ok(cur)
}

/// The children map of the parent of `path`, plus the final name.
fn parent_dir_mut<'a, 'p>(
    root: &'a mut Node,
    path: &'p str,
) -> Result<(&'a mut BTreeMap<String, Node>, &'p str)> {
    if path == "." {
        return Err(CowError::invalid("operation not permitted on the root"));
    }
    let (parent, name) = match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (".", path),
    };
    match lookup_mut(root, parent)? {
        Node::Dir { children, .. } => Ok((children, name)),
        _ => Err(CowError::NotADirectory(parent.to_string())),
    }
}

#[derive(Debug)]
pub struct MemFs {
    root: RwLock<Node>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        MemFs {
            root: RwLock::new(Node::new_dir(ROOT_MODE)),
        }
    }

    fn open_at(
        &self,
        path: String,
        flags: OpenFlags,
        perm: u32,
        hops: usize,
    ) -> Result<Box<dyn VirtualFile>> {
        if hops > MAX_SYMLINK_HOPS {
            return Err(CowError::invalid(format!("too many symlinks: {}", path)));
        }
        if path == "." {
            return Err(CowError::IsADirectory(path));
        }

        let mut root = self.root.write();
        let (children, name) = parent_dir_mut(&mut root, &path)?;
        let creating = flags.contains(OpenFlags::CREATE);

        let inode = match children.get(name) {
            Some(Node::File(inode)) => {
                if creating && flags.contains(OpenFlags::EXCLUSIVE) {
                    return Err(CowError::exist(path));
                }
                if flags.contains(OpenFlags::TRUNCATE) && flags.writable() {
                    inode.data.write().clear();
                    inode.touch();
                }
                inode.clone()
            }
            Some(Node::Dir { .. }) => return Err(CowError::IsADirectory(path)),
            Some(Node::Symlink { target, .. }) => {
                if creating && flags.contains(OpenFlags::EXCLUSIVE) {
                    return Err(CowError::exist(path));
                }
                let next = if target.starts_with('/') {
                    clean_path(target)
                } else {
                    join(&parent_of(&path), target)
                };
                drop(root);
                return self.open_at(next, flags, perm, hops + 1);
            }
            None if creating => {
                let inode = Arc::new(FileInode {
                    data: RwLock::new(Vec::new()),
                    attrs: Mutex::new(Attrs::new(perm)),
                });
                children.insert(name.to_string(), Node::File(inode.clone()));
                inode
            }
            None => return Err(CowError::not_exist(path)),
        };

        Ok(Box::new(MemFile {
            path,
            inode,
            pos: 0,
            flags,
        }))
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &str, flags: OpenFlags, perm: u32) -> Result<Box<dyn VirtualFile>> {
        self.open_at(clean_path(path), flags, perm, 0)
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let path = clean_path(path);
        let root = self.root.read();
        Ok(lookup(&root, &path)?.metadata())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = clean_path(path);
        let root = self.root.read();
        match lookup(&root, &path)? {
            Node::Dir { children, .. } => Ok(children
                .iter()
                .map(|(name, node)| DirEntry::new(name.clone(), node.file_type()))
                .collect()),
            _ => Err(CowError::NotADirectory(path)),
        }
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        let path = clean_path(path);
        let mut root = self.root.write();
        if path == "." {
            return Err(CowError::exist(path));
        }
        let (children, name) = parent_dir_mut(&mut root, &path)?;
        if children.contains_key(name) {
            return Err(CowError::exist(path));
        }
        children.insert(name.to_string(), Node::new_dir(perm));
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let path = clean_path(path);
        let mut root = self.root.write();
        let (children, name) = parent_dir_mut(&mut root, &path)?;
        match children.get(name) {
            None => return Err(CowError::not_exist(path)),
            Some(Node::Dir { children: inner, .. }) if !inner.is_empty() => {
                return Err(CowError::DirectoryNotEmpty(path))
            }
            Some(_) => {}
        }
        children.remove(name);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = clean_path(from);
        let to = clean_path(to);
        if from == "." || to == "." {
            return Err(CowError::invalid("cannot rename the root"));
        }
        if to.starts_with(&format!("{}/", from)) {
            return Err(CowError::invalid(format!(
                "cannot move {} into its own subtree {}",
                from, to
            )));
        }

        let mut root = self.root.write();
        let src_type = lookup(&root, &from)?.file_type();
        if from == to {
            return Ok(());
        }

        match lookup(&root, &parent_of(&to))? {
            Node::Dir { children, .. } => match children.get(crate::vfs::base_name(&to)) {
                Some(Node::Dir { children: inner, .. }) => {
                    if src_type != FileType::Dir {
                        return Err(CowError::IsADirectory(to));
                    }
                    if !inner.is_empty() {
                        return Err(CowError::DirectoryNotEmpty(to));
                    }
                }
                Some(_) if src_type == FileType::Dir => {
                    return Err(CowError::NotADirectory(to));
                }
                _ => {}
            },
            _ => return Err(CowError::NotADirectory(parent_of(&to))),
        }

        let node = {
            let (children, name) = parent_dir_mut(&mut root, &from)?;
            children
                .remove(name)
                .ok_or_else(|| CowError::not_exist(from.clone()))?
        };
        let (children, name) = parent_dir_mut(&mut root, &to)?;
        children.insert(name.to_string(), node);
        Ok(())
    }

    fn symlink(&self, target: &str, link: &str) -> Result<()> {
        let link = clean_path(link);
        let mut root = self.root.write();
        let (children, name) = parent_dir_mut(&mut root, &link)?;
        if children.contains_key(name) {
            return Err(CowError::exist(link));
        }
        children.insert(
            name.to_string(),
            Node::Symlink {
                attrs: Attrs::new(0o777),
                target: target.to_string(),
            },
        );
        Ok(())
    }

    fn readlink(&self, path: &str) -> Result<String> {
        let path = clean_path(path);
        let root = self.root.read();
        match lookup(&root, &path)? {
            Node::Symlink { target, .. } => Ok(target.clone()),
            _ => Err(CowError::invalid(format!("not a symlink: {}", path))),
        }
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let path = clean_path(path);
        let mut root = self.root.write();
        lookup_mut(&mut root, &path)?.update_attrs(|attrs| attrs.mode = mode & 0o7777);
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let path = clean_path(path);
        let mut root = self.root.write();
        lookup_mut(&mut root, &path)?.update_attrs(|attrs| {
            attrs.uid = uid;
            attrs.gid = gid;
        });
        Ok(())
    }

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        let path = clean_path(path);
        let mut root = self.root.write();
        lookup_mut(&mut root, &path)?.update_attrs(|attrs| {
            attrs.accessed = accessed;
            attrs.modified = modified;
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemFile {
    path: String,
    inode: Arc<FileInode>,
    pos: u64,
    flags: OpenFlags,
}

impl MemFile {
    fn bad_mode(&self, what: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{} not opened for {}", self.path, what),
        )
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.flags.readable() {
            return Err(self.bad_mode("reading"));
        }
        let data = self.inode.data.read();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.flags.writable() {
            return Err(self.bad_mode("writing"));
        }
        let mut data = self.inode.data.write();
        if self.flags.contains(OpenFlags::APPEND) {
            self.pos = data.len() as u64;
        }
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        drop(data);
        self.inode.touch();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.inode.data.read().len() as i64;
        let next = match pos {
            SeekFrom::Start(off) => off as i64,
            SeekFrom::End(off) => len + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}

impl VirtualFile for MemFile {
    fn metadata(&self) -> Result<Metadata> {
        Ok(self.inode.metadata())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        if !self.flags.writable() {
            return Err(self.bad_mode("writing").into());
        }
        self.inode.data.write().resize(len as usize, 0);
        self.inode.touch();
        Ok(())
    }
}
