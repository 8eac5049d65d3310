use std::io::{self, Write};

use crate::error::{CowError, Result};
use crate::vfs::{FileSystem, FileType, Metadata, OpenFlags};

const COPY_DIR_MODE: u32 = 0o755;

/// Lexically clean a slash-separated path.
///
/// Leading slashes, empty components and `.` are dropped, `..` pops the
/// previous component (and is ignored at the root). The root is `"."`, so
/// the result is never empty.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Parent of a cleaned path; the parent of a top-level name (and of the root) is `"."`.
pub fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Last component of a cleaned path.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join and clean; `"."` as `dir` yields `name` alone.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "." || dir.is_empty() {
        clean_path(name)
    } else {
        clean_path(&format!("{}/{}", dir, name))
    }
}

/// Stat that turns "missing" into `None` and passes every other error through.
pub fn stat_opt<F: FileSystem + ?Sized>(fs: &F, path: &str) -> Result<Option<Metadata>> {
    match fs.stat(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.is_not_exist() => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn exists<F: FileSystem + ?Sized>(fs: &F, path: &str) -> Result<bool> {
    Ok(stat_opt(fs, path)?.is_some())
}

pub fn is_dir<F: FileSystem + ?Sized>(fs: &F, path: &str) -> Result<bool> {
    Ok(fs.stat(path)?.is_dir())
}

/// Create `path` and any missing ancestors. Existing directories are fine;
/// an existing non-directory component is an error.
pub fn mkdir_all<F: FileSystem + ?Sized>(fs: &F, path: &str, perm: u32) -> Result<()> {
    let path = clean_path(path);
    if path == "." {
        return Ok(());
    }
    let mut current = String::new();
    for comp in path.split('/') {
        current = join(&current, comp);
        match stat_opt(fs, &current)? {
            Some(meta) if meta.is_dir() => continue,
            Some(_) => return Err(CowError::NotADirectory(current)),
            None => match fs.mkdir(&current, perm) {
                Ok(()) => {}
                // lost a race with another creator
                Err(e) if e.is_exist() => {}
                Err(e) => return Err(e),
            },
        }
    }
    Ok(())
}

/// Whole content of the file at `path`.
pub fn read_file<F: FileSystem + ?Sized>(fs: &F, path: &str) -> Result<Vec<u8>> {
    let mut file = fs.open(path, OpenFlags::READ, 0)?;
    let mut data = Vec::new();
    io::Read::read_to_end(&mut file, &mut data)?;
    Ok(data)
}

/// Create or truncate `path` and write `data` durably.
pub fn write_file<F: FileSystem + ?Sized>(fs: &F, path: &str, data: &[u8], perm: u32) -> Result<()> {
    let mut file = fs.open(
        path,
        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        perm,
    )?;
    file.write_all(data)?;
    file.sync()?;
    Ok(())
}

/// Copy the entry at `src_path` in `src` (file, symlink or whole directory
/// subtree) to `dst_path` in `dst`. Missing parents of the destination are
/// created; modes and timestamps are carried over.
pub fn copy_fs<S, D>(src: &S, src_path: &str, dst: &D, dst_path: &str) -> Result<()>
where
    S: FileSystem + ?Sized,
    D: FileSystem + ?Sized,
{
    copy_fs_filtered(src, src_path, dst, dst_path, &|_| false)
}

/// [`copy_fs`] that leaves out every descendant whose source path `skip`
/// accepts (and, for directories, everything below it). The root entry
/// itself is always copied.
pub fn copy_fs_filtered<S, D>(
    src: &S,
    src_path: &str,
    dst: &D,
    dst_path: &str,
    skip: &dyn Fn(&str) -> bool,
) -> Result<()>
where
    S: FileSystem + ?Sized,
    D: FileSystem + ?Sized,
{
    let src_path = clean_path(src_path);
    let dst_path = clean_path(dst_path);
    let meta = src.stat(&src_path)?;

    let parent = parent_of(&dst_path);
    if parent != "." {
        mkdir_all(dst, &parent, COPY_DIR_MODE)?;
    }

    tracing::trace!("copy_fs: {} -> {} ({:?})", src_path, dst_path, meta.file_type);
    copy_entry(src, &src_path, &meta, dst, &dst_path, skip)
}

fn copy_entry<S, D>(
    src: &S,
    src_path: &str,
    meta: &Metadata,
    dst: &D,
    dst_path: &str,
    skip: &dyn Fn(&str) -> bool,
) -> Result<()>
where
    S: FileSystem + ?Sized,
    D: FileSystem + ?Sized,
{
    match meta.file_type {
        FileType::Dir => {
            // owner needs write access while children are copied in
            match dst.mkdir(dst_path, meta.mode | 0o700) {
                Ok(()) => {}
                Err(e) if e.is_exist() => {}
                Err(e) => return Err(e),
            }
            for entry in src.read_dir(src_path)? {
                let child_src = join(src_path, &entry.name);
                if skip(&child_src) {
                    continue;
                }
                let child_dst = join(dst_path, &entry.name);
                let child_meta = src.stat(&child_src)?;
                copy_entry(src, &child_src, &child_meta, dst, &child_dst, skip)?;
            }
            dst.chmod(dst_path, meta.mode)?;
            dst.chtimes(dst_path, meta.accessed, meta.modified)?;
        }
        FileType::File => {
            let mut reader = src.open(src_path, OpenFlags::READ, 0)?;
            let mut writer = dst.open(
                dst_path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                meta.mode,
            )?;
            io::copy(&mut reader, &mut writer)?;
            writer.sync()?;
            drop(writer);
            dst.chmod(dst_path, meta.mode)?;
            dst.chtimes(dst_path, meta.accessed, meta.modified)?;
        }
        FileType::Symlink => {
            let target = src.readlink(src_path)?;
            if exists(dst, dst_path)? {
                dst.remove(dst_path)?;
            }
            dst.symlink(&target, dst_path)?;
        }
    }
    Ok(())
}

/// Depth-first pre-order walk below (and including) `root`, children in name order.
pub fn walk<F, V>(fs: &F, root: &str, visit: &mut V) -> Result<()>
where
    F: FileSystem + ?Sized,
    V: FnMut(&str, &Metadata) -> Result<()>,
{
    let root = clean_path(root);
    let meta = fs.stat(&root)?;
    walk_inner(fs, &root, &meta, visit)
}

fn walk_inner<F, V>(fs: &F, path: &str, meta: &Metadata, visit: &mut V) -> Result<()>
where
    F: FileSystem + ?Sized,
    V: FnMut(&str, &Metadata) -> Result<()>,
{
    visit(path, meta)?;
    if meta.is_dir() {
        for entry in fs.read_dir(path)? {
            let child = join(path, &entry.name);
            let child_meta = fs.stat(&child)?;
            walk_inner(fs, &child, &child_meta, visit)?;
        }
    }
    Ok(())
}
