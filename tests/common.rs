use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cowfs::vfs::{mkdir_all, write_file};
use cowfs::{CowFs, LocalFs, MemFs};
use tempfile::TempDir;

/// Get the path to the cowfs binary for testing.
#[allow(dead_code)]
pub fn get_cowfs_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("cowfs").to_path_buf()
}

#[allow(dead_code)]
pub type MemCowFs = CowFs<Arc<MemFs>, Arc<MemFs>>;

/// The base tree every test starts from:
///
/// ```text
/// file1.txt            "base content 1"
/// file2.txt            "base content 2"
/// dir1/file3.txt       "base content 3"
/// dir1/dir2/file4.txt  "base content 4"
/// ```
#[allow(dead_code)]
pub fn base_fixture() -> Arc<MemFs> {
    let base = Arc::new(MemFs::new());
    mkdir_all(&*base, "dir1/dir2", 0o755).expect("Failed to create base dirs");
    write_file(&*base, "file1.txt", b"base content 1", 0o644).expect("Failed to write file1");
    write_file(&*base, "file2.txt", b"base content 2", 0o644).expect("Failed to write file2");
    write_file(&*base, "dir1/file3.txt", b"base content 3", 0o644)
        .expect("Failed to write file3");
    write_file(&*base, "dir1/dir2/file4.txt", b"base content 4", 0o644)
        .expect("Failed to write file4");
    base
}

/// In-memory composite over [`base_fixture`] with an empty overlay.
#[allow(dead_code)]
pub fn mem_composite() -> (Arc<MemFs>, Arc<MemFs>, MemCowFs) {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());
    let fs = CowFs::new(base.clone(), overlay.clone());
    (base, overlay, fs)
}

/// Host directories for a `LocalFs` composite, both under one temp dir that
/// is removed on drop.
#[allow(dead_code)]
pub struct HostLayers {
    pub temp_dir: TempDir,
    pub base_dir: PathBuf,
    pub overlay_dir: PathBuf,
}

impl Default for HostLayers {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl HostLayers {
    /// Lay out the [`base_fixture`] tree on disk next to an empty overlay.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().join("base");
        let overlay_dir = temp_dir.path().join("overlay");

        fs::create_dir_all(base_dir.join("dir1/dir2")).expect("Failed to create base dirs");
        fs::create_dir_all(&overlay_dir).expect("Failed to create overlay dir");
        write_host(&base_dir, "file1.txt", "base content 1");
        write_host(&base_dir, "file2.txt", "base content 2");
        write_host(&base_dir, "dir1/file3.txt", "base content 3");
        write_host(&base_dir, "dir1/dir2/file4.txt", "base content 4");

        HostLayers {
            temp_dir,
            base_dir,
            overlay_dir,
        }
    }

    pub fn composite(&self) -> CowFs<LocalFs, LocalFs> {
        let base = LocalFs::new(self.base_dir.clone()).expect("Failed to open base");
        let overlay = LocalFs::new(self.overlay_dir.clone()).expect("Failed to open overlay");
        CowFs::new(base, overlay)
    }
}

#[allow(dead_code)]
pub fn write_host(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

#[allow(dead_code)]
pub fn names(entries: Vec<cowfs::DirEntry>) -> Vec<String> {
    entries.into_iter().map(|e| e.name).collect()
}
