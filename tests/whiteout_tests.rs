mod common;

use std::sync::Arc;

use common::{base_fixture, names};
use cowfs::overlay::whiteout::entry_name;
use cowfs::vfs::{mkdir_all, read_file, write_file};
use cowfs::{CowConfig, CowFs, FileSystem, MemFs};

fn resolved(fs: &common::MemCowFs, path: &str) -> Result<String, String> {
    fs.resolve_path(path).map_err(|e| e.to_string())
}

#[test]
fn test_whiteout_round_trip_across_remount() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());

    let first = CowFs::new(base.clone(), overlay.clone());
    first.whiteout(".wh").unwrap();
    first.remove("file1.txt").unwrap();
    first.rename("file2.txt", "file2.renamed.txt").unwrap();

    let second = CowFs::new(base.clone(), overlay.clone());
    second.whiteout(".wh").unwrap();

    assert_eq!(second.deleted(), first.deleted());
    assert_eq!(second.renames(), first.renames());
    for path in ["file1.txt", "file2.txt"] {
        assert_eq!(resolved(&second, path), resolved(&first, path));
        assert_eq!(second.tombstoned(path), first.tombstoned(path));
    }
    assert!(second.stat("file1.txt").unwrap_err().is_not_exist());
    assert_eq!(read_file(&second, "file2.txt").unwrap(), b"base content 2");
}

#[test]
fn test_entries_written_before_enabling_are_persisted() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());

    let first = CowFs::new(base.clone(), overlay.clone());
    first.remove("dir1/file3.txt").unwrap();
    first.whiteout("state/.wh").unwrap();

    let raw = read_file(
        &*overlay,
        &format!("state/.wh/deletes/{}", entry_name("dir1/file3.txt")),
    )
    .unwrap();
    assert_eq!(raw, b"dir1/file3.txt");

    let second = CowFs::new(base, overlay);
    second.whiteout("state/.wh").unwrap();
    assert!(second.tombstoned("dir1/file3.txt"));
}

#[test]
fn test_persisted_chain_is_collapsed() {
    let overlay = Arc::new(MemFs::new());
    let fs = CowFs::new(base_fixture(), overlay.clone());
    fs.whiteout(".wh").unwrap();
    fs.rename("file1.txt", "b.txt").unwrap();
    fs.rename("b.txt", "c.txt").unwrap();

    let entries = overlay.read_dir(".wh/renames").unwrap();
    assert_eq!(entries.len(), 1);
    let content = read_file(&*overlay, &format!(".wh/renames/{}", entries[0].name)).unwrap();
    assert_eq!(content, b"file1.txt c.txt");
}

#[test]
fn test_revived_paths_leave_the_log() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());

    let first = CowFs::new(base.clone(), overlay.clone());
    first.whiteout(".wh").unwrap();
    first.remove("file1.txt").unwrap();
    first.create("file1.txt").unwrap();
    first.rename("file2.txt", "tmp.txt").unwrap();
    first.rename("tmp.txt", "file2.txt").unwrap();

    assert!(overlay.read_dir(".wh/deletes").unwrap().is_empty());
    assert!(overlay.read_dir(".wh/renames").unwrap().is_empty());

    let second = CowFs::new(base, overlay);
    second.whiteout(".wh").unwrap();
    assert!(second.deleted().is_empty());
}

#[test]
fn test_moved_in_children_survive_remount() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());

    let first = CowFs::new(base.clone(), overlay.clone());
    first.whiteout(".wh").unwrap();
    first.remove("dir1/file3.txt").unwrap();
    first.remove("dir1/dir2/file4.txt").unwrap();
    first.remove("dir1/dir2").unwrap();
    first.mkdir("tmp", 0o755).unwrap();
    write_file(&first, "tmp/file3.txt", b"moved in", 0o644).unwrap();
    first.rename("tmp", "dir1").unwrap();

    assert!(overlay
        .stat(&format!(".wh/deletes/{}", entry_name("dir1/file3.txt")))
        .unwrap_err()
        .is_not_exist());

    let second = CowFs::new(base, overlay);
    second.whiteout(".wh").unwrap();
    assert_eq!(second.deleted(), vec!["dir1/dir2", "dir1/dir2/file4.txt"]);
    assert_eq!(read_file(&second, "dir1/file3.txt").unwrap(), b"moved in");
    assert_eq!(names(second.read_dir("dir1").unwrap()), vec!["file3.txt"]);
}

#[test]
fn test_load_merges_with_existing_state() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());
    mkdir_all(&*overlay, ".wh/deletes", 0o755).unwrap();
    write_file(
        &*overlay,
        &format!(".wh/deletes/{}", entry_name("file2.txt")),
        b"file2.txt\n",
        0o644,
    )
    .unwrap();

    let fs = CowFs::new(base, overlay);
    fs.remove("file1.txt").unwrap();
    fs.whiteout(".wh").unwrap();

    assert_eq!(fs.deleted(), vec!["file1.txt", "file2.txt"]);
    assert_eq!(names(fs.read_dir(".").unwrap()), vec![".wh", "dir1"]);
}

#[test]
fn test_cycle_loaded_from_log_is_invalid() {
    let overlay = Arc::new(MemFs::new());
    mkdir_all(&*overlay, ".wh/renames", 0o755).unwrap();
    for (from, to) in [("x", "y"), ("y", "z"), ("z", "x")] {
        write_file(
            &*overlay,
            &format!(".wh/renames/{}", entry_name(from)),
            format!("{} {}", from, to).as_bytes(),
            0o644,
        )
        .unwrap();
    }

    let fs = CowFs::new(base_fixture(), overlay);
    fs.whiteout(".wh").unwrap();

    assert!(fs.resolve_path("x").unwrap_err().is_invalid());
    assert!(fs.stat("x").unwrap_err().is_invalid());
    assert!(fs.open("y").unwrap_err().is_invalid());
    assert!(fs.remove("z").unwrap_err().is_invalid());
    assert!(fs.rename("x", "elsewhere").unwrap_err().is_invalid());
    assert!(fs.chmod("y", 0o600).unwrap_err().is_invalid());
    // unrelated paths are unaffected
    assert_eq!(fs.resolve_path("file1.txt").unwrap(), "file1.txt");
}

#[test]
fn test_with_config_attaches_to_existing_log() {
    let base = base_fixture();
    let overlay = Arc::new(MemFs::new());
    let config = CowConfig {
        whiteout_dir: Some(".cow".to_string()),
        ..Default::default()
    };

    let first = CowFs::with_config(base.clone(), overlay.clone(), &config).unwrap();
    first.rename("dir1", "moved").unwrap();

    let second = CowFs::with_config(base, overlay, &config).unwrap();
    assert_eq!(second.whiteout_dir().as_deref(), Some(".cow"));
    assert_eq!(second.resolve_path("dir1").unwrap(), "moved");
    assert_eq!(
        read_file(&second, "moved/dir2/file4.txt").unwrap(),
        b"base content 4"
    );
}
