//! Real tar-pipe round-trips through the host executor.

use craftbox_backend::HostExecutor;
use craftbox_exec::{ExecError, Executor};
use std::fs;
use std::path::Path;

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn round_trip_preserves_nested_file() {
    let host = HostExecutor::new();
    let src = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let back = tempfile::tempdir().unwrap();

    write(&src.path().join("deep/nested/file.bin"), b"\x00\x01craft\xff");

    let copy = staging.path().join("copy");
    host.sync_to(src.path(), &copy, true).unwrap();
    let returned = back.path().join("returned");
    host.sync_from(&copy, &returned, true).unwrap();

    assert_eq!(
        fs::read(returned.join("deep/nested/file.bin")).unwrap(),
        b"\x00\x01craft\xff"
    );
}

#[test]
fn round_trip_preserves_multi_file_tree() {
    let host = HostExecutor::new();
    let src = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let back = tempfile::tempdir().unwrap();

    write(&src.path().join("a.txt"), b"alpha");
    write(&src.path().join("sub/b.txt"), b"beta");
    write(&src.path().join("sub/deeper/c.txt"), b"gamma");

    let copy = staging.path().join("tree");
    host.sync_to(src.path(), &copy, true).unwrap();
    let returned = back.path().join("tree");
    host.sync_from(&copy, &returned, true).unwrap();

    assert_eq!(fs::read(returned.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(returned.join("sub/b.txt")).unwrap(), b"beta");
    assert_eq!(fs::read(returned.join("sub/deeper/c.txt")).unwrap(), b"gamma");
}

#[test]
fn delete_existing_replaces_stale_destination() {
    let host = HostExecutor::new();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    write(&src.path().join("fresh.txt"), b"fresh");
    let copy = dst.path().join("out");
    write(&copy.join("stale.txt"), b"stale");

    host.sync_to(src.path(), &copy, true).unwrap();

    assert!(!copy.join("stale.txt").exists());
    assert_eq!(fs::read(copy.join("fresh.txt")).unwrap(), b"fresh");
}

#[test]
fn single_file_sync_creates_parent() {
    let host = HostExecutor::new();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let file = src.path().join("settings.yaml");
    write(&file, b"compatibility_tag: test\n");
    let destination = dst.path().join("etc/deep/settings.yaml");

    host.sync_to(&file, &destination, false).unwrap();

    assert_eq!(fs::read(destination).unwrap(), b"compatibility_tag: test\n");
}

#[test]
fn missing_source_fails_before_touching_destination() {
    let host = HostExecutor::new();
    let dst = tempfile::tempdir().unwrap();
    let destination = dst.path().join("never-created");

    let err = host
        .sync_to(Path::new("/nonexistent/craftbox-src"), &destination, true)
        .unwrap_err();

    assert!(matches!(err, ExecError::SourceNotFound(_)));
    assert!(!destination.exists());
}
