//! Directory synchronization between host and environment.
//!
//! Trees are moved as an uncompressed tar stream between two cooperating
//! processes: an archive producer rooted at the source and an extracting
//! consumer rooted at the destination, wired stdout-to-stdin through an OS
//! pipe. Memory use is bounded by the pipe buffer regardless of transfer
//! size. Single files skip the archive framing and go through a direct
//! streamed copy.

use crate::executor::{ExecOptions, Executor};
use crate::ExecError;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

fn shell_quote(s: &str) -> String {
    // Single-quoting in POSIX shell: replace ' with '\'' then wrap in '
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Reap the archive producer after the consumer has finished. The
/// consumer's status is the sync result; a producer failure is surfaced as
/// a warning only (see the module docs on the deliberate asymmetry).
fn reap_producer(producer: &mut Child, side: &str) {
    match producer.wait() {
        Ok(status) if !status.success() => warn!(
            "{side} tar producer exited with status {}",
            status.code().unwrap_or(-1)
        ),
        Ok(_) => {}
        Err(err) => warn!("failed to reap {side} tar producer: {err}"),
    }
}

/// Copy a host file or directory into the environment.
///
/// Fails with [`ExecError::SourceNotFound`] before any remote mutation when
/// the host source does not exist.
pub fn sync_to<E>(
    executor: &E,
    source: &Path,
    destination: &Path,
    delete_existing: bool,
) -> Result<(), ExecError>
where
    E: Executor + ?Sized,
{
    if source.is_file() {
        return file_to_remote(executor, source, destination);
    }
    if !source.is_dir() {
        return Err(ExecError::SourceNotFound(source.to_path_buf()));
    }

    debug!(
        "syncing host:{} -> env:{}",
        source.display(),
        destination.display()
    );
    let dest = destination.to_string_lossy().into_owned();

    if delete_existing {
        // Failure to remove is fatal, not retried.
        executor.execute(
            &["rm".to_owned(), "-rf".to_owned(), dest.clone()],
            &ExecOptions::checked_captured(),
        )?;
    }
    executor.execute(
        &["mkdir".to_owned(), "-p".to_owned(), dest.clone()],
        &ExecOptions::checked_captured(),
    )?;

    let mut producer = Command::new("tar")
        .args(["cpf", "-", "-C"])
        .arg(source)
        .arg(".")
        .stdout(Stdio::piped())
        .spawn()?;
    let producer_out = producer
        .stdout
        .take()
        .ok_or_else(|| ExecError::Transfer("tar producer has no stdout".to_owned()))?;

    // The producer's stdout fd is handed to the consumer and dropped here,
    // so the producer receives EPIPE if the consumer exits early instead of
    // blocking forever.
    let mut consumer = executor.execute_streaming(
        &[
            "tar".to_owned(),
            "xpf".to_owned(),
            "-".to_owned(),
            "-C".to_owned(),
            dest,
        ],
        &BTreeMap::new(),
        Stdio::from(producer_out),
        Stdio::inherit(),
    )?;

    let status = consumer.wait()?;
    reap_producer(&mut producer, "host");
    if !status.success() {
        return Err(ExecError::Transfer(format!(
            "tar extract in environment exited with status {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

/// Copy an environment file or directory onto the host.
///
/// Remote source existence is probed before any host mutation.
pub fn sync_from<E>(
    executor: &E,
    source: &Path,
    destination: &Path,
    delete_existing: bool,
) -> Result<(), ExecError>
where
    E: Executor + ?Sized,
{
    if executor.path_is_file(source)? {
        return file_from_remote(executor, source, destination);
    }
    if !executor.path_is_directory(source)? {
        return Err(ExecError::SourceNotFound(source.to_path_buf()));
    }

    debug!(
        "syncing env:{} -> host:{}",
        source.display(),
        destination.display()
    );

    if delete_existing && destination.exists() {
        std::fs::remove_dir_all(destination)?;
    }
    std::fs::create_dir_all(destination)?;

    let mut producer = executor.execute_streaming(
        &[
            "tar".to_owned(),
            "cpf".to_owned(),
            "-".to_owned(),
            "-C".to_owned(),
            source.to_string_lossy().into_owned(),
            ".".to_owned(),
        ],
        &BTreeMap::new(),
        Stdio::null(),
        Stdio::piped(),
    )?;
    let producer_out = producer
        .stdout
        .take()
        .ok_or_else(|| ExecError::Transfer("environment tar producer has no stdout".to_owned()))?;

    let status = Command::new("tar")
        .args(["xpf", "-", "-C"])
        .arg(destination)
        .stdin(Stdio::from(producer_out))
        .status()?;
    reap_producer(&mut producer, "environment");
    if !status.success() {
        return Err(ExecError::Transfer(format!(
            "tar extract on host exited with status {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

fn file_to_remote<E>(executor: &E, source: &Path, destination: &Path) -> Result<(), ExecError>
where
    E: Executor + ?Sized,
{
    if let Some(parent) = destination.parent() {
        executor.execute(
            &[
                "mkdir".to_owned(),
                "-p".to_owned(),
                parent.to_string_lossy().into_owned(),
            ],
            &ExecOptions::checked_captured(),
        )?;
    }

    let file = File::open(source)?;
    let mut consumer = executor.execute_streaming(
        &[
            "sh".to_owned(),
            "-c".to_owned(),
            format!("cat > {}", shell_quote(&destination.to_string_lossy())),
        ],
        &BTreeMap::new(),
        Stdio::from(file),
        Stdio::inherit(),
    )?;

    let status = consumer.wait()?;
    if !status.success() {
        return Err(ExecError::Transfer(format!(
            "writing {} in environment exited with status {}",
            destination.display(),
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

fn file_from_remote<E>(executor: &E, source: &Path, destination: &Path) -> Result<(), ExecError>
where
    E: Executor + ?Sized,
{
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut producer = executor.execute_streaming(
        &[
            "cat".to_owned(),
            source.to_string_lossy().into_owned(),
        ],
        &BTreeMap::new(),
        Stdio::null(),
        Stdio::piped(),
    )?;
    let mut producer_out = producer
        .stdout
        .take()
        .ok_or_else(|| ExecError::Transfer("environment cat has no stdout".to_owned()))?;

    let mut file = File::create(destination)?;
    io::copy(&mut producer_out, &mut file)?;
    drop(producer_out);

    let status = producer.wait()?;
    if !status.success() {
        return Err(ExecError::Transfer(format!(
            "reading {} from environment exited with status {}",
            source.display(),
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeExecutor;

    #[test]
    fn sync_to_missing_source_fails_before_remote_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExecutor::new();

        let err = sync_to(
            &fake,
            &dir.path().join("does-not-exist"),
            Path::new("/root/project"),
            true,
        )
        .unwrap_err();

        assert!(matches!(err, ExecError::SourceNotFound(_)));
        assert!(fake.calls().is_empty(), "no remote command may run");
    }

    #[test]
    fn sync_from_missing_source_leaves_host_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        let fake = FakeExecutor::new();

        let err = sync_from(&fake, Path::new("/root/missing"), &destination, true).unwrap_err();

        assert!(matches!(err, ExecError::SourceNotFound(_)));
        assert!(!destination.exists());
        // Only the existence probes may have run.
        for call in fake.calls() {
            assert_eq!(call[0], "test");
        }
    }

    #[test]
    fn sync_to_deletes_then_recreates_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let fake = FakeExecutor::new();

        sync_to(&fake, dir.path(), Path::new("/root/project"), true).unwrap();

        let calls = fake.calls();
        assert_eq!(calls[0], ["rm", "-rf", "/root/project"]);
        assert_eq!(calls[1], ["mkdir", "-p", "/root/project"]);
        assert_eq!(calls[2][0], "tar");
        assert_eq!(calls[2][1], "xpf");
    }

    #[test]
    fn sync_to_keeps_destination_without_delete_flag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let fake = FakeExecutor::new();

        sync_to(&fake, dir.path(), Path::new("/root/project"), false).unwrap();

        assert!(fake.calls().iter().all(|c| c[0] != "rm"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
