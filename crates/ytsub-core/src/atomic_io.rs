//! Shared atomic file write/read/append helpers (spec §4.1, §4.3, §4.4, §9
//! "File-locking portability").
//!
//! Every durable-state component (manifest store, chunk tracker, archive,
//! failure logger) writes through these three primitives so the retry
//! policy and temp-file cleanup only need to be right once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::error::CoreError;

const MAX_ATTEMPTS: u32 = 5;

/// `2^attempt * 10ms + (attempt+1) * 10ms`, exactly as specified in §4.1.
fn backoff_delay(attempt: u32) -> Duration {
    let pow = 2u64.saturating_pow(attempt).saturating_mul(10);
    let linear = (attempt as u64 + 1) * 10;
    Duration::from_millis(pow + linear)
}

/// True for the errno POSIX/Windows report when a file is held open by
/// another reader/writer (`ETXTBSY` on Unix has no exact analogue, so this
/// also treats `PermissionDenied` during a rename as a sharing violation,
/// matching the Windows `ERROR_SHARING_VIOLATION` behavior the spec calls
/// out).
fn is_sharing_violation(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::WouldBlock
    )
}

/// Serialize `value` to `path` via a uniquely named temp file in the same
/// directory, then atomically rename it onto `path`. Sharing-violation
/// failures are retried with backoff; anything else fails fast. The temp
/// file is removed in every exit path, including failure.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("manifest"),
        Uuid::new_v4()
    ));

    let write_result = tokio::fs::write(&tmp_path, contents).await;
    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    let mut attempt = 0u32;
    loop {
        match tokio::fs::rename(&tmp_path, path).await {
            Ok(()) => return Ok(()),
            Err(e) if is_sharing_violation(&e) && attempt < MAX_ATTEMPTS => {
                attempt += 1;
                warn!(path = %path.display(), attempt, "rename hit sharing violation, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
        }
    }
}

/// Read `path` with the same sharing-violation retry policy as
/// [`write_atomic`]. A missing file returns `Ok(None)`. A JSON-decode
/// failure is treated as fatal for the *caller's* deserialize step, not
/// here — this function only reads bytes.
pub async fn read_atomic(path: &Path) -> Result<Option<Vec<u8>>, CoreError> {
    let mut attempt = 0u32;
    loop {
        match tokio::fs::read(path).await {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if is_sharing_violation(&e) && attempt < MAX_ATTEMPTS => {
                attempt += 1;
                warn!(path = %path.display(), attempt, "read hit sharing violation, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Append one line to `path`, creating it if missing. Uses a short retry
/// loop on sharing violations rather than a true advisory lock (spec §4.3,
/// §9): each append is one `O_APPEND` write, which POSIX guarantees is
/// atomic for writes below `PIPE_BUF`/page size, so concurrent appenders
/// from different processes never interleave within a line.
pub async fn append_line_with_retry(path: &Path, line: &str) -> Result<(), CoreError> {
    use tokio::io::AsyncWriteExt;

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut attempt = 0u32;
    loop {
        let opened = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await;
        match opened {
            Ok(mut file) => {
                let mut buf = line.as_bytes().to_vec();
                if !buf.ends_with(b"\n") {
                    buf.push(b'\n');
                }
                file.write_all(&buf).await?;
                file.flush().await?;
                return Ok(());
            }
            Err(e) if is_sharing_violation(&e) && attempt < MAX_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Build the path a batch manifest or auxiliary state file lives at inside
/// a directory, without actually touching the filesystem.
pub fn join(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"{\"a\":1}").await.unwrap();
        let back = read_atomic(&path).await.unwrap().unwrap();
        assert_eq!(back, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn no_tmp_file_left_behind_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"{}").await.unwrap();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["file.json".to_string()]);
    }

    #[tokio::test]
    async fn read_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_atomic(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_creates_file_and_adds_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        append_line_with_retry(&path, "youtube abc123def45 # lang_hash=deadbeef00000000").await.unwrap();
        append_line_with_retry(&path, "youtube xyz987uvw65 # lang_hash=deadbeef00000000").await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn overwrite_replaces_prior_contents_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.json");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        let back = read_atomic(&path).await.unwrap().unwrap();
        assert_eq!(back, b"second");
    }
}
