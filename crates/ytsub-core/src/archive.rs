//! Incremental archive: append-only record of `{video_id, config_hash}`
//! pairs already processed, plus legacy-file migration (spec §4.3).

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::info;
use ytsub_models::ArchiveEntry;

use crate::atomic_io;
use crate::error::CoreResult;

/// Picks the archive file a given source should be recorded under (spec
/// §4.3 "Archive routing"). Single videos are not incremental and have no
/// archive file at all — callers should skip archive filtering for them.
pub enum ArchiveSource {
    Channel { channel_id: String },
    Playlist { playlist_id: String },
    Urls { batch_id: String },
}

impl ArchiveSource {
    pub fn archive_file_name(&self) -> Option<String> {
        match self {
            ArchiveSource::Channel { channel_id } => Some(format!("{channel_id}.txt")),
            ArchiveSource::Playlist { playlist_id } => Some(format!("playlist_{playlist_id}.txt")),
            ArchiveSource::Urls { batch_id } => Some(format!("batch_{batch_id}.txt")),
        }
    }
}

/// Returns the subset of `video_ids` not yet processed under `config_hash`,
/// per `archive_path`. `force=true` or a missing archive short-circuits to
/// "everything is unprocessed".
pub async fn filter_unprocessed(
    video_ids: &[String],
    archive_path: &Path,
    force: bool,
    config_hash: &str,
) -> CoreResult<Vec<String>> {
    if force {
        return Ok(video_ids.to_vec());
    }
    let Some(bytes) = atomic_io::read_atomic(archive_path).await? else {
        return Ok(video_ids.to_vec());
    };
    let text = String::from_utf8_lossy(&bytes);
    let entries: Vec<ArchiveEntry> = text.lines().filter_map(ArchiveEntry::parse_line).collect();

    Ok(video_ids
        .iter()
        .filter(|id| !entries.iter().any(|e| e.matches(id, config_hash)))
        .cloned()
        .collect())
}

/// Atomically append one processed-video line. Multiple appends for the
/// same `(video_id, config_hash)` are tolerated — `filter_unprocessed`
/// only needs one matching line to exist, so duplicates are harmless and
/// left for `migrate_legacy`'s dedup pass to clean up.
pub async fn mark_as_processed(video_id: &str, archive_path: &Path, config_hash: &str) -> CoreResult<()> {
    let entry = ArchiveEntry::new(video_id, config_hash);
    atomic_io::append_line_with_retry(archive_path, entry.to_line().trim_end()).await
}

/// One-time migration of legacy archive files into `migrated_archive.txt`
/// under `data_dir`, deduplicated and sorted, with `.bak` backups left
/// behind at the legacy paths (spec §4.3 "Migration"). Safe to call on
/// every startup: once the legacy files are gone, this is a no-op.
pub async fn migrate_legacy(data_dir: &Path) -> CoreResult<Option<PathBuf>> {
    let legacy_paths = [data_dir.join("out").join("archive.txt"), data_dir.join("archive.txt")];

    let mut lines: BTreeSet<String> = BTreeSet::new();
    let mut found_any = false;

    for legacy in &legacy_paths {
        if let Some(bytes) = atomic_io::read_atomic(legacy).await? {
            found_any = true;
            let text = String::from_utf8_lossy(&bytes);
            for line in text.lines() {
                if let Some(entry) = ArchiveEntry::parse_line(line) {
                    lines.insert(entry.to_line());
                }
            }
        }
    }

    if !found_any {
        return Ok(None);
    }

    let migrated_path = data_dir.join("migrated_archive.txt");
    let mut merged = String::new();
    if let Some(existing) = atomic_io::read_atomic(&migrated_path).await? {
        let text = String::from_utf8_lossy(&existing);
        for line in text.lines() {
            if let Some(entry) = ArchiveEntry::parse_line(line) {
                lines.insert(entry.to_line());
            }
        }
    }
    for line in &lines {
        merged.push_str(line);
    }
    atomic_io::write_atomic(&migrated_path, merged.as_bytes()).await?;

    for legacy in &legacy_paths {
        if tokio::fs::metadata(legacy).await.is_ok() {
            let backup = legacy.with_extension("txt.bak");
            tokio::fs::rename(legacy, &backup).await?;
            info!(from = %legacy.display(), to = %backup.display(), "migrated legacy archive");
        }
    }

    Ok(Some(migrated_path))
}

/// Reads distinct video ids that appear anywhere in the archive, ignoring
/// hash matching — used only for reporting/dedup, never for
/// `filter_unprocessed` decisions.
pub async fn known_video_ids(archive_path: &Path) -> CoreResult<HashSet<String>> {
    let Some(bytes) = atomic_io::read_atomic(archive_path).await? else {
        return Ok(HashSet::new());
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.lines().filter_map(ArchiveEntry::parse_line).map(|e| e.video_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_archive_means_everything_unprocessed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        let result = filter_unprocessed(&["abc123def45".to_string()], &path, false, "hash1").await.unwrap();
        assert_eq!(result, vec!["abc123def45".to_string()]);
    }

    #[tokio::test]
    async fn force_bypasses_archive_entirely() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        mark_as_processed("abc123def45", &path, "hash1").await.unwrap();
        let result = filter_unprocessed(&["abc123def45".to_string()], &path, true, "hash1").await.unwrap();
        assert_eq!(result, vec!["abc123def45".to_string()]);
    }

    #[tokio::test]
    async fn processed_with_matching_hash_is_excluded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        mark_as_processed("abc123def45", &path, "hash1").await.unwrap();
        let result = filter_unprocessed(&["abc123def45".to_string()], &path, false, "hash1").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn hash_mismatch_keeps_video_unprocessed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        mark_as_processed("abc123def45", &path, "hash1").await.unwrap();
        let result = filter_unprocessed(&["abc123def45".to_string()], &path, false, "hash2").await.unwrap();
        assert_eq!(result, vec!["abc123def45".to_string()]);
    }

    #[tokio::test]
    async fn mark_as_processed_twice_is_idempotent_after_dedup_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.txt");
        mark_as_processed("abc123def45", &path, "hash1").await.unwrap();
        mark_as_processed("abc123def45", &path, "hash1").await.unwrap();
        let ids = known_video_ids(&path).await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn migrate_legacy_merges_dedupes_and_backs_up() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("archive.txt"), "youtube abc123def45\nyoutube abc123def45\n").await.unwrap();

        let migrated = migrate_legacy(dir.path()).await.unwrap().unwrap();
        let contents = tokio::fs::read_to_string(&migrated).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(dir.path().join("archive.txt.bak").exists());
        assert!(!dir.path().join("archive.txt").exists());
    }

    #[tokio::test]
    async fn migrate_legacy_is_idempotent() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("archive.txt"), "youtube abc123def45\n").await.unwrap();
        migrate_legacy(dir.path()).await.unwrap();
        let second = migrate_legacy(dir.path()).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn archive_routing_file_names() {
        assert_eq!(
            ArchiveSource::Channel { channel_id: "UC123".to_string() }.archive_file_name(),
            Some("UC123.txt".to_string())
        );
        assert_eq!(
            ArchiveSource::Playlist { playlist_id: "PLxyz".to_string() }.archive_file_name(),
            Some("playlist_PLxyz.txt".to_string())
        );
        assert_eq!(
            ArchiveSource::Urls { batch_id: "20260101_000000".to_string() }.archive_file_name(),
            Some("batch_20260101_000000.txt".to_string())
        );
    }
}
