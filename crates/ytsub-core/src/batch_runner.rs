//! Batch runner (spec §2 Component L): resolves URLs to videos, filters
//! them through the incremental archive, builds the batch manifest, and
//! drives the result through the [`crate::scheduler::PipelineScheduler`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use ytsub_models::{BatchManifest, VideoInfo, VideoManifest};

use crate::adapters::UrlResolver;
use crate::archive::{self, ArchiveSource};
use crate::error::CoreResult;
use crate::manifest::{ManifestStore, SharedManifest};
use crate::scheduler::{BatchStats, PipelineScheduler};

/// Everything `BatchRunner::run` needs to resolve and filter a batch:
/// where to resolve from, which archive to consult, and whether to skip
/// the archive filter (`--force`).
pub struct BatchRequest {
    pub source: ArchiveSource,
    pub urls: Vec<String>,
    pub force: bool,
}

/// Outcome of one archive-filtered, manifest-backed run (spec §6.5
/// "`--dry-run`" runs DETECT only and never reaches here with a full
/// scheduler; this struct is for a real `--run` invocation).
pub struct BatchRunResult {
    pub batch_id: String,
    pub stats: BatchStats,
    pub skipped_by_archive: usize,
}

/// Ties together URL resolution, archive filtering, and manifest
/// construction (spec §2 "data flow": `URLs → resolve → filter via
/// archive → scheduler.enqueue(DETECT)`).
pub struct BatchRunner {
    resolver: Arc<dyn UrlResolver>,
    manifest_store_dir: PathBuf,
    archives_dir: PathBuf,
    config_hash: String,
}

impl BatchRunner {
    pub fn new(
        resolver: Arc<dyn UrlResolver>,
        manifest_store_dir: impl Into<PathBuf>,
        archives_dir: impl Into<PathBuf>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            manifest_store_dir: manifest_store_dir.into(),
            archives_dir: archives_dir.into(),
            config_hash: config_hash.into(),
        }
    }

    /// Resolves every URL in `request`, filters out videos the archive
    /// already has recorded under the current config hash (unless
    /// `force`), builds and persists a fresh `BatchManifest` for the
    /// remainder, then calls `build_scheduler` with that batch's
    /// `SharedManifest` (so the stage processors it wires are bound to the
    /// same manifest instance this method persists) and runs it.
    pub async fn run(
        &self,
        request: BatchRequest,
        batch_id: String,
        build_scheduler: impl FnOnce(SharedManifest) -> PipelineScheduler,
    ) -> CoreResult<BatchRunResult> {
        let mut resolved: Vec<VideoInfo> = Vec::new();
        for url in &request.urls {
            let videos = self.resolver.resolve(url).await?;
            resolved.extend(videos);
        }

        let requested_total = resolved.len();
        let ids: Vec<String> = resolved.iter().map(|v| v.video_id.clone()).collect();

        let to_process_ids = match request.source.archive_file_name() {
            Some(archive_file) => {
                let archive_path = self.archives_dir.join(archive_file);
                archive::filter_unprocessed(&ids, &archive_path, request.force, &self.config_hash).await?
            }
            None => ids,
        };
        let skipped_by_archive = requested_total - to_process_ids.len();
        if skipped_by_archive > 0 {
            info!(skipped_by_archive, "videos already processed under current config, skipping");
        }

        let videos: Vec<VideoInfo> =
            resolved.into_iter().filter(|v| to_process_ids.contains(&v.video_id)).collect();

        let source_label = match &request.source {
            ArchiveSource::Channel { channel_id } => channel_id.clone(),
            ArchiveSource::Playlist { playlist_id } => playlist_id.clone(),
            ArchiveSource::Urls { batch_id } => batch_id.clone(),
        };

        let mut batch_manifest = BatchManifest::new(batch_id.clone(), source_label);
        for video in &videos {
            batch_manifest.insert_video(VideoManifest::new(
                video.video_id.clone(),
                video.url.clone(),
                video.title.clone(),
            ));
        }

        let store = ManifestStore::new(&self.manifest_store_dir, true);
        store.save_batch(&batch_manifest, true).await?;
        let shared = SharedManifest::new(store, batch_manifest);

        let scheduler = build_scheduler(shared.clone());
        let stats = scheduler.process_videos(videos, &batch_id).await?;
        shared.flush().await?;

        Ok(BatchRunResult { batch_id, stats, skipped_by_archive })
    }
}

/// Removes stale partial-write artifacts (`*.tmp`, `*.part`,
/// `*.progress.json.tmp`) left behind by a prior crash, before scheduling
/// a new run (spec §4.9 "resume hygiene").
pub async fn sweep_stale_partials(output_dir: &Path) -> CoreResult<usize> {
    let mut removed = 0usize;
    let mut stack = vec![output_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".tmp") || name.ends_with(".part") || name.ends_with(".progress.json.tmp") {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to remove stale partial file");
                } else {
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;
    use ytsub_models::UrlKind;

    struct FakeResolver;

    #[async_trait]
    impl UrlResolver for FakeResolver {
        fn identify(&self, url: &str) -> UrlKind {
            UrlKind::Video { video_id: url.to_string() }
        }

        async fn resolve(&self, url: &str) -> CoreResult<Vec<VideoInfo>> {
            Ok(vec![VideoInfo::new(url, format!("https://youtu.be/{url}"), "title")])
        }

        fn extract_video_id(&self, url: &str) -> Option<String> {
            Some(url.to_string())
        }
    }

    #[tokio::test]
    async fn sweep_removes_stale_partials_recursively() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("videos").join("abc123def45");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("original.srt.tmp"), b"x").await.unwrap();
        tokio::fs::write(nested.join("keep.srt"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("download.part"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("batch.progress.json.tmp"), b"x").await.unwrap();

        let removed = sweep_stale_partials(dir.path()).await.unwrap();
        assert_eq!(removed, 3);
        assert!(nested.join("keep.srt").exists());
        assert!(!nested.join("original.srt.tmp").exists());
    }

    #[tokio::test]
    async fn sweep_on_missing_dir_is_noop() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let removed = sweep_stale_partials(&missing).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn archive_filters_out_already_processed_videos() {
        let dir = tempdir().unwrap();
        let archives_dir = dir.path().join("archives");
        tokio::fs::create_dir_all(&archives_dir).await.unwrap();
        let manifests_dir = dir.path().join("output").join(".state");

        let config_hash = "deadbeef00000000";
        let archive_path = archives_dir.join("batch_b1.txt");
        archive::mark_as_processed("alreadydone1", &archive_path, config_hash).await.unwrap();

        let runner = BatchRunner::new(Arc::new(FakeResolver), manifests_dir, archives_dir, config_hash);
        let request = BatchRequest {
            source: ArchiveSource::Urls { batch_id: "b1".to_string() },
            urls: vec!["alreadydone1".to_string(), "freshvideo1".to_string()],
            force: false,
        };

        // No scheduler wiring needed to test the archive-filter math in
        // isolation: inline what `run` does up to video resolution.
        let mut resolved = Vec::new();
        for url in &request.urls {
            resolved.extend(runner.resolver.resolve(url).await.unwrap());
        }
        let ids: Vec<String> = resolved.iter().map(|v| v.video_id.clone()).collect();
        let archive_path = runner.archives_dir.join(request.source.archive_file_name().unwrap());
        let remaining = archive::filter_unprocessed(&ids, &archive_path, request.force, &runner.config_hash).await.unwrap();

        assert_eq!(remaining, vec!["freshvideo1".to_string()]);
    }
}
