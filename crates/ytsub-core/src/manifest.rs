//! Manifest store: atomic read/write of batch/video checkpoint state
//! (spec §4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ytsub_models::{BatchManifest, ErrorType, VideoManifest, VideoStage};

use crate::error::{CoreError, CoreResult};
use crate::{atomic_io, state_dir};

const AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(5);

fn manifest_path(dir: &Path, batch_id: &str) -> PathBuf {
    state_dir(dir).join(format!("{batch_id}.manifest.json"))
}

struct Inner {
    output_dir: PathBuf,
    /// Single mutex guarding both the dirty set and the IO it triggers
    /// (spec §4.1 "Concurrency").
    dirty: Mutex<HashMap<String, BatchManifest>>,
}

/// Atomic, dirty-flag-batched persistence for [`BatchManifest`]s. One store
/// is shared (via `Arc`/`Clone`) by every stage worker in a batch run;
/// callers are responsible for the single-writer-per-video invariant (§5) —
/// the store itself only serializes the IO, not the manifest mutation.
#[derive(Clone)]
pub struct ManifestStore {
    inner: Arc<Inner>,
    auto_save: bool,
    timer_shutdown: Option<watch::Sender<bool>>,
}

impl ManifestStore {
    /// `output_dir` is the batch's persistent output tree root; manifests
    /// live under `<output_dir>/.state/` (spec §6.6).
    pub fn new(output_dir: impl Into<PathBuf>, auto_save: bool) -> Self {
        let inner = Arc::new(Inner { output_dir: output_dir.into(), dirty: Mutex::new(HashMap::new()) });

        let timer_shutdown = if auto_save {
            let (tx, mut rx) = watch::channel(false);
            let timer_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(AUTO_SAVE_INTERVAL);
                interval.tick().await; // first tick fires immediately; skip it
                loop {
                    tokio::select! {
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            flush_dirty(&timer_inner).await;
                        }
                    }
                }
            });
            Some(tx)
        } else {
            None
        };

        Self { inner, auto_save, timer_shutdown }
    }

    pub fn create_batch(&self, batch_id: impl Into<String>, source: impl Into<String>) -> BatchManifest {
        BatchManifest::new(batch_id, source)
    }

    pub async fn load_batch(&self, batch_id: &str) -> CoreResult<Option<BatchManifest>> {
        let path = manifest_path(&self.inner.output_dir, batch_id);
        let Some(bytes) = atomic_io::read_atomic(&path).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<BatchManifest>(&bytes) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!(batch_id, error = %e, "manifest JSON decode failed, treating as absent");
                Ok(None)
            }
        }
    }

    /// `immediate=true` bypasses dirty-flag batching and writes synchronously.
    /// `immediate=false` marks the manifest dirty; the background timer (or
    /// `flush`/`shutdown`) performs the actual write.
    pub async fn save_batch(&self, manifest: &BatchManifest, immediate: bool) -> CoreResult<()> {
        if immediate || !self.auto_save {
            return write_manifest(&self.inner.output_dir, manifest).await;
        }
        let mut dirty = self.inner.dirty.lock().await;
        dirty.insert(manifest.batch_id.clone(), manifest.clone());
        Ok(())
    }

    pub async fn update_video_stage(
        &self,
        manifest: &mut BatchManifest,
        video_id: &str,
        stage: VideoStage,
    ) -> CoreResult<()> {
        let video = manifest
            .get_mut(video_id)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown video_id {video_id}")))?;
        if !video.stage.can_transition_to(stage) {
            return Err(CoreError::invalid_input(format!(
                "illegal stage transition {:?} -> {:?} for {video_id}",
                video.stage, stage
            )));
        }
        video.stage = stage;
        video.updated_at = Some(Utc::now());
        manifest.updated_at = Utc::now();
        self.save_batch(manifest, false).await
    }

    pub async fn mark_video_failed(
        &self,
        manifest: &mut BatchManifest,
        video_id: &str,
        error: impl Into<String>,
        error_type: ErrorType,
    ) -> CoreResult<()> {
        let video = manifest
            .get_mut(video_id)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown video_id {video_id}")))?;
        if !video.stage.can_transition_to(VideoStage::Failed) {
            return Err(CoreError::invalid_input(format!("cannot fail video already in {:?}", video.stage)));
        }
        video.stage = VideoStage::Failed;
        video.error = Some(error.into());
        video.error_type = Some(error_type);
        video.retries += 1;
        video.updated_at = Some(Utc::now());
        manifest.updated_at = Utc::now();
        self.save_batch(manifest, false).await
    }

    pub async fn add_completed_chunk(
        &self,
        manifest: &mut BatchManifest,
        video_id: &str,
        index: u32,
    ) -> CoreResult<()> {
        let video = manifest
            .get_mut(video_id)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown video_id {video_id}")))?;
        video.completed_chunks.insert(index);
        video.updated_at = Some(Utc::now());
        manifest.updated_at = Utc::now();
        self.save_batch(manifest, false).await
    }

    pub async fn list_batches(&self) -> CoreResult<Vec<String>> {
        let dir = state_dir(&self.inner.output_dir);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".manifest.json") {
                out.push(id.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    pub async fn delete_batch(&self, batch_id: &str) -> CoreResult<()> {
        let path = manifest_path(&self.inner.output_dir, batch_id);
        self.inner.dirty.lock().await.remove(batch_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Force a synchronous save of every dirty manifest.
    pub async fn flush(&self) -> CoreResult<()> {
        flush_dirty(&self.inner).await;
        Ok(())
    }

    /// Flush, then stop the background auto-save timer.
    pub async fn shutdown(&mut self) -> CoreResult<()> {
        self.flush().await?;
        if let Some(tx) = self.timer_shutdown.take() {
            let _ = tx.send(true);
        }
        Ok(())
    }
}

/// Coarse-grained shared handle to one in-flight `BatchManifest`: a
/// `ManifestStore` for IO plus a mutex around the manifest value itself, so
/// the many concurrent stage workers touching different videos in the same
/// batch can each get exclusive, serialized mutable access (spec §5
/// "single-writer invariant for VideoManifest" — enforced logically by
/// queue topology, and here by this mutex so the borrow checker agrees).
#[derive(Clone)]
pub struct SharedManifest {
    store: ManifestStore,
    manifest: Arc<Mutex<BatchManifest>>,
}

impl SharedManifest {
    pub fn new(store: ManifestStore, manifest: BatchManifest) -> Self {
        Self { store, manifest: Arc::new(Mutex::new(manifest)) }
    }

    pub async fn update_stage(&self, video_id: &str, stage: VideoStage) -> CoreResult<()> {
        let mut m = self.manifest.lock().await;
        self.store.update_video_stage(&mut m, video_id, stage).await
    }

    pub async fn mark_failed(&self, video_id: &str, error: impl Into<String>, error_type: ErrorType) -> CoreResult<()> {
        let mut m = self.manifest.lock().await;
        self.store.mark_video_failed(&mut m, video_id, error, error_type).await
    }

    pub async fn add_completed_chunk(&self, video_id: &str, index: u32) -> CoreResult<()> {
        let mut m = self.manifest.lock().await;
        self.store.add_completed_chunk(&mut m, video_id, index).await
    }

    pub async fn set_output_file(&self, video_id: &str, name: &str, path: &str) -> CoreResult<()> {
        let mut m = self.manifest.lock().await;
        let video = m
            .get_mut(video_id)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown video_id {video_id}")))?;
        video.output_files.insert(name.to_string(), path.to_string());
        drop(video);
        self.store.save_batch(&m, false).await
    }

    pub async fn snapshot(&self) -> BatchManifest {
        self.manifest.lock().await.clone()
    }

    pub async fn flush(&self) -> CoreResult<()> {
        self.store.flush().await
    }
}

async fn flush_dirty(inner: &Inner) {
    let drained: Vec<BatchManifest> = {
        let mut dirty = inner.dirty.lock().await;
        dirty.drain().map(|(_, v)| v).collect()
    };
    for manifest in &drained {
        if let Err(e) = write_manifest(&inner.output_dir, manifest).await {
            warn!(batch_id = %manifest.batch_id, error = %e, "failed to flush dirty manifest");
        } else {
            debug!(batch_id = %manifest.batch_id, "flushed manifest");
        }
    }
}

async fn write_manifest(output_dir: &Path, manifest: &BatchManifest) -> CoreResult<()> {
    let path = manifest_path(output_dir, &manifest.batch_id);
    let bytes = serde_json::to_vec_pretty(manifest)?;
    atomic_io::write_atomic(&path, &bytes).await
}
