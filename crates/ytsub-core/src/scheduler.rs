//! Pipeline scheduler: wires the five stage queues into one pipeline and
//! drives a batch of videos through them (spec §4.7).

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tracing::{info, warn};
use ytsub_models::{DetectionResult, ErrorType, VideoInfo, VideoStage};

use crate::cancel::CancelToken;
use crate::error::CoreError;
use crate::failure_logger::FailureLogger;
use crate::manifest::SharedManifest;
use crate::stage_queue::{FailSink, StageProcessor, StageQueue};

/// Result of the DOWNLOAD stage (spec §4.8 DOWNLOAD).
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub source_lang: String,
    pub original_path: PathBuf,
    pub official_translations: BTreeMap<String, PathBuf>,
    /// Target languages DOWNLOAD could not satisfy officially; TRANSLATE
    /// must produce these via the LLM adapter.
    pub ai_targets: Vec<String>,
}

/// Result of the TRANSLATE stage: one SRT path per successfully
/// AI-translated target language.
#[derive(Debug, Clone, Default)]
pub struct TranslationResult {
    pub translated: BTreeMap<String, PathBuf>,
}

/// Result of the SUMMARIZE stage. Absent when the summary LLM is disabled
/// or unavailable — that is not a failure (spec §4.8 SUMMARIZE).
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub lang: String,
    pub path: PathBuf,
}

/// The mutable item threaded through all five stage queues. Each stage
/// reads the fields it needs and populates its own output field; no stage
/// clears a field another stage set (spec §9 "typed records" redesign).
pub struct StageData {
    pub video: VideoInfo,
    pub run_id: String,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub detection_result: Option<DetectionResult>,
    pub temp_dir: Option<PathBuf>,
    pub download_result: Option<DownloadResult>,
    pub translation_result: Option<TranslationResult>,
    pub summary_result: Option<SummaryResult>,
}

impl StageData {
    pub fn new(video: VideoInfo, run_id: impl Into<String>) -> Self {
        Self {
            video,
            run_id: run_id.into(),
            channel_id: None,
            channel_name: None,
            detection_result: None,
            temp_dir: None,
            download_result: None,
            translation_result: None,
            summary_result: None,
        }
    }
}

/// Per-stage worker-count defaults (spec §4.7 "Per-stage concurrency
/// defaults"): downloads/translations are externally throughput-bound,
/// detect/output are cheap parallel I/O.
#[derive(Debug, Clone, Copy)]
pub struct StageConcurrency {
    pub detect: usize,
    pub download: usize,
    pub translate: usize,
    pub summarize: usize,
    pub output: usize,
}

impl Default for StageConcurrency {
    fn default() -> Self {
        Self { detect: 2, download: 2, translate: 1, summarize: 1, output: 2 }
    }
}

/// Aggregate stats returned when a batch finishes draining (spec §4.7
/// "Lifecycle").
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub error_counts: HashMap<ErrorType, usize>,
}

/// Invoked after every per-video terminal state, independent of the
/// tracing output (spec §10.1 — the GUI/CLI "log/stats callback").
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_video_done(&self, video_id: &str, stage: VideoStage, error_type: Option<ErrorType>);
}

struct ManifestFailSink {
    manifest: SharedManifest,
    failure_logger: Arc<FailureLogger>,
    progress: Option<Arc<dyn ProgressSink>>,
    /// When `false`, a failed item's temp directory is removed here rather
    /// than left for debugging (spec §4.9 "temp directory lifecycle").
    keep_temp_on_error: bool,
    /// Tallies every terminal failure/skip by `ErrorType`, read back by
    /// `PipelineScheduler::process_videos` for `BatchStats::error_counts`
    /// (spec §4.7 "returns aggregate stats ... error_counts by type").
    error_counts: Arc<StdMutex<HashMap<ErrorType, usize>>>,
}

impl ManifestFailSink {
    fn record(&self, error_type: ErrorType) {
        *self.error_counts.lock().unwrap().entry(error_type).or_insert(0) += 1;
    }
}

#[async_trait]
impl FailSink<StageData> for ManifestFailSink {
    async fn on_failure(&self, item: StageData, error: CoreError) {
        let video_id = item.video.video_id.clone();
        let error_type = error.kind();
        self.record(error_type);
        if let Err(e) = self.manifest.mark_failed(&video_id, error.to_string(), error_type).await {
            warn!(video_id, error = %e, "failed to persist FAILED stage to manifest");
        }
        if !self.keep_temp_on_error {
            if let Some(temp_dir) = &item.temp_dir {
                if let Err(e) = tokio::fs::remove_dir_all(temp_dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(video_id, error = %e, "failed to remove temp dir after failure");
                    }
                }
            }
        }
        if let Err(e) = self
            .failure_logger
            .log_failure(
                video_id.clone(),
                item.video.url.clone(),
                "pipeline",
                error_type,
                error.to_string(),
                Some(item.run_id.clone()),
                item.channel_id.clone(),
                item.channel_name.clone(),
            )
            .await
        {
            warn!(video_id, error = %e, "failed to write failure record");
        }
        if let Some(sink) = &self.progress {
            sink.on_video_done(&video_id, VideoStage::Failed, Some(error_type)).await;
        }
    }

    async fn on_skip(&self, item: StageData, reason: String) {
        let video_id = item.video.video_id.clone();
        self.record(ErrorType::Content);
        if let Err(e) = self.manifest.update_stage(&video_id, VideoStage::Skipped).await {
            warn!(video_id, error = %e, "failed to persist SKIPPED stage to manifest");
        }
        if let Err(e) = self
            .failure_logger
            .log_failure(
                video_id.clone(),
                item.video.url.clone(),
                "detect",
                ErrorType::Content,
                reason,
                Some(item.run_id.clone()),
                item.channel_id.clone(),
                item.channel_name.clone(),
            )
            .await
        {
            warn!(video_id, error = %e, "failed to write skip record");
        }
        if let Some(sink) = &self.progress {
            sink.on_video_done(&video_id, VideoStage::Skipped, None).await;
        }
    }
}

/// The five named stages, in pipeline order.
pub struct Stages {
    pub detect: Arc<dyn StageProcessor<StageData>>,
    pub download: Arc<dyn StageProcessor<StageData>>,
    pub translate: Arc<dyn StageProcessor<StageData>>,
    pub summarize: Arc<dyn StageProcessor<StageData>>,
    pub output: Arc<dyn StageProcessor<StageData>>,
}

/// Composes DETECT → DOWNLOAD → TRANSLATE → SUMMARIZE → OUTPUT into one
/// pipeline (spec §4.7).
pub struct PipelineScheduler {
    detect: Arc<StageQueue<StageData>>,
    download: Arc<StageQueue<StageData>>,
    translate: Arc<StageQueue<StageData>>,
    summarize: Arc<StageQueue<StageData>>,
    output: Arc<StageQueue<StageData>>,
    cancel: CancelToken,
    error_counts: Arc<StdMutex<HashMap<ErrorType, usize>>>,
}

impl PipelineScheduler {
    /// Wires the stage queues in reverse (OUTPUT first) so each earlier
    /// stage can be given the next stage's input sender at construction.
    pub fn new(
        stages: Stages,
        concurrency: StageConcurrency,
        manifest: SharedManifest,
        failure_logger: Arc<FailureLogger>,
        progress: Option<Arc<dyn ProgressSink>>,
        cancel: CancelToken,
        keep_temp_on_error: bool,
    ) -> Self {
        let error_counts: Arc<StdMutex<HashMap<ErrorType, usize>>> = Arc::new(StdMutex::new(HashMap::new()));
        let fail_sink: Arc<dyn FailSink<StageData>> = Arc::new(ManifestFailSink {
            manifest: manifest.clone(),
            failure_logger,
            progress: progress.clone(),
            keep_temp_on_error,
            error_counts: error_counts.clone(),
        });
        let output = StageQueue::spawn(
            "output",
            concurrency.output * 2,
            concurrency.output,
            stages.output,
            None,
            fail_sink.clone(),
            cancel.clone(),
        );

        let summarize = StageQueue::spawn(
            "summarize",
            concurrency.summarize * 2,
            concurrency.summarize,
            stages.summarize,
            output.sender(),
            fail_sink.clone(),
            cancel.clone(),
        );

        let translate = StageQueue::spawn(
            "translate",
            concurrency.translate * 2,
            concurrency.translate,
            stages.translate,
            summarize.sender(),
            fail_sink.clone(),
            cancel.clone(),
        );

        let download = StageQueue::spawn(
            "download",
            concurrency.download * 2,
            concurrency.download,
            stages.download,
            translate.sender(),
            fail_sink.clone(),
            cancel.clone(),
        );

        let detect = StageQueue::spawn(
            "detect",
            concurrency.detect * 2,
            concurrency.detect,
            stages.detect,
            download.sender(),
            fail_sink,
            cancel.clone(),
        );

        Self { detect, download, translate, summarize, output, cancel, error_counts }
    }

    /// Submits every video to DETECT, closes its input once all are
    /// submitted, then awaits every stage draining in pipeline order, and
    /// returns aggregate stats.
    pub async fn process_videos(&self, videos: Vec<VideoInfo>, run_id: &str) -> Result<BatchStats, CoreError> {
        let total = videos.len();
        info!(total, run_id, "starting batch");

        for video in videos {
            let item = StageData::new(video, run_id.to_string());
            self.detect.submit(item).await?;
        }
        self.detect.close_input();

        self.detect.wait_drained().await;
        self.download.close_input();
        self.download.wait_drained().await;
        self.translate.close_input();
        self.translate.wait_drained().await;
        self.summarize.close_input();
        self.summarize.wait_drained().await;
        self.output.close_input();
        self.output.wait_drained().await;

        let failed = self.detect.stats().failed
            + self.download.stats().failed
            + self.translate.stats().failed
            + self.summarize.stats().failed
            + self.output.stats().failed;
        let success = self.output.stats().processed;
        let error_counts = self.error_counts.lock().unwrap().clone();

        Ok(BatchStats { total, success: success as usize, failed: failed as usize, error_counts })
    }

    /// Requests cancellation; stages drain on their own per §4.6/§5.
    pub fn stop(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestStore;
    use crate::stage_queue::StageOutcome;
    use tempfile::tempdir;
    use ytsub_models::{BatchManifest, VideoManifest};

    struct PassThrough;
    #[async_trait]
    impl StageProcessor<StageData> for PassThrough {
        async fn process(&self, item: StageData) -> StageOutcome<StageData> {
            StageOutcome::Forward(item)
        }
    }

    struct SkipAll;
    #[async_trait]
    impl StageProcessor<StageData> for SkipAll {
        async fn process(&self, item: StageData) -> StageOutcome<StageData> {
            StageOutcome::Skip(item, "no subtitles".to_string())
        }
    }

    struct FailAll;
    #[async_trait]
    impl StageProcessor<StageData> for FailAll {
        async fn process(&self, item: StageData) -> StageOutcome<StageData> {
            StageOutcome::Fail(item, CoreError::Network("connection refused".to_string()))
        }
    }

    fn make_manifest(dir: &std::path::Path, ids: &[&str]) -> SharedManifest {
        let store = ManifestStore::new(dir, false);
        let mut manifest = BatchManifest::new("20260101_000000", "urls");
        for id in ids {
            manifest.insert_video(VideoManifest::new(*id, format!("https://youtu.be/{id}"), "title"));
        }
        SharedManifest::new(store, manifest)
    }

    #[tokio::test]
    async fn empty_batch_drains_immediately() {
        let dir = tempdir().unwrap();
        let manifest = make_manifest(dir.path(), &[]);
        let failure_logger = Arc::new(FailureLogger::new(dir.path()));
        let stages = Stages {
            detect: Arc::new(PassThrough),
            download: Arc::new(PassThrough),
            translate: Arc::new(PassThrough),
            summarize: Arc::new(PassThrough),
            output: Arc::new(PassThrough),
        };
        let scheduler = PipelineScheduler::new(
            stages,
            StageConcurrency::default(),
            manifest,
            failure_logger,
            None,
            CancelToken::new(),
            true,
        );
        let stats = scheduler.process_videos(Vec::new(), "20260101_000000").await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success, 0);
    }

    #[tokio::test]
    async fn passthrough_pipeline_marks_every_video_as_output_processed() {
        let dir = tempdir().unwrap();
        let manifest = make_manifest(dir.path(), &["abc123def45", "def456ghi78"]);
        let failure_logger = Arc::new(FailureLogger::new(dir.path()));
        let stages = Stages {
            detect: Arc::new(PassThrough),
            download: Arc::new(PassThrough),
            translate: Arc::new(PassThrough),
            summarize: Arc::new(PassThrough),
            output: Arc::new(PassThrough),
        };
        let scheduler = PipelineScheduler::new(
            stages,
            StageConcurrency::default(),
            manifest,
            failure_logger,
            None,
            CancelToken::new(),
            true,
        );
        let videos = vec![
            VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "a"),
            VideoInfo::new("def456ghi78", "https://youtu.be/def456ghi78", "b"),
        ];
        let stats = scheduler.process_videos(videos, "20260101_000000").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn skip_at_detect_marks_manifest_skipped_not_failed() {
        let dir = tempdir().unwrap();
        let manifest = make_manifest(dir.path(), &["abc123def45"]);
        let manifest_clone = manifest.clone();
        let failure_logger = Arc::new(FailureLogger::new(dir.path()));
        let stages = Stages {
            detect: Arc::new(SkipAll),
            download: Arc::new(PassThrough),
            translate: Arc::new(PassThrough),
            summarize: Arc::new(PassThrough),
            output: Arc::new(PassThrough),
        };
        let scheduler = PipelineScheduler::new(
            stages,
            StageConcurrency::default(),
            manifest,
            failure_logger,
            None,
            CancelToken::new(),
            true,
        );
        let videos = vec![VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "a")];
        let stats = scheduler.process_videos(videos, "20260101_000000").await.unwrap();
        assert_eq!(stats.success, 0);
        assert_eq!(stats.failed, 1);

        let snap = manifest_clone.snapshot().await;
        assert_eq!(snap.get("abc123def45").unwrap().stage, VideoStage::Skipped);
        assert_eq!(stats.error_counts.get(&ErrorType::Content), Some(&1));
    }

    #[tokio::test]
    async fn failure_tallies_aggregate_error_counts_by_type() {
        let dir = tempdir().unwrap();
        let manifest = make_manifest(dir.path(), &["abc123def45", "def456ghi78"]);
        let failure_logger = Arc::new(FailureLogger::new(dir.path()));
        let stages = Stages {
            detect: Arc::new(FailAll),
            download: Arc::new(PassThrough),
            translate: Arc::new(PassThrough),
            summarize: Arc::new(PassThrough),
            output: Arc::new(PassThrough),
        };
        let scheduler = PipelineScheduler::new(
            stages,
            StageConcurrency::default(),
            manifest,
            failure_logger,
            None,
            CancelToken::new(),
            true,
        );
        let videos = vec![
            VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "a"),
            VideoInfo::new("def456ghi78", "https://youtu.be/def456ghi78", "b"),
        ];
        let stats = scheduler.process_videos(videos, "20260101_000000").await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.error_counts.get(&ErrorType::Network), Some(&2));
    }
}
