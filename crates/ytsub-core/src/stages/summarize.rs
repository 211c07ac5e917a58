//! SUMMARIZE stage processor (spec §4.8 SUMMARIZE).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use ytsub_models::{Chapter, VideoStage};

use crate::adapters::LlmAdapter;
use crate::atomic_io;
use crate::error::CoreError;
use crate::manifest::SharedManifest;
use crate::scheduler::{StageData, SummaryResult};
use crate::stage_queue::{StageOutcome, StageProcessor};

pub const DEFAULT_SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(60);

/// Summarizes whichever completed subtitle track best matches the
/// configured summary language, preferring a completed AI/official
/// translation in that language over the source transcript. Any adapter
/// error here is non-fatal to the video — a missing or failing summary
/// LLM is treated the same as "no summary" (spec §4.8 SUMMARIZE).
pub struct SummarizeProcessor {
    pub llm: Arc<dyn LlmAdapter>,
    pub manifest: SharedManifest,
    pub summary_language: String,
    pub call_timeout: Duration,
}

impl SummarizeProcessor {
    pub fn new(llm: Arc<dyn LlmAdapter>, manifest: SharedManifest, summary_language: impl Into<String>) -> Self {
        Self { llm, manifest, summary_language: summary_language.into(), call_timeout: DEFAULT_SUMMARIZE_TIMEOUT }
    }

    /// Picks the path of the transcript to summarize: the completed target
    /// matching `summary_language`, else any other completed target, else
    /// the original source transcript.
    fn pick_source_path(&self, item: &StageData) -> Option<std::path::PathBuf> {
        let translation = item.translation_result.as_ref();
        let download = item.download_result.as_ref()?;

        if let Some(path) = translation.and_then(|t| t.translated.get(&self.summary_language)) {
            return Some(path.clone());
        }
        if let Some(path) = download.official_translations.get(&self.summary_language) {
            return Some(path.clone());
        }
        if let Some(t) = translation {
            if let Some((_, path)) = t.translated.iter().next() {
                return Some(path.clone());
            }
        }
        if let Some((_, path)) = download.official_translations.iter().next() {
            return Some(path.clone());
        }
        Some(download.original_path.clone())
    }
}

#[async_trait]
impl StageProcessor<StageData> for SummarizeProcessor {
    async fn process(&self, mut item: StageData) -> StageOutcome<StageData> {
        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Summarizing).await {
            return StageOutcome::Fail(item, e);
        }

        let Some(source_path) = self.pick_source_path(&item) else {
            item.summary_result = None;
            return StageOutcome::Forward(item);
        };

        let text = match atomic_io::read_atomic(&source_path).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => {
                warn!(video_id = %item.video.video_id, "summarize source missing, skipping summary");
                item.summary_result = None;
                return StageOutcome::Forward(item);
            }
            Err(e) => {
                warn!(video_id = %item.video.video_id, error = %e, "summarize source unreadable, skipping summary");
                item.summary_result = None;
                return StageOutcome::Forward(item);
            }
        };

        let chapters: Vec<Chapter> = item.detection_result.as_ref().map(|d| d.chapters.clone()).unwrap_or_default();

        let call = self.llm.summarize(&text, &self.summary_language, &chapters);
        let outcome = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(inner) => inner,
            Err(_) => Err(CoreError::Timeout(format!("summarize timed out after {:?}", self.call_timeout))),
        };

        match outcome {
            Ok(Some(markdown)) => {
                let Some(temp_dir) = item.temp_dir.clone() else {
                    item.summary_result = None;
                    return StageOutcome::Forward(item);
                };
                let path = temp_dir.join(format!("summary.{}.md", self.summary_language));
                if let Err(e) = atomic_io::write_atomic(&path, markdown.as_bytes()).await {
                    warn!(video_id = %item.video.video_id, error = %e, "failed to write summary, skipping summary");
                    item.summary_result = None;
                    return StageOutcome::Forward(item);
                }
                item.summary_result = Some(SummaryResult { lang: self.summary_language.clone(), path });
            }
            Ok(None) => {
                item.summary_result = None;
            }
            Err(e) => {
                warn!(video_id = %item.video.video_id, error = %e, "summarize adapter failed, skipping summary");
                item.summary_result = None;
            }
        }

        StageOutcome::Forward(item)
    }
}
