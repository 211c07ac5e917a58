//! DETECT stage processor (spec §4.8 DETECT).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use ytsub_models::{normalize_language_code, VideoStage};

use crate::adapters::SubtitleCatalog;
use crate::atomic_io;
use crate::error::CoreError;
use crate::manifest::SharedManifest;
use crate::proxy_pool::ProxyPool;
use crate::scheduler::StageData;
use crate::stage_queue::{StageOutcome, StageProcessor};

pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Probes a video's caption catalog via the subtitle catalog adapter and
/// normalizes every language code it reports. A video with no captions at
/// all is not a failure — it is routed to `StageOutcome::Skip` so the
/// scheduler marks it `SKIPPED` rather than `FAILED` (spec §4.7 "Success
/// routing").
pub struct DetectProcessor {
    pub catalog: Arc<dyn SubtitleCatalog>,
    pub manifest: SharedManifest,
    pub cookie_path: Option<String>,
    pub proxy_pool: Option<Arc<ProxyPool>>,
    pub allow_direct_proxy: bool,
    pub call_timeout: Duration,
    /// Append-only tallies of which URLs had subtitles at all (spec §4.8
    /// "Output tree layout"). `None` skips the write — used by callers
    /// that don't want this side effect (e.g. unit tests).
    pub with_subtitle_path: Option<PathBuf>,
    pub without_subtitle_path: Option<PathBuf>,
}

impl DetectProcessor {
    pub fn new(catalog: Arc<dyn SubtitleCatalog>, manifest: SharedManifest) -> Self {
        Self {
            catalog,
            manifest,
            cookie_path: None,
            proxy_pool: None,
            allow_direct_proxy: true,
            call_timeout: DEFAULT_DETECT_TIMEOUT,
            with_subtitle_path: None,
            without_subtitle_path: None,
        }
    }
}

#[async_trait]
impl StageProcessor<StageData> for DetectProcessor {
    async fn process(&self, mut item: StageData) -> StageOutcome<StageData> {
        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Detecting).await {
            return StageOutcome::Fail(item, e);
        }

        let proxy = self.proxy_pool.as_ref().and_then(|p| p.get_next_proxy(self.allow_direct_proxy));

        let call = self.catalog.list_subtitles(&item.video.url, self.cookie_path.as_deref(), proxy.as_deref());
        let mut detection = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(detection)) => {
                if let (Some(pool), Some(p)) = (&self.proxy_pool, &proxy) {
                    pool.mark_success(p);
                }
                detection
            }
            Ok(Err(e)) => {
                if let (Some(pool), Some(p)) = (&self.proxy_pool, &proxy) {
                    pool.mark_failure(p, Some(e.to_string()));
                }
                return StageOutcome::Fail(item, e);
            }
            Err(_) => {
                return StageOutcome::Fail(
                    item,
                    CoreError::Timeout(format!("detect timed out after {:?}", self.call_timeout)),
                )
            }
        };

        detection.manual_languages = detection.manual_languages.iter().map(|l| normalize_language_code(l)).collect();
        detection.auto_languages = detection.auto_languages.iter().map(|l| normalize_language_code(l)).collect();

        if !detection.has_subtitles {
            warn!(video_id = %item.video.video_id, "no subtitles available");
            if let Some(path) = &self.without_subtitle_path {
                if let Err(e) = atomic_io::append_line_with_retry(path, &item.video.url).await {
                    warn!(video_id = %item.video.video_id, error = %e, "failed to append without_subtitle.txt");
                }
            }
            return StageOutcome::Skip(item, "no subtitles".to_string());
        }

        if let Some(path) = &self.with_subtitle_path {
            if let Err(e) = atomic_io::append_line_with_retry(path, &item.video.url).await {
                warn!(video_id = %item.video.video_id, error = %e, "failed to append with_subtitle.txt");
            }
        }

        item.detection_result = Some(detection);
        StageOutcome::Forward(item)
    }
}
