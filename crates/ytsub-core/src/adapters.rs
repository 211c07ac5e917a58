//! Narrow adapter contracts the core invokes at its external boundaries
//! (spec §6.1-§6.4). Every concrete implementation (real yt-dlp process,
//! real LLM HTTP client, or an in-process offline stand-in for tests)
//! lives outside this crate and is wired in by the binary that embeds it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use ytsub_models::{Chapter, DetectionResult, UrlKind, VideoInfo};

use crate::error::CoreResult;

/// Resolves a URL to one or more videos (spec §6.1). Channels and
/// playlists expand into a sequence of `VideoInfo`; a single video
/// resolves to exactly one.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    fn identify(&self, url: &str) -> UrlKind;
    async fn resolve(&self, url: &str) -> CoreResult<Vec<VideoInfo>>;
    fn extract_video_id(&self, url: &str) -> Option<String>;
}

/// Subtitle catalog and download (spec §6.2). `download_subtitle` returns
/// raw bytes in whatever format the source track used; format detection
/// and SRT conversion happen in the DOWNLOAD stage processor via
/// `ytsub-subtitle-format`, not here.
#[async_trait]
pub trait SubtitleCatalog: Send + Sync {
    async fn list_subtitles(
        &self,
        url: &str,
        cookie_path: Option<&str>,
        proxy: Option<&str>,
    ) -> CoreResult<DetectionResult>;

    async fn download_subtitle(
        &self,
        url: &str,
        lang: &str,
        auto: bool,
        cookie_path: Option<&str>,
        proxy: Option<&str>,
    ) -> CoreResult<Vec<u8>>;
}

/// One translation unit handed to the LLM adapter: numbered cue texts
/// only — no timing, since translation must not alter cue count or order
/// (spec §4.8 TRANSLATE "chunk translation contract").
#[derive(Debug, Clone)]
pub struct TranslationCue {
    pub index: u32,
    pub text: String,
}

/// LLM adapter (spec §6.3). The core does not depend on a provider; a
/// profile resolver upstream of this trait picks provider/model/timeout
/// per task.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn translate_chunk(
        &self,
        cues: &[TranslationCue],
        source_lang: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> CoreResult<Vec<TranslationCue>>;

    /// Returns `Ok(None)` when the summary LLM is disabled or unavailable
    /// — not an error (spec §4.8 SUMMARIZE).
    async fn summarize(
        &self,
        text: &str,
        target_lang: &str,
        chapters: &[Chapter],
    ) -> CoreResult<Option<String>>;
}

/// Final per-video artifacts ready to be written to the persistent output
/// tree (spec §4.8 "Output tree layout").
pub struct VideoArtifacts {
    pub original_srt: (String, Vec<u8>),
    pub translated_srt: BTreeMap<String, Vec<u8>>,
    pub summary_markdown: Option<(String, Vec<u8>)>,
    pub metadata_json: Vec<u8>,
}

/// Writer adapter (spec §6.4): atomically writes each artifact under
/// `<output_dir>/videos/<video_id>/` and returns the final paths keyed by
/// logical name (`original`, `translated.<lang>`, `summary`, `metadata`).
#[async_trait]
pub trait WriterAdapter: Send + Sync {
    async fn write_video_artifacts(
        &self,
        video_id: &str,
        artifacts: VideoArtifacts,
    ) -> CoreResult<BTreeMap<String, PathBuf>>;
}
