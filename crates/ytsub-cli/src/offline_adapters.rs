//! In-process offline stand-ins for the adapter traits (spec §6.1-§6.4,
//! §6.5 "unless a real provider is wired in"). No network calls: channel
//! and playlist expansion require a real yt-dlp-backed resolver and are
//! rejected with `CoreError::InvalidInput`; caption fetching always
//! reports "no captions available"; translation is the identity function;
//! summarization is always disabled. Swap these out for real
//! implementations of the same traits to talk to actual services.

use async_trait::async_trait;
use ytsub_models::{identify_url, Chapter, DetectionResult, UrlKind, VideoInfo};

use ytsub_core::adapters::{LlmAdapter, SubtitleCatalog, TranslationCue, UrlResolver};
use ytsub_core::error::{CoreError, CoreResult};

pub struct OfflineUrlResolver;

#[async_trait]
impl UrlResolver for OfflineUrlResolver {
    fn identify(&self, url: &str) -> UrlKind {
        identify_url(url)
    }

    async fn resolve(&self, url: &str) -> CoreResult<Vec<VideoInfo>> {
        match identify_url(url) {
            UrlKind::Video { video_id } => Ok(vec![VideoInfo::new(video_id, url, url)]),
            UrlKind::Channel { identifier } => Err(CoreError::invalid_input(format!(
                "channel expansion requires a real URL resolver (offline stand-in cannot expand channel '{identifier}')"
            ))),
            UrlKind::Playlist { playlist_id } => Err(CoreError::invalid_input(format!(
                "playlist expansion requires a real URL resolver (offline stand-in cannot expand playlist '{playlist_id}')"
            ))),
            UrlKind::Unknown => Err(CoreError::invalid_input(format!("not a recognizable YouTube URL: {url}"))),
        }
    }

    fn extract_video_id(&self, url: &str) -> Option<String> {
        match identify_url(url) {
            UrlKind::Video { video_id } => Some(video_id),
            _ => None,
        }
    }
}

/// Always reports no captions. A real catalog adapter shells out to
/// yt-dlp or an equivalent extractor; wiring one in only requires
/// implementing [`SubtitleCatalog`] and swapping the `Arc` built in
/// `main`.
pub struct OfflineSubtitleCatalog;

#[async_trait]
impl SubtitleCatalog for OfflineSubtitleCatalog {
    async fn list_subtitles(
        &self,
        url: &str,
        _cookie_path: Option<&str>,
        _proxy: Option<&str>,
    ) -> CoreResult<DetectionResult> {
        let video_id = identify_url(url);
        let video_id = match video_id {
            UrlKind::Video { video_id } => video_id,
            _ => url.to_string(),
        };
        Ok(DetectionResult::empty(video_id))
    }

    async fn download_subtitle(
        &self,
        url: &str,
        lang: &str,
        _auto: bool,
        _cookie_path: Option<&str>,
        _proxy: Option<&str>,
    ) -> CoreResult<Vec<u8>> {
        Err(CoreError::content(format!("no subtitle catalog configured: cannot fetch '{lang}' for {url}")))
    }
}

/// Identity translator, summaries always disabled. Useful for exercising
/// the pipeline's control flow without a configured LLM credential.
pub struct OfflineLlmAdapter;

#[async_trait]
impl LlmAdapter for OfflineLlmAdapter {
    async fn translate_chunk(
        &self,
        cues: &[TranslationCue],
        _source_lang: &str,
        _target_lang: &str,
        _context: Option<&str>,
    ) -> CoreResult<Vec<TranslationCue>> {
        Ok(cues.iter().map(|c| TranslationCue { index: c.index, text: c.text.clone() }).collect())
    }

    async fn summarize(&self, _text: &str, _target_lang: &str, _chapters: &[Chapter]) -> CoreResult<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_single_video_url() {
        let resolver = OfflineUrlResolver;
        let videos = resolver.resolve("https://youtu.be/abc123def45").await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].video_id, "abc123def45");
    }

    #[tokio::test]
    async fn rejects_channel_expansion() {
        let resolver = OfflineUrlResolver;
        let err = resolver.resolve("https://youtube.com/@somechannel").await.unwrap_err();
        assert_eq!(err.kind(), ytsub_models::ErrorType::InvalidInput);
    }

    #[tokio::test]
    async fn catalog_always_reports_no_subtitles() {
        let catalog = OfflineSubtitleCatalog;
        let detection = catalog.list_subtitles("https://youtu.be/abc123def45", None, None).await.unwrap();
        assert!(!detection.has_subtitles);
    }

    #[tokio::test]
    async fn llm_translate_is_identity() {
        let llm = OfflineLlmAdapter;
        let cues = vec![TranslationCue { index: 0, text: "hello".to_string() }];
        let out = llm.translate_chunk(&cues, "en", "zh-CN", None).await.unwrap();
        assert_eq!(out[0].text, "hello");
    }
}
