//! DOWNLOAD stage processor (spec §4.8 DOWNLOAD).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use ytsub_models::{DetectionResult, LanguageConfig, TranslationStrategy, VideoStage};
use ytsub_subtitle_format::convert_to_srt;

use crate::adapters::SubtitleCatalog;
use crate::atomic_io;
use crate::error::CoreError;
use crate::manifest::SharedManifest;
use crate::proxy_pool::ProxyPool;
use crate::scheduler::{DownloadResult, StageData};
use crate::stage_queue::{StageOutcome, StageProcessor};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Downloads the source-language caption and whichever target-language
/// captions the batch's [`TranslationStrategy`] says to fetch officially,
/// converting every downloaded track to SRT via `ytsub-subtitle-format`.
/// Target languages the strategy leaves unfulfilled are recorded as
/// `ai_targets` for TRANSLATE to pick up.
pub struct DownloadProcessor {
    pub catalog: Arc<dyn SubtitleCatalog>,
    pub manifest: SharedManifest,
    pub language: LanguageConfig,
    pub base_temp_dir: PathBuf,
    pub cookie_path: Option<String>,
    pub proxy_pool: Option<Arc<ProxyPool>>,
    pub allow_direct_proxy: bool,
    pub call_timeout: Duration,
}

impl DownloadProcessor {
    pub fn new(
        catalog: Arc<dyn SubtitleCatalog>,
        manifest: SharedManifest,
        language: LanguageConfig,
        base_temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            manifest,
            language,
            base_temp_dir: base_temp_dir.into(),
            cookie_path: None,
            proxy_pool: None,
            allow_direct_proxy: true,
            call_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    fn pick_source_language(&self, detection: &DetectionResult) -> Option<String> {
        if let Some(preferred) = &self.language.source_language {
            if detection.has_language(preferred) {
                return Some(preferred.clone());
            }
        }
        detection
            .manual_languages
            .first()
            .or_else(|| detection.auto_languages.first())
            .cloned()
    }

    async fn fetch_srt(&self, url: &str, lang: &str, auto: bool) -> Result<String, CoreError> {
        let proxy = self.proxy_pool.as_ref().and_then(|p| p.get_next_proxy(self.allow_direct_proxy));

        let call = self.catalog.download_subtitle(url, lang, auto, self.cookie_path.as_deref(), proxy.as_deref());
        let raw = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(bytes)) => {
                if let (Some(pool), Some(p)) = (&self.proxy_pool, &proxy) {
                    pool.mark_success(p);
                }
                bytes
            }
            Ok(Err(e)) => {
                if let (Some(pool), Some(p)) = (&self.proxy_pool, &proxy) {
                    pool.mark_failure(p, Some(e.to_string()));
                }
                return Err(e);
            }
            Err(_) => return Err(CoreError::Timeout(format!("download timed out after {:?}", self.call_timeout))),
        };

        let text = String::from_utf8_lossy(&raw).into_owned();
        Ok(convert_to_srt(&text, None))
    }

    fn temp_dir_for(&self, video_id: &str) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen();
        self.base_temp_dir.join(format!("{video_id}_{suffix:08x}"))
    }
}

#[async_trait]
impl StageProcessor<StageData> for DownloadProcessor {
    async fn process(&self, mut item: StageData) -> StageOutcome<StageData> {
        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Downloading).await {
            return StageOutcome::Fail(item, e);
        }

        let Some(detection) = item.detection_result.clone() else {
            return StageOutcome::Fail(item, CoreError::invalid_input("download stage requires a detection result"));
        };

        let Some(source_lang) = self.pick_source_language(&detection) else {
            return StageOutcome::Fail(item, CoreError::content("no usable source language in detection result"));
        };

        let temp_dir = self.temp_dir_for(&item.video.video_id);
        if let Err(e) = tokio::fs::create_dir_all(&temp_dir).await {
            return StageOutcome::Fail(item, e.into());
        }
        item.temp_dir = Some(temp_dir.clone());

        let source_auto = !detection.is_official(&source_lang);
        let source_srt = match self.fetch_srt(&item.video.url, &source_lang, source_auto).await {
            Ok(text) => text,
            Err(e) => return StageOutcome::Fail(item, e),
        };
        let original_path = temp_dir.join("original.srt");
        if let Err(e) = atomic_io::write_atomic(&original_path, source_srt.as_bytes()).await {
            return StageOutcome::Fail(item, e);
        }

        let mut official_translations = BTreeMap::new();
        let mut ai_targets = Vec::new();

        for target in &self.language.subtitle_target_languages {
            if target == &source_lang {
                continue;
            }
            let officially_available = match self.language.translation_strategy {
                TranslationStrategy::AiOnly => false,
                TranslationStrategy::OfficialOnly | TranslationStrategy::OfficialAutoThenAi => {
                    detection.has_language(target)
                }
            };

            if officially_available {
                let auto = !detection.is_official(target);
                match self.fetch_srt(&item.video.url, target, auto).await {
                    Ok(text) => {
                        let path = temp_dir.join(format!("official.{target}.srt"));
                        if let Err(e) = atomic_io::write_atomic(&path, text.as_bytes()).await {
                            return StageOutcome::Fail(item, e);
                        }
                        official_translations.insert(target.clone(), path);
                    }
                    Err(e) if self.language.translation_strategy == TranslationStrategy::OfficialAutoThenAi => {
                        // Official fetch failed even though detection reported
                        // the language existed; fall back to AI for this target.
                        tracing::warn!(
                            video_id = %item.video.video_id,
                            target,
                            error = %e,
                            "official translation fetch failed, falling back to AI"
                        );
                        ai_targets.push(target.clone());
                    }
                    Err(e) => return StageOutcome::Fail(item, e),
                }
            } else if matches!(
                self.language.translation_strategy,
                TranslationStrategy::AiOnly | TranslationStrategy::OfficialAutoThenAi
            ) {
                ai_targets.push(target.clone());
            }
        }

        item.download_result = Some(DownloadResult { source_lang, original_path, official_translations, ai_targets });
        StageOutcome::Forward(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestStore;
    use tempfile::tempdir;
    use ytsub_models::{BatchManifest, BilingualMode, SubtitleFormat, VideoInfo, VideoManifest};

    struct FakeCatalog;

    #[async_trait]
    impl SubtitleCatalog for FakeCatalog {
        async fn list_subtitles(
            &self,
            _url: &str,
            _cookie_path: Option<&str>,
            _proxy: Option<&str>,
        ) -> crate::error::CoreResult<DetectionResult> {
            Ok(DetectionResult::empty("abc123def45"))
        }

        async fn download_subtitle(
            &self,
            _url: &str,
            lang: &str,
            _auto: bool,
            _cookie_path: Option<&str>,
            _proxy: Option<&str>,
        ) -> crate::error::CoreResult<Vec<u8>> {
            Ok(format!("1\n00:00:00,000 --> 00:00:01,000\nhello in {lang}\n\n").into_bytes())
        }
    }

    fn make_manifest(dir: &std::path::Path) -> SharedManifest {
        let store = ManifestStore::new(dir, false);
        let mut manifest = BatchManifest::new("b", "urls");
        manifest.insert_video(VideoManifest::new("abc123def45", "https://youtu.be/abc123def45", "t"));
        SharedManifest::new(store, manifest)
    }

    fn language(strategy: TranslationStrategy, targets: Vec<&str>) -> LanguageConfig {
        LanguageConfig {
            subtitle_target_languages: targets.into_iter().map(String::from).collect(),
            summary_language: "en".to_string(),
            source_language: Some("en".to_string()),
            bilingual_mode: BilingualMode::None,
            translation_strategy: strategy,
            subtitle_format: SubtitleFormat::Srt,
        }
    }

    fn item_with_detection(detection: DetectionResult) -> StageData {
        let mut item = StageData::new(VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "t"), "run1");
        item.detection_result = Some(detection);
        item
    }

    #[tokio::test]
    async fn ai_only_strategy_never_fetches_targets_officially() {
        let dir = tempdir().unwrap();
        let temp_root = dir.path().join("temp");
        let manifest = make_manifest(dir.path());
        let mut detection = DetectionResult::empty("abc123def45");
        detection.has_subtitles = true;
        detection.manual_languages.push("en".to_string());
        detection.manual_languages.push("ja".to_string());

        let processor = DownloadProcessor::new(
            Arc::new(FakeCatalog),
            manifest,
            language(TranslationStrategy::AiOnly, vec!["ja", "zh-CN"]),
            &temp_root,
        );

        match processor.process(item_with_detection(detection)).await {
            StageOutcome::Forward(item) => {
                let result = item.download_result.unwrap();
                assert!(result.official_translations.is_empty());
                assert_eq!(result.ai_targets, vec!["ja".to_string(), "zh-CN".to_string()]);
            }
            _ => panic!("expected forward"),
        }
    }

    #[tokio::test]
    async fn official_only_strategy_skips_unavailable_targets_without_ai_fallback() {
        let dir = tempdir().unwrap();
        let temp_root = dir.path().join("temp");
        let manifest = make_manifest(dir.path());
        let mut detection = DetectionResult::empty("abc123def45");
        detection.has_subtitles = true;
        detection.manual_languages.push("en".to_string());
        detection.manual_languages.push("ja".to_string());

        let processor = DownloadProcessor::new(
            Arc::new(FakeCatalog),
            manifest,
            language(TranslationStrategy::OfficialOnly, vec!["ja", "zh-CN"]),
            &temp_root,
        );

        match processor.process(item_with_detection(detection)).await {
            StageOutcome::Forward(item) => {
                let result = item.download_result.unwrap();
                assert!(result.official_translations.contains_key("ja"));
                assert!(!result.official_translations.contains_key("zh-CN"));
                assert!(result.ai_targets.is_empty());
            }
            _ => panic!("expected forward"),
        }
    }

    #[tokio::test]
    async fn official_auto_then_ai_falls_back_for_missing_targets() {
        let dir = tempdir().unwrap();
        let temp_root = dir.path().join("temp");
        let manifest = make_manifest(dir.path());
        let mut detection = DetectionResult::empty("abc123def45");
        detection.has_subtitles = true;
        detection.manual_languages.push("en".to_string());
        detection.auto_languages.push("ja".to_string());

        let processor = DownloadProcessor::new(
            Arc::new(FakeCatalog),
            manifest,
            language(TranslationStrategy::OfficialAutoThenAi, vec!["ja", "zh-CN"]),
            &temp_root,
        );

        match processor.process(item_with_detection(detection)).await {
            StageOutcome::Forward(item) => {
                let result = item.download_result.unwrap();
                assert!(result.official_translations.contains_key("ja"));
                assert_eq!(result.ai_targets, vec!["zh-CN".to_string()]);
            }
            _ => panic!("expected forward"),
        }
    }

    #[tokio::test]
    async fn writes_original_srt_to_temp_dir() {
        let dir = tempdir().unwrap();
        let temp_root = dir.path().join("temp");
        let manifest = make_manifest(dir.path());
        let mut detection = DetectionResult::empty("abc123def45");
        detection.has_subtitles = true;
        detection.manual_languages.push("en".to_string());

        let processor =
            DownloadProcessor::new(Arc::new(FakeCatalog), manifest, language(TranslationStrategy::AiOnly, vec![]), &temp_root);

        match processor.process(item_with_detection(detection)).await {
            StageOutcome::Forward(item) => {
                let result = item.download_result.unwrap();
                let contents = tokio::fs::read_to_string(&result.original_path).await.unwrap();
                assert!(contents.contains("hello in en"));
            }
            _ => panic!("expected forward"),
        }
    }
}
