//! Application configuration: three-tier precedence — built-in defaults <
//! `<user_data>/config.json` < environment variables (spec §10.3).
//!
//! Generalizes the teacher's `WorkerConfig::from_env()` (one
//! `std::env::var(...).ok().and_then(|s| s.parse().ok()).unwrap_or(default)`
//! per field) into a layer that also merges a JSON file, since this
//! pipeline persists user-facing settings (target languages, proxies)
//! rather than reading everything from the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ytsub_models::{BilingualMode, LanguageConfig, SubtitleFormat, TranslationStrategy};

use crate::error::CoreResult;

/// Per-stage concurrency, retry, and timeout knobs (spec §4.7, §4.8, §4.9).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detect_concurrency: usize,
    pub download_concurrency: usize,
    pub translate_concurrency: usize,
    pub summarize_concurrency: usize,
    pub output_concurrency: usize,
    pub max_chunk_retries: u32,
    pub keep_temp_on_error: bool,
    pub detect_timeout: Duration,
    pub download_timeout: Duration,
    pub chunk_timeout: Duration,
    pub summarize_timeout: Duration,
    pub output_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detect_concurrency: 2,
            download_concurrency: 2,
            translate_concurrency: 1,
            summarize_concurrency: 1,
            output_concurrency: 2,
            max_chunk_retries: 2,
            keep_temp_on_error: true,
            detect_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(120),
            chunk_timeout: Duration::from_secs(60),
            summarize_timeout: Duration::from_secs(60),
            output_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    fn from_env(mut self) -> Self {
        self.detect_concurrency = env_parsed("YTSUB_DETECT_CONCURRENCY", self.detect_concurrency);
        self.download_concurrency = env_parsed("YTSUB_DOWNLOAD_CONCURRENCY", self.download_concurrency);
        self.translate_concurrency = env_parsed("YTSUB_TRANSLATE_CONCURRENCY", self.translate_concurrency);
        self.summarize_concurrency = env_parsed("YTSUB_SUMMARIZE_CONCURRENCY", self.summarize_concurrency);
        self.output_concurrency = env_parsed("YTSUB_OUTPUT_CONCURRENCY", self.output_concurrency);
        self.max_chunk_retries = env_parsed("YTSUB_MAX_CHUNK_RETRIES", self.max_chunk_retries);
        self.keep_temp_on_error = env_parsed("YTSUB_KEEP_TEMP_ON_ERROR", self.keep_temp_on_error);
        self.detect_timeout = Duration::from_secs(env_parsed("YTSUB_DETECT_TIMEOUT_SECS", self.detect_timeout.as_secs()));
        self.download_timeout =
            Duration::from_secs(env_parsed("YTSUB_DOWNLOAD_TIMEOUT_SECS", self.download_timeout.as_secs()));
        self.chunk_timeout = Duration::from_secs(env_parsed("YTSUB_CHUNK_TIMEOUT_SECS", self.chunk_timeout.as_secs()));
        self.summarize_timeout =
            Duration::from_secs(env_parsed("YTSUB_SUMMARIZE_TIMEOUT_SECS", self.summarize_timeout.as_secs()));
        self.output_timeout = Duration::from_secs(env_parsed("YTSUB_OUTPUT_TIMEOUT_SECS", self.output_timeout.as_secs()));
        self
    }
}

/// Proxy pool configuration (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub proxies: Vec<String>,
    pub allow_direct: bool,
    pub failure_threshold: u32,
    pub retry_delay_minutes: i64,
}

impl ProxyConfig {
    fn defaults() -> Self {
        Self { proxies: Vec::new(), allow_direct: true, failure_threshold: 3, retry_delay_minutes: 10 }
    }

    fn from_env(mut self) -> Self {
        if let Ok(raw) = std::env::var("YTSUB_PROXIES") {
            self.proxies = raw.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
        }
        self.allow_direct = env_parsed("YTSUB_ALLOW_DIRECT", self.allow_direct);
        self.failure_threshold = env_parsed("YTSUB_PROXY_FAILURE_THRESHOLD", self.failure_threshold);
        self.retry_delay_minutes = env_parsed("YTSUB_PROXY_RETRY_DELAY_MINUTES", self.retry_delay_minutes);
        self
    }
}

/// Everything the CLI needs to build adapters and the scheduler for one
/// run. Loaded once at process start via [`AppConfig::load`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cookie_path: Option<String>,
    pub language: LanguageConfig,
    pub pipeline: PipelineConfig,
    pub proxy: ProxyConfig,
}

/// The subset of `AppConfig` that may be persisted at
/// `<user_data>/config.json`. All fields are optional so a partial file
/// only overrides what it mentions (spec §10.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    cookie_path: Option<String>,
    #[serde(default)]
    language: Option<LanguageConfig>,
    #[serde(default)]
    proxies: Option<Vec<String>>,
    #[serde(default)]
    keep_temp_on_error: Option<bool>,
}

impl AppConfig {
    fn defaults(data_dir: PathBuf) -> Self {
        let output_dir = data_dir.join("output");
        Self {
            output_dir,
            data_dir,
            cookie_path: None,
            language: default_language_config(),
            pipeline: PipelineConfig::default(),
            proxy: ProxyConfig::defaults(),
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(dir) = file.output_dir {
            self.output_dir = dir;
        }
        if file.cookie_path.is_some() {
            self.cookie_path = file.cookie_path;
        }
        if let Some(language) = file.language {
            self.language = language;
        }
        if let Some(proxies) = file.proxies {
            self.proxy.proxies = proxies;
        }
        if let Some(keep) = file.keep_temp_on_error {
            self.pipeline.keep_temp_on_error = keep;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("YTSUB_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(cookie) = std::env::var("YTSUB_COOKIE_PATH") {
            self.cookie_path = Some(cookie);
        }
        if let Ok(raw) = std::env::var("YTSUB_TARGET_LANGUAGES") {
            self.language.subtitle_target_languages =
                raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(lang) = std::env::var("YTSUB_SUMMARY_LANGUAGE") {
            self.language.summary_language = lang;
        }
        if let Ok(lang) = std::env::var("YTSUB_SOURCE_LANGUAGE") {
            self.language.source_language = Some(lang);
        }
        if let Ok(raw) = std::env::var("YTSUB_TRANSLATION_STRATEGY") {
            if let Some(strategy) = parse_translation_strategy(&raw) {
                self.language.translation_strategy = strategy;
            }
        }
        if let Ok(raw) = std::env::var("YTSUB_BILINGUAL_MODE") {
            if let Some(mode) = parse_bilingual_mode(&raw) {
                self.language.bilingual_mode = mode;
            }
        }
        if let Ok(raw) = std::env::var("YTSUB_SUBTITLE_FORMAT") {
            if let Some(format) = parse_subtitle_format(&raw) {
                self.language.subtitle_format = format;
            }
        }

        self.pipeline = std::mem::take(&mut self.pipeline).from_env();
        self.proxy = std::mem::take(&mut self.proxy).from_env();
    }

    /// Resolves configuration with precedence built-in defaults <
    /// `<user_data>/config.json` < environment variables, loading `.env`
    /// via `dotenvy` first so exported variables are visible to either
    /// layer.
    pub async fn load() -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let data_dir = resolve_data_dir();
        let mut cfg = Self::defaults(data_dir.clone());

        if let Some(file) = load_file_config(&data_dir).await? {
            cfg.apply_file(file);
        }
        cfg.apply_env();

        Ok(cfg)
    }
}

fn default_language_config() -> LanguageConfig {
    LanguageConfig {
        subtitle_target_languages: Vec::new(),
        summary_language: "en".to_string(),
        source_language: None,
        bilingual_mode: BilingualMode::None,
        translation_strategy: TranslationStrategy::AiOnly,
        subtitle_format: SubtitleFormat::Srt,
    }
}

fn parse_translation_strategy(raw: &str) -> Option<TranslationStrategy> {
    match raw.to_ascii_uppercase().as_str() {
        "AI_ONLY" => Some(TranslationStrategy::AiOnly),
        "OFFICIAL_ONLY" => Some(TranslationStrategy::OfficialOnly),
        "OFFICIAL_AUTO_THEN_AI" => Some(TranslationStrategy::OfficialAutoThenAi),
        _ => None,
    }
}

fn parse_bilingual_mode(raw: &str) -> Option<BilingualMode> {
    match raw.to_ascii_lowercase().as_str() {
        "none" => Some(BilingualMode::None),
        "source+target" | "source_and_target" => Some(BilingualMode::SourceAndTarget),
        _ => None,
    }
}

fn parse_subtitle_format(raw: &str) -> Option<SubtitleFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "srt" => Some(SubtitleFormat::Srt),
        "txt" => Some(SubtitleFormat::Txt),
        "both" => Some(SubtitleFormat::Both),
        _ => None,
    }
}

fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("YTSUB_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir().map(|d| d.join("ytsub")).unwrap_or_else(|| PathBuf::from(".ytsub"))
}

async fn load_file_config(data_dir: &Path) -> CoreResult<Option<FileConfig>> {
    let path = data_dir.join("config.json");
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn defaults_apply_without_env_or_file() {
        let dir = tempdir().unwrap();
        std::env::remove_var("YTSUB_PROXIES");
        let mut cfg = AppConfig::defaults(dir.path().to_path_buf());
        cfg.apply_env();
        assert_eq!(cfg.pipeline.detect_concurrency, 2);
        assert_eq!(cfg.language.translation_strategy, TranslationStrategy::AiOnly);
    }

    #[tokio::test]
    async fn file_config_overrides_defaults_but_not_env() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("config.json"),
            r#"{"cookie_path":"/from/file.txt","keep_temp_on_error":false}"#,
        )
        .await
        .unwrap();

        std::env::remove_var("YTSUB_COOKIE_PATH");
        let file = load_file_config(dir.path()).await.unwrap().unwrap();
        let mut cfg = AppConfig::defaults(dir.path().to_path_buf());
        cfg.apply_file(file);
        assert_eq!(cfg.cookie_path.as_deref(), Some("/from/file.txt"));
        assert!(!cfg.pipeline.keep_temp_on_error);

        std::env::set_var("YTSUB_COOKIE_PATH", "/from/env.txt");
        cfg.apply_env();
        assert_eq!(cfg.cookie_path.as_deref(), Some("/from/env.txt"));
        std::env::remove_var("YTSUB_COOKIE_PATH");
    }

    #[tokio::test]
    async fn missing_file_config_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_file_config(dir.path()).await.unwrap().is_none());
    }

    #[test]
    fn parses_translation_strategy_case_insensitively() {
        assert_eq!(parse_translation_strategy("official_only"), Some(TranslationStrategy::OfficialOnly));
        assert_eq!(parse_translation_strategy("bogus"), None);
    }
}
