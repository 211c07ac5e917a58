//! Subcommand bodies (spec §6.5).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use ytsub_core::adapters::{LlmAdapter, SubtitleCatalog, UrlResolver, WriterAdapter};
use ytsub_core::archive::ArchiveSource;
use ytsub_core::batch_runner::{sweep_stale_partials, BatchRequest, BatchRunResult, BatchRunner};
use ytsub_core::cancel::CancelToken;
use ytsub_core::config::AppConfig;
use ytsub_core::error::CoreError;
use ytsub_core::failure_logger::FailureLogger;
use ytsub_core::manifest::{ManifestStore, SharedManifest};
use ytsub_core::proxy_pool::ProxyPool;
use ytsub_core::scheduler::{PipelineScheduler, ProgressSink, StageConcurrency, StageData, Stages};
use ytsub_core::stage_queue::{FailSink, StageQueue};
use ytsub_core::stages::detect::DetectProcessor;
use ytsub_core::stages::download::DownloadProcessor;
use ytsub_core::stages::output::OutputProcessor;
use ytsub_core::stages::summarize::SummarizeProcessor;
use ytsub_core::stages::translate::TranslateProcessor;
use ytsub_models::VideoInfo;

/// Adapters constructed once in `main` and threaded through every
/// subcommand (spec §6.1-§6.4).
pub struct Adapters {
    pub resolver: Arc<dyn UrlResolver>,
    pub catalog: Arc<dyn SubtitleCatalog>,
    pub llm: Arc<dyn LlmAdapter>,
    pub writer: Arc<dyn WriterAdapter>,
}

/// A batch id in the `YYYYMMDD_HHMMSS` form the manifest schema expects
/// (spec §3 BatchManifest, §6.7). Takes the current time as a parameter so
/// the rest of this module never calls `chrono::Utc::now` itself.
pub fn new_batch_id(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

fn archives_dir(config: &AppConfig) -> PathBuf {
    config.data_dir.join("archives")
}

fn manifest_store_dir(config: &AppConfig) -> PathBuf {
    ytsub_core::state_dir(&config.output_dir)
}

/// Builds the five stage processors bound to one batch's manifest,
/// applying every knob `AppConfig` carries (spec §4.7-§4.9).
fn build_stages(
    adapters: &Adapters,
    config: &AppConfig,
    proxy_pool: &Option<Arc<ProxyPool>>,
    cancel: &CancelToken,
    manifest: SharedManifest,
    archive_path: Option<PathBuf>,
) -> Stages {
    let mut detect = DetectProcessor::new(adapters.catalog.clone(), manifest.clone());
    detect.cookie_path = config.cookie_path.clone();
    detect.proxy_pool = proxy_pool.clone();
    detect.allow_direct_proxy = config.proxy.allow_direct;
    detect.call_timeout = config.pipeline.detect_timeout;
    detect.with_subtitle_path = Some(config.output_dir.join("with_subtitle.txt"));
    detect.without_subtitle_path = Some(config.output_dir.join("without_subtitle.txt"));

    let mut download = DownloadProcessor::new(
        adapters.catalog.clone(),
        manifest.clone(),
        config.language.clone(),
        config.output_dir.join("temp"),
    );
    download.cookie_path = config.cookie_path.clone();
    download.proxy_pool = proxy_pool.clone();
    download.allow_direct_proxy = config.proxy.allow_direct;
    download.call_timeout = config.pipeline.download_timeout;

    let mut translate = TranslateProcessor::new(adapters.llm.clone(), manifest.clone(), cancel.clone());
    translate.max_chunk_retries = config.pipeline.max_chunk_retries;
    translate.chunk_timeout = config.pipeline.chunk_timeout;

    let summarize =
        SummarizeProcessor::new(adapters.llm.clone(), manifest.clone(), config.language.summary_language.clone());

    let mut output = OutputProcessor::new(adapters.writer.clone(), manifest, config.language.clone());
    output.archive_path = archive_path;
    output.keep_temp_on_error = config.pipeline.keep_temp_on_error;

    Stages {
        detect: Arc::new(detect),
        download: Arc::new(download),
        translate: Arc::new(translate),
        summarize: Arc::new(summarize),
        output: Arc::new(output),
    }
}

/// Runs a full `channel`/`urls` batch: resolves, filters by archive,
/// builds the manifest, wires the scheduler against that manifest, and
/// drains it (spec §6.5 `--run`).
pub async fn run_batch(
    adapters: &Adapters,
    config: &AppConfig,
    source: ArchiveSource,
    urls: Vec<String>,
    force: bool,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<BatchRunResult> {
    tokio::fs::create_dir_all(&config.output_dir).await.context("creating output directory")?;
    tokio::fs::create_dir_all(archives_dir(config)).await.context("creating archives directory")?;
    tokio::fs::create_dir_all(manifest_store_dir(config)).await.context("creating manifest state directory")?;

    let swept = sweep_stale_partials(&config.output_dir).await?;
    if swept > 0 {
        info!(swept, "removed stale partial-write artifacts from a prior interrupted run");
    }

    let proxy_pool = if config.proxy.proxies.is_empty() {
        None
    } else {
        Some(Arc::new(ProxyPool::with_thresholds(
            config.proxy.proxies.clone(),
            config.proxy.failure_threshold,
            config.proxy.retry_delay_minutes,
        )))
    };

    let failure_logger = Arc::new(FailureLogger::new(&config.output_dir));
    let cancel = CancelToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received ctrl_c, requesting cooperative shutdown");
            cancel_for_signal.cancel("ctrl_c");
        }
    });

    let config_hash = config.language.config_hash();
    let archive_path = source.archive_file_name().map(|name| archives_dir(config).join(name));

    let runner =
        BatchRunner::new(adapters.resolver.clone(), manifest_store_dir(config), archives_dir(config), config_hash);

    let batch_id = new_batch_id(chrono::Utc::now());
    let request = BatchRequest { source, urls, force };
    let concurrency = StageConcurrency {
        detect: config.pipeline.detect_concurrency,
        download: config.pipeline.download_concurrency,
        translate: config.pipeline.translate_concurrency,
        summarize: config.pipeline.summarize_concurrency,
        output: config.pipeline.output_concurrency,
    };
    let keep_temp_on_error = config.pipeline.keep_temp_on_error;

    let result = runner
        .run(request, batch_id, move |manifest| {
            let stages = build_stages(adapters, config, &proxy_pool, &cancel, manifest.clone(), archive_path);
            PipelineScheduler::new(stages, concurrency, manifest, failure_logger, progress, cancel, keep_temp_on_error)
        })
        .await?;

    Ok(result)
}

/// `test-cookie` (spec §6.5): validates the configured cookies file parses
/// and, if a proxy is configured, that its URL is well-formed. Runs no
/// stage.
pub async fn test_cookie(config: &AppConfig) -> Result<()> {
    match &config.cookie_path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading cookie file {path}"))?;
            let netscape_lines = contents.lines().filter(|l| !l.trim().is_empty() && !l.starts_with('#')).count();
            info!(path, netscape_lines, "cookie file parses");
        }
        None => info!("no cookie_path configured; nothing to validate"),
    }

    for proxy in &config.proxy.proxies {
        Url::parse(proxy).with_context(|| format!("proxy URL '{proxy}' is not well-formed"))?;
    }
    if !config.proxy.proxies.is_empty() {
        info!(count = config.proxy.proxies.len(), "all configured proxy URLs are well-formed");
    }

    Ok(())
}

/// `--dry-run` (spec §6.5): DETECT only, writing `with_subtitle.txt` /
/// `without_subtitle.txt`, never touching the archive, output tree, or
/// failure logs. Its manifest lives in a throwaway store that is never
/// flushed, so it leaves no trace beyond the two text files DETECT itself
/// writes.
pub async fn run_detect_only(adapters: &Adapters, config: &AppConfig, urls: Vec<String>) -> Result<DryRunSummary> {
    tokio::fs::create_dir_all(&config.output_dir).await.context("creating output directory")?;

    let mut videos: Vec<VideoInfo> = Vec::new();
    for url in &urls {
        let resolved = adapters
            .resolver
            .resolve(url)
            .await
            .with_context(|| format!("failed to resolve {url}"))?;
        videos.extend(resolved);
    }

    let store = ManifestStore::new(std::env::temp_dir(), false);
    let mut manifest = ytsub_models::BatchManifest::new("dry_run", "dry_run");
    for video in &videos {
        manifest.insert_video(ytsub_models::VideoManifest::new(
            video.video_id.clone(),
            video.url.clone(),
            video.title.clone(),
        ));
    }
    let manifest = SharedManifest::new(store, manifest);

    let mut detect = DetectProcessor::new(adapters.catalog.clone(), manifest);
    detect.cookie_path = config.cookie_path.clone();
    detect.call_timeout = config.pipeline.detect_timeout;
    detect.with_subtitle_path = Some(config.output_dir.join("with_subtitle.txt"));
    detect.without_subtitle_path = Some(config.output_dir.join("without_subtitle.txt"));

    let cancel = CancelToken::new();
    let fail_sink: Arc<dyn FailSink<StageData>> = Arc::new(DryRunFailSink);
    let queue = StageQueue::spawn(
        "detect-dry-run",
        (videos.len().max(1)) * 2,
        config.pipeline.detect_concurrency.max(1),
        Arc::new(detect),
        None,
        fail_sink,
        cancel,
    );

    let total = videos.len();
    for video in videos {
        queue
            .submit(StageData::new(video, "dry_run"))
            .await
            .map_err(|e: CoreError| anyhow::anyhow!(e))?;
    }
    queue.close_input();
    queue.wait_drained().await;

    let stats = queue.stats();
    Ok(DryRunSummary {
        total,
        with_subtitles: stats.processed as usize,
        without_subtitles: stats.failed as usize,
    })
}

#[derive(Debug, Default)]
pub struct DryRunSummary {
    pub total: usize,
    pub with_subtitles: usize,
    pub without_subtitles: usize,
}

/// `--dry-run`'s fail sink: logs only, never touches the manifest, the
/// archive, or the three failure-log sinks (spec §6.5).
struct DryRunFailSink;

#[async_trait::async_trait]
impl FailSink<StageData> for DryRunFailSink {
    async fn on_failure(&self, item: StageData, error: CoreError) {
        tracing::warn!(video_id = %item.video.video_id, error = %error, "dry-run detect failed");
    }

    async fn on_skip(&self, item: StageData, reason: String) {
        tracing::info!(video_id = %item.video.video_id, reason, "dry-run: no subtitles");
    }
}
