//! OUTPUT stage processor (spec §4.8 OUTPUT).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use ytsub_models::{LanguageConfig, VideoStage};

use crate::adapters::{VideoArtifacts, WriterAdapter};
use crate::archive;
use crate::atomic_io;
use crate::error::CoreError;
use crate::manifest::SharedManifest;
use crate::scheduler::StageData;
use crate::stage_queue::{StageOutcome, StageProcessor};

/// Writes every assembled artifact to the persistent output tree, records
/// the video in its incremental archive, advances the manifest to `DONE`,
/// and releases the video's temp directory (spec §4.8 OUTPUT, §4.9).
///
/// A video's target-language set is all-or-nothing: if TRANSLATE could not
/// produce every AI target it was assigned, the item never reaches this
/// stage (TRANSLATE already failed it) — so by the time OUTPUT runs,
/// `download_result.ai_targets` and `translation_result.translated` are
/// known to agree (spec §7 "Partial failure semantics").
pub struct OutputProcessor {
    pub writer: Arc<dyn WriterAdapter>,
    pub manifest: SharedManifest,
    pub language: LanguageConfig,
    pub archive_path: Option<PathBuf>,
    pub config_hash: String,
    pub with_subtitle_path: Option<PathBuf>,
    pub keep_temp_on_error: bool,
}

impl OutputProcessor {
    pub fn new(writer: Arc<dyn WriterAdapter>, manifest: SharedManifest, language: LanguageConfig) -> Self {
        let config_hash = language.config_hash();
        Self {
            writer,
            manifest,
            language,
            archive_path: None,
            config_hash,
            with_subtitle_path: None,
            keep_temp_on_error: true,
        }
    }

    async fn read_or_empty(path: &Path) -> Result<Vec<u8>, CoreError> {
        Ok(atomic_io::read_atomic(path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl StageProcessor<StageData> for OutputProcessor {
    async fn process(&self, mut item: StageData) -> StageOutcome<StageData> {
        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Outputting).await {
            return StageOutcome::Fail(item, e);
        }

        let Some(download) = item.download_result.clone() else {
            return StageOutcome::Fail(item, CoreError::invalid_input("output stage requires a download result"));
        };

        let original_bytes = match Self::read_or_empty(&download.original_path).await {
            Ok(bytes) => bytes,
            Err(e) => return StageOutcome::Fail(item, e),
        };

        let mut translated_srt = BTreeMap::new();
        for (lang, path) in &download.official_translations {
            match Self::read_or_empty(path).await {
                Ok(bytes) => {
                    translated_srt.insert(lang.clone(), bytes);
                }
                Err(e) => return StageOutcome::Fail(item, e),
            }
        }
        if let Some(translation) = &item.translation_result {
            for (lang, path) in &translation.translated {
                match Self::read_or_empty(path).await {
                    Ok(bytes) => {
                        translated_srt.insert(lang.clone(), bytes);
                    }
                    Err(e) => return StageOutcome::Fail(item, e),
                }
            }
        }

        let summary_markdown = if let Some(summary) = &item.summary_result {
            match Self::read_or_empty(&summary.path).await {
                Ok(bytes) => Some((summary.lang.clone(), bytes)),
                Err(e) => return StageOutcome::Fail(item, e),
            }
        } else {
            None
        };

        let metadata = VideoMetadata {
            video_id: item.video.video_id.clone(),
            url: item.video.url.clone(),
            title: item.video.title.clone(),
            source_language: download.source_lang.clone(),
            target_languages: translated_srt.keys().cloned().collect(),
            summary_language: summary_markdown.as_ref().map(|(lang, _)| lang.clone()),
            run_id: item.run_id.clone(),
        };
        let metadata_json = match serde_json::to_vec_pretty(&metadata) {
            Ok(bytes) => bytes,
            Err(e) => return StageOutcome::Fail(item, e.into()),
        };

        let artifacts = VideoArtifacts {
            original_srt: (download.source_lang.clone(), original_bytes),
            translated_srt,
            summary_markdown,
            metadata_json,
        };

        let output_files = match self.writer.write_video_artifacts(&item.video.video_id, artifacts).await {
            Ok(files) => files,
            Err(e) => return StageOutcome::Fail(item, e),
        };

        for (name, path) in &output_files {
            if let Err(e) = self.manifest.set_output_file(&item.video.video_id, name, &path.to_string_lossy()).await {
                warn!(video_id = %item.video.video_id, error = %e, "failed to record output file in manifest");
            }
        }

        if let Some(archive_path) = &self.archive_path {
            if let Err(e) = archive::mark_as_processed(&item.video.video_id, archive_path, &self.config_hash).await {
                return StageOutcome::Fail(item, e);
            }
        }

        if let Some(path) = &self.with_subtitle_path {
            if let Err(e) = atomic_io::append_line_with_retry(path, &item.video.url).await {
                warn!(video_id = %item.video.video_id, error = %e, "failed to append with_subtitle.txt");
            }
        }

        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Done).await {
            return StageOutcome::Fail(item, e);
        }

        if let Some(temp_dir) = item.temp_dir.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(video_id = %item.video.video_id, error = %e, "failed to remove temp dir after successful output");
                }
            }
        }

        StageOutcome::Forward(item)
    }
}

/// `videos/<video_id>/metadata.json` contents (spec §4.8 "Output tree
/// layout"). Not part of the data model proper — this is an output
/// artifact, not checkpoint state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct VideoMetadata {
    video_id: String,
    url: String,
    title: String,
    source_language: String,
    target_languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_language: Option<String>,
    run_id: String,
}
