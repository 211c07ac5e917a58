//! TRANSLATE stage processor (spec §4.8 TRANSLATE).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use ytsub_models::{SrtCue, VideoStage};

use crate::adapters::{LlmAdapter, TranslationCue};
use crate::atomic_io;
use crate::cancel::CancelToken;
use crate::chunk_tracker::ChunkTracker;
use crate::error::CoreError;
use crate::manifest::SharedManifest;
use crate::retry::BackoffConfig;
use crate::scheduler::{StageData, TranslationResult};
use crate::stage_queue::{StageOutcome, StageProcessor};
use crate::stages::render_srt;

pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

/// Translates the source SRT into every AI-assigned target language,
/// chunk by chunk, resuming from whatever a prior run already completed
/// (spec §4.2, §4.8). RATE_LIMIT errors retry with backoff indefinitely
/// without spending the per-chunk retry budget; every other retryable
/// error spends the budget and fails the video once it's exhausted.
pub struct TranslateProcessor {
    pub llm: Arc<dyn LlmAdapter>,
    pub manifest: SharedManifest,
    pub cancel: CancelToken,
    pub max_chunk_retries: u32,
    pub chunk_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl TranslateProcessor {
    pub fn new(llm: Arc<dyn LlmAdapter>, manifest: SharedManifest, cancel: CancelToken) -> Self {
        Self {
            llm,
            manifest,
            cancel,
            max_chunk_retries: 2,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }

    /// Translates every pending chunk of one target language, returning the
    /// reassembled SRT once every chunk (old and new) has completed.
    async fn translate_language(
        &self,
        video_id: &str,
        temp_dir: &PathBuf,
        source_srt: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<PathBuf, CoreError> {
        let mut tracker = ChunkTracker::new(temp_dir, target_lang);
        tracker.split_subtitle(source_srt);
        tracker.restore().await?;

        let cache_dir = temp_dir.join(format!(".chunks.{target_lang}"));
        tokio::fs::create_dir_all(&cache_dir).await?;

        for chunk in tracker.chunks().to_vec() {
            if tracker.get_pending_chunks().binary_search(&chunk.index).is_err() {
                continue;
            }

            if self.cancel.is_cancelled() {
                return Err(CoreError::cancelled("translate cancelled"));
            }

            let cues: Vec<TranslationCue> =
                chunk.entries.iter().map(|c| TranslationCue { index: c.index, text: c.text.clone() }).collect();
            let expected_indices: Vec<u32> = cues.iter().map(|c| c.index).collect();

            let mut attempt = 0u32;
            let mut rate_limit_attempt = 0u32;
            let translated: Vec<TranslationCue> = loop {
                attempt += 1;
                let call = self.llm.translate_chunk(&cues, source_lang, target_lang, None);
                let outcome = tokio::time::timeout(self.chunk_timeout, call).await;

                let result = match outcome {
                    Ok(inner) => inner,
                    Err(_) => Err(CoreError::Timeout(format!("translate chunk timed out after {:?}", self.chunk_timeout))),
                };

                match result {
                    Ok(translated) => {
                        let got: Vec<u32> = translated.iter().map(|c| c.index).collect();
                        if got != expected_indices {
                            let err = CoreError::parse(format!(
                                "translated chunk {} returned indices {:?}, expected {:?}",
                                chunk.index, got, expected_indices
                            ));
                            if attempt > self.max_chunk_retries {
                                return Err(err);
                            }
                            warn!(target_lang, chunk = chunk.index, attempt, "chunk index mismatch, retrying");
                            continue;
                        }
                        break translated;
                    }
                    Err(e) if e.kind() == ytsub_models::ErrorType::RateLimit => {
                        rate_limit_attempt += 1;
                        warn!(target_lang, chunk = chunk.index, rate_limit_attempt, "rate limited, backing off");
                        self.backoff.sleep(rate_limit_attempt).await;
                        continue;
                    }
                    Err(e) if e.is_retryable() && attempt <= self.max_chunk_retries => {
                        warn!(target_lang, chunk = chunk.index, attempt, error = %e, "retrying chunk");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let cue_entries: Vec<SrtCue> = translated
                .into_iter()
                .zip(chunk.entries.iter())
                .map(|(t, original)| SrtCue { index: t.index, start: original.start.clone(), end: original.end.clone(), text: t.text })
                .collect();
            let chunk_path = cache_dir.join(format!("{:06}.srt", chunk.index));
            atomic_io::write_atomic(&chunk_path, render_srt(&cue_entries).as_bytes()).await?;

            tracker.mark_chunk_completed(chunk.index);
            tracker.persist().await?;
            if let Err(e) = self.manifest.add_completed_chunk(video_id, chunk.index as u32).await {
                warn!(video_id, target_lang, chunk = chunk.index, error = %e, "failed to record chunk completion");
            }
        }

        let mut all_cues: Vec<SrtCue> = Vec::new();
        for chunk in tracker.chunks() {
            let chunk_path = cache_dir.join(format!("{:06}.srt", chunk.index));
            let bytes = atomic_io::read_atomic(&chunk_path)
                .await?
                .ok_or_else(|| CoreError::content(format!("missing cached chunk {} for {target_lang}", chunk.index)))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            all_cues.extend(parse_cached_chunk(&text));
        }

        let final_path = temp_dir.join(format!("translated.{target_lang}.srt"));
        atomic_io::write_atomic(&final_path, render_srt(&all_cues).as_bytes()).await?;
        Ok(final_path)
    }
}

fn parse_cached_chunk(text: &str) -> Vec<SrtCue> {
    let mut cues = Vec::new();
    let normalized = text.replace("\r\n", "\n");
    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines();
        let Some(index_line) = lines.next() else { continue };
        let Ok(index) = index_line.trim().parse::<u32>() else { continue };
        let Some(time_line) = lines.next() else { continue };
        let Some((start, end)) = time_line.split_once("-->") else { continue };
        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(SrtCue { index, start: start.trim().to_string(), end: end.trim().to_string(), text });
    }
    cues
}

#[async_trait]
impl StageProcessor<StageData> for TranslateProcessor {
    async fn process(&self, mut item: StageData) -> StageOutcome<StageData> {
        if let Err(e) = self.manifest.update_stage(&item.video.video_id, VideoStage::Translating).await {
            return StageOutcome::Fail(item, e);
        }

        let Some(download) = item.download_result.clone() else {
            return StageOutcome::Fail(item, CoreError::invalid_input("translate stage requires a download result"));
        };
        let Some(temp_dir) = item.temp_dir.clone() else {
            return StageOutcome::Fail(item, CoreError::invalid_input("translate stage requires a temp dir"));
        };

        if download.ai_targets.is_empty() {
            item.translation_result = Some(TranslationResult::default());
            return StageOutcome::Forward(item);
        }

        let source_bytes = match atomic_io::read_atomic(&download.original_path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return StageOutcome::Fail(item, CoreError::content("missing source subtitle in temp dir")),
            Err(e) => return StageOutcome::Fail(item, e),
        };
        let source_srt = String::from_utf8_lossy(&source_bytes).into_owned();

        let mut translated = BTreeMap::new();
        for target_lang in &download.ai_targets {
            match self
                .translate_language(&item.video.video_id, &temp_dir, &source_srt, &download.source_lang, target_lang)
                .await
            {
                Ok(path) => {
                    translated.insert(target_lang.clone(), path);
                }
                Err(e) => return StageOutcome::Fail(item, e),
            }
        }

        item.translation_result = Some(TranslationResult { translated });
        StageOutcome::Forward(item)
    }
}
