//! Chunk tracker: splits SRT into translation units and records
//! chunk-level progress so a crash mid-translation can resume (spec §4.2).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ytsub_models::{SrtCue, SubtitleChunk};

use crate::atomic_io;
use crate::error::CoreResult;

pub const DEFAULT_MAX_CUES: usize = 40;
pub const DEFAULT_MAX_CHARS: usize = 4000;

/// On-disk progress record for one `(video_id, target_language)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChunkProgress {
    completed: BTreeSet<usize>,
}

/// Splits an SRT transcript into atomic translation units and tracks which
/// have completed, persisted to `.chunk_progress.{lang}.json` beside the
/// video's temp directory (spec §4.2, §4.9).
pub struct ChunkTracker {
    progress_path: PathBuf,
    max_cues: usize,
    max_chars: usize,
    chunks: Vec<SubtitleChunk>,
    completed: BTreeSet<usize>,
}

impl ChunkTracker {
    pub fn new(temp_dir: &Path, lang: &str) -> Self {
        Self::with_thresholds(temp_dir, lang, DEFAULT_MAX_CUES, DEFAULT_MAX_CHARS)
    }

    pub fn with_thresholds(temp_dir: &Path, lang: &str, max_cues: usize, max_chars: usize) -> Self {
        Self {
            progress_path: temp_dir.join(format!(".chunk_progress.{lang}.json")),
            max_cues,
            max_chars,
            chunks: Vec::new(),
            completed: BTreeSet::new(),
        }
    }

    /// Deterministic: the same `srt_text` and thresholds always produce the
    /// same chunk boundaries (spec §4.2 contract).
    pub fn split_subtitle(&mut self, srt_text: &str) -> &[SubtitleChunk] {
        self.chunks = split_srt(srt_text, self.max_cues, self.max_chars);
        &self.chunks
    }

    pub fn chunks(&self) -> &[SubtitleChunk] {
        &self.chunks
    }

    /// Idempotent: marking an already-completed index a second time is a
    /// no-op (the caller is still responsible for persisting the
    /// translated text to its own per-chunk output cache; this tracker only
    /// owns the completed-index set).
    pub fn mark_chunk_completed(&mut self, index: usize) {
        self.completed.insert(index);
    }

    pub fn get_pending_chunks(&self) -> Vec<usize> {
        self.chunks.iter().map(|c| c.index).filter(|i| !self.completed.contains(i)).collect()
    }

    pub fn get_status(&self) -> ChunkStatus {
        ChunkStatus { total_chunks: self.chunks.len(), completed: self.completed.len() }
    }

    pub fn is_complete(&self) -> bool {
        !self.chunks.is_empty() && self.completed.len() == self.chunks.len()
    }

    pub async fn persist(&self) -> CoreResult<()> {
        let progress = ChunkProgress { completed: self.completed.clone() };
        let bytes = serde_json::to_vec(&progress)?;
        atomic_io::write_atomic(&self.progress_path, &bytes).await
    }

    /// Loads previously completed chunk indices, if any. Called after
    /// `split_subtitle` so pending-chunk computation reflects the restored
    /// set immediately (spec §4.8 TRANSLATE "on restart, loads completed
    /// chunks and skips them").
    pub async fn restore(&mut self) -> CoreResult<()> {
        if let Some(bytes) = atomic_io::read_atomic(&self.progress_path).await? {
            if let Ok(progress) = serde_json::from_slice::<ChunkProgress>(&bytes) {
                self.completed = progress.completed;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStatus {
    pub total_chunks: usize,
    pub completed: usize,
}

/// Walk SRT cues, starting a new chunk whenever the accumulated cue count
/// reaches `max_cues` or the accumulated character count reaches
/// `max_chars`, whichever fires first (spec §4.2 "Splitting rule"). Cue
/// timestamps are retained verbatim; original cue indices are preserved.
fn split_srt(srt_text: &str, max_cues: usize, max_chars: usize) -> Vec<SubtitleChunk> {
    let cues = parse_srt_cues(srt_text);
    let mut chunks = Vec::new();
    let mut current: Vec<SrtCue> = Vec::new();
    let mut current_chars = 0usize;
    let mut chunk_index = 0usize;

    for cue in cues {
        let cue_chars = cue.text.chars().count();
        if !current.is_empty() && (current.len() >= max_cues || current_chars + cue_chars > max_chars) {
            chunks.push(build_chunk(chunk_index, std::mem::take(&mut current)));
            chunk_index += 1;
            current_chars = 0;
        }
        current_chars += cue_chars;
        current.push(cue);
    }
    if !current.is_empty() {
        chunks.push(build_chunk(chunk_index, current));
    }
    chunks
}

fn build_chunk(index: usize, entries: Vec<SrtCue>) -> SubtitleChunk {
    let start_seconds = entries.first().map(|c| srt_time_to_seconds(&c.start)).unwrap_or(0.0);
    let end_seconds = entries.last().map(|c| srt_time_to_seconds(&c.end)).unwrap_or(start_seconds);
    SubtitleChunk { index, start_seconds, end_seconds, entries }
}

fn srt_time_to_seconds(ts: &str) -> f64 {
    let ts = ts.trim();
    let (hms, ms) = ts.split_once(',').unwrap_or((ts, "0"));
    let mut parts = hms.split(':');
    let h: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let m: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let s: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let millis: f64 = ms.parse().unwrap_or(0.0);
    h * 3600.0 + m * 60.0 + s + millis / 1000.0
}

/// Parse SRT cue blocks: `<index>\n<start> --> <end>\n<text lines>\n\n`.
/// Tolerant of trailing whitespace and CRLF line endings.
fn parse_srt_cues(srt_text: &str) -> Vec<SrtCue> {
    let normalized = srt_text.replace("\r\n", "\n");
    let mut cues = Vec::new();

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
