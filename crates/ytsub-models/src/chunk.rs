//! Translation chunk data types (splitting logic lives in `ytsub-core`).

use serde::{Deserialize, Serialize};

/// One SRT cue: an index, a time range, and its text (possibly multi-line).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrtCue {
    pub index: u32,
    pub start: String,
    pub end: String,
    pub text: String,
}

/// An atomic translation unit: a contiguous run of cues (spec §3, default
/// target ~40 cues or ~4000 characters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleChunk {
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub entries: Vec<SrtCue>,
}

impl SubtitleChunk {
    pub fn char_len(&self) -> usize {
        self.entries.iter().map(|c| c.text.chars().count()).sum()
    }
}
