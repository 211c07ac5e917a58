//! Incremental archive line format (spec §3, §4.3).
//!
//! One archive line per processed video: `youtube <video_id> # lang_hash=<hex>`.
//! Lines without the `lang_hash` suffix are legacy and always treated as a
//! hash mismatch (spec §9 "Archive lang-hash compatibility").

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub video_id: String,
    /// `None` for legacy lines with no `# lang_hash=...` suffix.
    pub lang_hash: Option<String>,
}

impl ArchiveEntry {
    pub fn new(video_id: impl Into<String>, lang_hash: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            lang_hash: Some(lang_hash.into()),
        }
    }

    /// Does this entry mark `video_id` as processed under `config_hash`?
    pub fn matches(&self, video_id: &str, config_hash: &str) -> bool {
        self.video_id == video_id && self.lang_hash.as_deref() == Some(config_hash)
    }

    pub fn to_line(&self) -> String {
        match &self.lang_hash {
            Some(hash) => format!("youtube {} # lang_hash={}\n", self.video_id, hash),
            None => format!("youtube {}\n", self.video_id),
        }
    }

    /// Parse one archive line. Returns `None` for blank lines or lines that
    /// don't match the `youtube <id>` prefix (so comments/garbage are
    /// skipped rather than erroring the whole read).
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let rest = line.strip_prefix("youtube ")?;
        let (id_part, comment) = match rest.split_once('#') {
            Some((id, comment)) => (id.trim(), Some(comment.trim())),
            None => (rest.trim(), None),
        };
        if id_part.is_empty() {
            return None;
        }
        let lang_hash = comment.and_then(|c| c.strip_prefix("lang_hash=")).map(|h| h.trim().to_string());
        Some(Self {
            video_id: id_part.to_string(),
            lang_hash,
        })
    }
}
