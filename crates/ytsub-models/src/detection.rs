//! Subtitle catalog produced by the DETECT stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A chapter marker as reported by the URL resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start_seconds: f64,
    pub title: String,
}

/// Where to fetch one language's subtitle track in one format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleLocator {
    pub format: String,
    pub url: String,
}

/// Result of probing a video for available captions.
///
/// `manual_languages` and `auto_languages` are ordered (first-seen order
/// from the resolver, not sorted) and hold normalized language codes
/// (§3: `en-US`/`en_us` both normalize to `en-US`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub video_id: String,
    pub has_subtitles: bool,
    pub manual_languages: Vec<String>,
    pub auto_languages: Vec<String>,
    pub chapters: Vec<Chapter>,
    pub subtitle_urls: BTreeMap<String, Vec<SubtitleLocator>>,
    pub auto_subtitle_urls: BTreeMap<String, Vec<SubtitleLocator>>,
}

impl DetectionResult {
    pub fn empty(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            has_subtitles: false,
            manual_languages: Vec::new(),
            auto_languages: Vec::new(),
            chapters: Vec::new(),
            subtitle_urls: BTreeMap::new(),
            auto_subtitle_urls: BTreeMap::new(),
        }
    }

    /// True if the given language is available as either a manual or
    /// automatic caption track.
    pub fn has_language(&self, lang: &str) -> bool {
        self.manual_languages.iter().any(|l| l == lang) || self.auto_languages.iter().any(|l| l == lang)
    }

    pub fn is_official(&self, lang: &str) -> bool {
        self.manual_languages.iter().any(|l| l == lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_subtitles() {
        let d = DetectionResult::empty("abc123def45");
        assert!(!d.has_subtitles);
        assert!(!d.has_language("en"));
    }

    #[test]
    fn distinguishes_official_from_auto() {
        let mut d = DetectionResult::empty("abc123def45");
        d.manual_languages.push("en".to_string());
        d.auto_languages.push("ja".to_string());
        assert!(d.is_official("en"));
        assert!(!d.is_official("ja"));
        assert!(d.has_language("ja"));
    }
}
