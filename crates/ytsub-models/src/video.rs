//! Video identity.

use serde::{Deserialize, Serialize};

/// Immutable metadata about a video, fixed once resolved from a URL.
///
/// Identity is `video_id`; nothing in the pipeline mutates a `VideoInfo`
/// after it is produced by the URL resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// 11-character YouTube video id.
    pub video_id: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VideoInfo {
    pub fn new(video_id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            url: url.into(),
            title: title.into(),
            channel_id: None,
            channel_name: None,
            duration: None,
            upload_date: None,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_video_id() {
        let a = VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "A");
        let b = VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "B");
        assert_eq!(a.video_id, b.video_id);
    }

    #[test]
    fn round_trips_through_json() {
        let v = VideoInfo::new("abc123def45", "https://youtu.be/abc123def45", "Title");
        let json = serde_json::to_string(&v).unwrap();
        let back: VideoInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
