//! Checkpoint/resume state (spec §3, §4.1, §6.7).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_type::ErrorType;
use crate::stage::VideoStage;

/// Per-video checkpoint state within a batch.
///
/// Invariants (enforced by `ytsub-core`'s `ManifestManager`, not by this
/// plain data type): `completed_chunks` only grows; `stage` transitions
/// only forward (`VideoStage::can_transition_to`); `error_type` is present
/// iff `stage == Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoManifest {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub stage: VideoStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub completed_chunks: BTreeSet<u32>,
    #[serde(default)]
    pub output_files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VideoManifest {
    pub fn new(video_id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            video_id: video_id.into(),
            url: url.into(),
            title: title.into(),
            stage: VideoStage::Pending,
            error: None,
            error_type: None,
            retries: 0,
            completed_chunks: BTreeSet::new(),
            output_files: BTreeMap::new(),
            started_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// One batch run's worth of videos, identified by a timestamp `batch_id`
/// (`YYYYMMDD_HHMMSS`). Persisted as one JSON file (spec §4.1, §6.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub source: String,
    pub total_videos: usize,
    pub videos: BTreeMap<String, VideoManifest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchManifest {
    pub fn new(batch_id: impl Into<String>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            batch_id: batch_id.into(),
            source: source.into(),
            total_videos: 0,
            videos: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert a video, keeping `total_videos == videos.len()` (spec §3
    /// BatchManifest invariant).
    pub fn insert_video(&mut self, video: VideoManifest) {
        self.videos.insert(video.video_id.clone(), video);
        self.total_videos = self.videos.len();
        self.updated_at = Utc::now();
    }

    pub fn get(&self, video_id: &str) -> Option<&VideoManifest> {
        self.videos.get(video_id)
    }

    pub fn get_mut(&mut self, video_id: &str) -> Option<&mut VideoManifest> {
        self.videos.get_mut(video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_videos_tracks_map_len() {
        let mut b = BatchManifest::new("20260101_000000", "channel:UC123");
        b.insert_video(VideoManifest::new("abc123def45", "u1", "t1"));
        b.insert_video(VideoManifest::new("def456ghi78", "u2", "t2"));
        assert_eq!(b.total_videos, 2);
        assert_eq!(b.total_videos, b.videos.len());
    }

    #[test]
    fn inserting_same_id_twice_does_not_duplicate() {
        let mut b = BatchManifest::new("20260101_000000", "channel:UC123");
        b.insert_video(VideoManifest::new("abc123def45", "u1", "t1"));
        b.insert_video(VideoManifest::new("abc123def45", "u1-updated", "t1"));
        assert_eq!(b.total_videos, 1);
    }

    #[test]
    fn json_round_trip_is_structurally_equal() {
        let mut b = BatchManifest::new("20260101_000000", "urls");
        let mut v = VideoManifest::new("abc123def45", "u1", "t1");
        v.completed_chunks.insert(0);
        v.completed_chunks.insert(2);
        b.insert_video(v);

        let json = serde_json::to_string(&b).unwrap();
        let back: BatchManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_id, b.batch_id);
        assert_eq!(back.total_videos, b.total_videos);
        assert_eq!(back.videos["abc123def45"].completed_chunks, b.videos["abc123def45"].completed_chunks);
    }
}
