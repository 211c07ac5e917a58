//! Structured failure records (spec §3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_type::ErrorType;

/// One failed (or cancelled) video, as written to `failed_records.json`
/// (one JSON object per line) and summarized into `failed_detail.log` /
/// `failed_urls.txt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub video_id: String,
    pub url: String,
    pub stage: String,
    pub error_type: ErrorType,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
}

impl FailureRecord {
    pub fn new(
        video_id: impl Into<String>,
        url: impl Into<String>,
        stage: impl Into<String>,
        error_type: ErrorType,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            url: url.into(),
            stage: stage.into(),
            error_type,
            reason: reason.into(),
            timestamp: Utc::now(),
            run_id: None,
            channel_id: None,
            channel_name: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self.channel_name = Some(channel_name.into());
        self
    }

    /// Renders the `failed_detail.log` line format from spec §4.4:
    /// `[ts] [batch:<run_id>] [video:<id>] <url> error=<type> msg=<reason> stage=<stage>`.
    pub fn to_detail_line(&self) -> String {
        format!(
            "[{}] [batch:{}] [video:{}] {} error={} msg={} stage={}",
            self.timestamp.to_rfc3339(),
            self.run_id.as_deref().unwrap_or("-"),
            self.video_id,
            self.url,
            self.error_type,
            self.reason,
            self.stage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_line_contains_all_fields() {
        let r = FailureRecord::new("abc123def45", "https://youtu.be/abc123def45", "detect", ErrorType::Network, "connection refused")
            .with_run_id("20260101_000000");
        let line = r.to_detail_line();
        assert!(line.contains("batch:20260101_000000"));
        assert!(line.contains("video:abc123def45"));
        assert!(line.contains("error=NETWORK"));
        assert!(line.contains("msg=connection refused"));
        assert!(line.contains("stage=detect"));
    }

    #[test]
    fn json_round_trips() {
        let r = FailureRecord::new("abc123def45", "u", "translate", ErrorType::Cancelled, "drained on cancel");
        let json = serde_json::to_string(&r).unwrap();
        let back: FailureRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.video_id, r.video_id);
        assert_eq!(back.error_type, r.error_type);
    }
}
