//! Failure logger: three append-only sinks for every failed or cancelled
//! video (spec §4.4).

use std::path::{Path, PathBuf};

use ytsub_models::{ErrorType, FailureRecord};

use crate::atomic_io;
use crate::error::CoreResult;

/// The three files a `FailureLogger` writes into, all rooted at one
/// output directory (spec §4.8 output tree layout).
#[derive(Clone)]
pub struct FailureLogger {
    detail_log: PathBuf,
    urls_file: PathBuf,
    records_file: PathBuf,
}

impl FailureLogger {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            detail_log: output_dir.join("failed_detail.log"),
            urls_file: output_dir.join("failed_urls.txt"),
            records_file: output_dir.join("failed_records.json"),
        }
    }

    /// Writes a record to all three sinks. `failed_urls.txt` is
    /// deduplicated by reading the file's existing lines before appending
    /// (spec §4.4 (b)); the other two sinks are plain append.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_failure(
        &self,
        video_id: impl Into<String>,
        url: impl Into<String>,
        stage: impl Into<String>,
        error_type: ErrorType,
        reason: impl Into<String>,
        run_id: Option<String>,
        channel_id: Option<String>,
        channel_name: Option<String>,
    ) -> CoreResult<()> {
        let url = url.into();
        let mut record = FailureRecord::new(video_id, url.clone(), stage, error_type, reason);
        if let Some(run_id) = run_id {
            record = record.with_run_id(run_id);
        }
        if let (Some(id), Some(name)) = (channel_id, channel_name) {
            record = record.with_channel(id, name);
        }

        atomic_io::append_line_with_retry(&self.detail_log, &record.to_detail_line()).await?;
        self.append_url_if_new(&url).await?;
        atomic_io::append_line_with_retry(&self.records_file, &serde_json::to_string(&record)?).await?;
        Ok(())
    }

    async fn append_url_if_new(&self, url: &str) -> CoreResult<()> {
        if self.has_url(url).await? {
            return Ok(());
        }
        atomic_io::append_line_with_retry(&self.urls_file, url).await
    }

    async fn has_url(&self, url: &str) -> CoreResult<bool> {
        let Some(bytes) = atomic_io::read_atomic(&self.urls_file).await? else {
            return Ok(false);
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.lines().any(|line| line == url))
    }

    pub fn detail_log_path(&self) -> &Path {
        &self.detail_log
    }

    pub fn urls_file_path(&self) -> &Path {
        &self.urls_file
    }

    pub fn records_file_path(&self) -> &Path {
        &self.records_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn logs_to_all_three_sinks() {
        let dir = tempdir().unwrap();
        let logger = FailureLogger::new(dir.path());
        logger
            .log_failure(
                "abc123def45",
                "https://youtu.be/abc123def45",
                "detect",
                ErrorType::Network,
                "connection refused",
                Some("20260101_000000".to_string()),
                None,
                None,
            )
            .await
            .unwrap();

        let detail = tokio::fs::read_to_string(logger.detail_log_path()).await.unwrap();
        assert!(detail.contains("video:abc123def45"));

        let urls = tokio::fs::read_to_string(logger.urls_file_path()).await.unwrap();
        assert_eq!(urls.lines().count(), 1);

        let records = tokio::fs::read_to_string(logger.records_file_path()).await.unwrap();
        let parsed: FailureRecord = serde_json::from_str(records.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.video_id, "abc123def45");
    }

    #[tokio::test]
    async fn duplicate_url_is_not_repeated() {
        let dir = tempdir().unwrap();
        let logger = FailureLogger::new(dir.path());
        for _ in 0..3 {
            logger
                .log_failure("abc123def45", "https://youtu.be/abc123def45", "detect", ErrorType::Network, "boom", None, None, None)
                .await
                .unwrap();
        }
        let urls = tokio::fs::read_to_string(logger.urls_file_path()).await.unwrap();
        assert_eq!(urls.lines().count(), 1);
    }

    #[tokio::test]
    async fn cancelled_videos_are_logged_too() {
        let dir = tempdir().unwrap();
        let logger = FailureLogger::new(dir.path());
        logger
            .log_failure("abc123def45", "u", "translate", ErrorType::Cancelled, "drained on cancel", None, None, None)
            .await
            .unwrap();
        let records = tokio::fs::read_to_string(logger.records_file_path()).await.unwrap();
        assert!(records.contains("CANCELLED"));
    }

    #[tokio::test]
    async fn lines_are_never_partial() {
        let dir = tempdir().unwrap();
        let logger = FailureLogger::new(dir.path());
        for i in 0..20 {
            logger
                .log_failure(format!("vid{i:08}xx"), format!("https://youtu.be/vid{i:08}xx"), "download", ErrorType::Timeout, "slow", None, None, None)
                .await
                .unwrap();
        }
        let records = tokio::fs::read_to_string(logger.records_file_path()).await.unwrap();
        for line in records.lines() {
            assert!(serde_json::from_str::<FailureRecord>(line).is_ok());
        }
    }
}
