//! Structured per-video logging (spec §10.1).
//!
//! Generalizes the teacher's `JobLogger` (binds a job id + operation once,
//! exposes `log_start`/`log_progress`/`log_warning`/`log_error`/
//! `log_completion` plus a span) to bind `video_id` + `VideoStage` instead.

use tracing::{error, info, span, warn, Level, Span};
use ytsub_models::{ErrorType, VideoStage};

#[derive(Debug, Clone)]
pub struct StageLogger {
    video_id: String,
    stage: VideoStage,
}

impl StageLogger {
    pub fn new(video_id: impl Into<String>, stage: VideoStage) -> Self {
        Self { video_id: video_id.into(), stage }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn stage(&self) -> VideoStage {
        self.stage
    }

    pub fn log_start(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(video_id = %self.video_id, stage = %self.stage, "{}", message);
    }

    pub fn log_error(&self, error_type: ErrorType, message: &str) {
        error!(video_id = %self.video_id, stage = %self.stage, error_type = %error_type, "{}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_id = %self.video_id, stage = %self.stage, "completed: {}", message);
    }

    /// A span to nest the stage's work under, so every `tracing` event
    /// emitted while processing this item carries `video_id`/`stage`
    /// without repeating them at every call site.
    pub fn span(&self) -> Span {
        span!(Level::INFO, "stage", video_id = %self.video_id, stage = %self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_video_id_and_stage() {
        let logger = StageLogger::new("abc123def45", VideoStage::Translating);
        assert_eq!(logger.video_id(), "abc123def45");
        assert_eq!(logger.stage(), VideoStage::Translating);
    }

    #[test]
    fn log_calls_do_not_panic() {
        let logger = StageLogger::new("abc123def45", VideoStage::Downloading);
        logger.log_start("probing catalog");
        logger.log_progress("1/3 chunks");
        logger.log_warning("retrying after rate limit");
        logger.log_error(ErrorType::Network, "connection refused");
        logger.log_completion("done");
    }
}
