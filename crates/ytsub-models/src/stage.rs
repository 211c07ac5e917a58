//! Video processing stage state machine.

use serde::{Deserialize, Serialize};

/// The stage a video has reached within the pipeline.
///
/// Transitions are monotonic forward except `Failed`/`Skipped`, which are
/// terminal from any state, and `Pending`, which is only ever an initial
/// state. `stage_index` gives the total order used to enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStage {
    #[default]
    Pending,
    Detecting,
    Downloading,
    Translating,
    Summarizing,
    Outputting,
    Done,
    Failed,
    Skipped,
}

impl VideoStage {
    /// Total order for the non-terminal "happy path" stages; terminal
    /// stages (`Failed`, `Skipped`) are not part of the forward order and
    /// are reachable from any stage.
    fn happy_path_index(self) -> Option<u8> {
        match self {
            VideoStage::Pending => Some(0),
            VideoStage::Detecting => Some(1),
            VideoStage::Downloading => Some(2),
            VideoStage::Translating => Some(3),
            VideoStage::Summarizing => Some(4),
            VideoStage::Outputting => Some(5),
            VideoStage::Done => Some(6),
            VideoStage::Failed | VideoStage::Skipped => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStage::Done | VideoStage::Failed | VideoStage::Skipped)
    }

    /// Returns true if transitioning from `self` to `next` respects the
    /// monotonic-forward invariant (§3 VideoManifest).
    pub fn can_transition_to(self, next: VideoStage) -> bool {
        if next == VideoStage::Failed || next == VideoStage::Skipped {
            return !self.is_terminal();
        }
        match (self.happy_path_index(), next.happy_path_index()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VideoStage::Pending => "pending",
            VideoStage::Detecting => "detecting",
            VideoStage::Downloading => "downloading",
            VideoStage::Translating => "translating",
            VideoStage::Summarizing => "summarizing",
            VideoStage::Outputting => "outputting",
            VideoStage::Done => "done",
            VideoStage::Failed => "failed",
            VideoStage::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for VideoStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(VideoStage::Pending.can_transition_to(VideoStage::Detecting));
        assert!(VideoStage::Detecting.can_transition_to(VideoStage::Downloading));
        assert!(VideoStage::Outputting.can_transition_to(VideoStage::Done));
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(!VideoStage::Downloading.can_transition_to(VideoStage::Detecting));
        assert!(!VideoStage::Done.can_transition_to(VideoStage::Pending));
    }

    #[test]
    fn terminal_states_reachable_from_anywhere_but_not_from_terminal() {
        assert!(VideoStage::Translating.can_transition_to(VideoStage::Failed));
        assert!(VideoStage::Detecting.can_transition_to(VideoStage::Skipped));
        assert!(!VideoStage::Done.can_transition_to(VideoStage::Failed));
        assert!(!VideoStage::Failed.can_transition_to(VideoStage::Skipped));
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&VideoStage::Detecting).unwrap(), "\"detecting\"");
    }
}
