//! Shared data models for the subtitle pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video identity and detection results
//! - Subtitle chunks and SRT cues
//! - Per-batch and per-video manifests (checkpoint/resume state)
//! - Language configuration and its content-addressed hash
//! - The incremental archive entry format
//! - Structured failure records and the closed error taxonomy
//! - Proxy pool health state

pub mod archive;
pub mod chunk;
pub mod detection;
pub mod error_type;
pub mod failure;
pub mod language;
pub mod manifest;
pub mod proxy;
pub mod stage;
pub mod url;
pub mod video;

pub use archive::ArchiveEntry;
pub use chunk::{SrtCue, SubtitleChunk};
pub use detection::{Chapter, DetectionResult, SubtitleLocator};
pub use error_type::{classify_message, ErrorType};
pub use failure::FailureRecord;
pub use language::{normalize_language_code, BilingualMode, LanguageConfig, SubtitleFormat, TranslationStrategy};
pub use manifest::{BatchManifest, VideoManifest};
pub use proxy::ProxyStatus;
pub use stage::VideoStage;
pub use url::{extract_youtube_id, identify_url, UrlKind, YoutubeIdError};
pub use video::VideoInfo;
