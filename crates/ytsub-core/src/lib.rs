//! Core pipeline engine: the durable-state stores, stage processors, and
//! the scheduler that drives videos through them (spec §4-§7).
//!
//! This crate has no network or process-spawning code of its own — every
//! boundary that talks to the outside world (yt-dlp, an LLM, the final
//! output tree) is a narrow trait in [`adapters`], implemented by whatever
//! binary embeds this crate.

use std::path::{Path, PathBuf};

pub mod adapters;
pub mod archive;
pub mod atomic_io;
pub mod batch_runner;
pub mod cancel;
pub mod chunk_tracker;
pub mod config;
pub mod error;
pub mod failure_logger;
pub mod logging;
pub mod manifest;
pub mod proxy_pool;
pub mod retry;
pub mod scheduler;
pub mod stage_queue;
pub mod stages;

pub use cancel::CancelToken;
pub use error::{CoreError, CoreResult};
pub use manifest::{ManifestStore, SharedManifest};

/// Hidden state directory for one batch's manifests and progress files,
/// rooted at the batch's output directory (spec §6.6).
pub fn state_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(".state")
}
