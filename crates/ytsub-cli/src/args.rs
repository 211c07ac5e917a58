//! Command-line surface (spec §6.5).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ytsub")]
#[command(about = "Resumable, staged subtitle pipeline: detect, download, translate, summarize")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override `<user_data>` (defaults to the platform config dir or `YTSUB_DATA_DIR`)
    #[arg(long, global = true)]
    pub data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every video on a channel
    Channel(ChannelArgs),
    /// Process a batch of explicit video URLs from a file
    Urls(UrlsArgs),
    /// Validate the configured cookies file and proxy URL without running any stage
    TestCookie,
}

#[derive(clap::Args)]
pub struct ChannelArgs {
    /// Channel URL (`youtube.com/@handle`, `/channel/UC...`, `/c/...`, `/user/...`)
    #[arg(long)]
    pub url: String,

    /// Only run DETECT and record with_subtitle.txt/without_subtitle.txt; no archive/output/failure-log writes
    #[arg(long, conflicts_with = "run")]
    pub dry_run: bool,

    /// Run the full pipeline (default if neither flag is given)
    #[arg(long, conflicts_with = "dry_run")]
    pub run: bool,

    /// Ignore the incremental archive and reprocess every video
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args)]
pub struct UrlsArgs {
    /// Path to a file of one video URL per line
    #[arg(long)]
    pub file: std::path::PathBuf,

    /// Only run DETECT and record with_subtitle.txt/without_subtitle.txt; no archive/output/failure-log writes
    #[arg(long, conflicts_with = "run")]
    pub dry_run: bool,

    /// Run the full pipeline (default if neither flag is given)
    #[arg(long, conflicts_with = "dry_run")]
    pub run: bool,

    /// Ignore the incremental archive and reprocess every video
    #[arg(long)]
    pub force: bool,
}
