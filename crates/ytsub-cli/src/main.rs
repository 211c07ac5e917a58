//! Process entrypoint: loads configuration, installs the tracing
//! subscriber, wires adapters, and dispatches a subcommand (spec §6.5).

mod args;
mod commands;
mod offline_adapters;
mod writer;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ytsub_core::archive::ArchiveSource;
use ytsub_core::config::AppConfig;

use args::{Cli, Commands};
use commands::Adapters;
use offline_adapters::{OfflineLlmAdapter, OfflineSubtitleCatalog, OfflineUrlResolver};
use writer::LocalWriterAdapter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("ytsub=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    if let Some(dir) = &cli.data_dir {
        std::env::set_var("YTSUB_DATA_DIR", dir);
    }

    let config = match AppConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let exit_code = match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "run failed");
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run(command: Commands, config: AppConfig) -> anyhow::Result<i32> {
    let adapters = Adapters {
        resolver: Arc::new(OfflineUrlResolver),
        catalog: Arc::new(OfflineSubtitleCatalog),
        llm: Arc::new(OfflineLlmAdapter),
        writer: Arc::new(LocalWriterAdapter::new(&config.output_dir)),
    };

    match command {
        Commands::Channel(args) => {
            if args.dry_run {
                let summary = commands::run_detect_only(&adapters, &config, vec![args.url]).await?;
                info!(
                    total = summary.total,
                    with_subtitles = summary.with_subtitles,
                    without_subtitles = summary.without_subtitles,
                    "dry run complete"
                );
                return Ok(0);
            }

            let identifier = channel_identifier(&adapters, &args.url)?;
            let result = commands::run_batch(
                &adapters,
                &config,
                ArchiveSource::Channel { channel_id: identifier },
                vec![args.url],
                args.force,
                None,
            )
            .await?;
            print_summary(&result);
            Ok(exit_code_for(&result))
        }
        Commands::Urls(args) => {
            let contents = tokio::fs::read_to_string(&args.file).await?;
            let urls: Vec<String> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();

            if args.dry_run {
                let summary = commands::run_detect_only(&adapters, &config, urls).await?;
                info!(
                    total = summary.total,
                    with_subtitles = summary.with_subtitles,
                    without_subtitles = summary.without_subtitles,
                    "dry run complete"
                );
                return Ok(0);
            }

            let batch_id = batch_id_for_file(&args.file);
            let result = commands::run_batch(
                &adapters,
                &config,
                ArchiveSource::Urls { batch_id },
                urls,
                args.force,
                None,
            )
            .await?;
            print_summary(&result);
            Ok(exit_code_for(&result))
        }
        Commands::TestCookie => {
            commands::test_cookie(&config).await?;
            info!("test-cookie: ok");
            Ok(0)
        }
    }
}

fn channel_identifier(adapters: &Adapters, url: &str) -> anyhow::Result<String> {
    use ytsub_models::UrlKind;
    match adapters.resolver.identify(url) {
        UrlKind::Channel { identifier } => Ok(identifier),
        _ => anyhow::bail!("'{url}' does not look like a channel URL"),
    }
}

fn batch_id_for_file(path: &std::path::Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("urls").to_string()
}

fn print_summary(result: &ytsub_core::batch_runner::BatchRunResult) {
    info!(
        batch_id = %result.batch_id,
        total = result.stats.total,
        success = result.stats.success,
        failed = result.stats.failed,
        skipped_by_archive = result.skipped_by_archive,
        error_counts = ?result.stats.error_counts,
        "batch complete"
    );
}

fn exit_code_for(result: &ytsub_core::batch_runner::BatchRunResult) -> i32 {
    if result.stats.failed > 0 {
        1
    } else {
        0
    }
}
