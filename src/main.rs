//! dubber - mention-driven video dubbing bot
//!
//! Watches for posts that mention the bot, works out which video and language
//! the requester wants, has the dubbing service render it, and replies with
//! the dubbed video.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dubber::cli::{Args, Commands};
use dubber::config::Config;
use dubber::dubbing::{JobDriver, MurfClient, PollPolicy};
use dubber::extract::{Extractor, TextUnderstandingFactory};
use dubber::language::normalize_language;
use dubber::logs;
use dubber::media::{self, FetchedMedia, MediaFetcher, MediaProcessor, YtDlpFetcher};
use dubber::pipeline::{DirectRequest, Pipeline, PipelineSettings};
use dubber::publisher::{HttpDownloader, ReplyPublisher, ResultDownloader};
use dubber::retry::RetryPolicy;
use dubber::server::{self, AppState};
use dubber::social::TwitterClient;
use dubber::state::StateStore;
use dubber::error::DubberError;

const DEFAULT_CONFIG_FILE: &str = "dubber.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Guard flushes the file writer on exit
    let _log_guard = setup_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Check => check(&config).await,
        Commands::Download { url, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.media.downloads_dir.clone());
            let output_path = output_dir.join(format!("video_{}.mp4", chrono::Utc::now().timestamp()));
            let fetcher = YtDlpFetcher::new(config.media.clone());

            match fetcher.download_to(&url, &output_path).await {
                Ok(path) => {
                    println!("Video downloaded: {}", path.display());
                    Ok(())
                }
                Err(e) => {
                    println!("Download failed: {}", e);
                    println!("\nTroubleshooting:");
                    for hint in media::fetcher::download_hints() {
                        println!("  - {}", hint);
                    }
                    Err(e.into())
                }
            }
        }
        Commands::ExtractAudio { input, output_dir } => {
            let input = match input {
                Some(path) => path,
                None => {
                    let latest = media::find_latest_video(&config.media.downloads_dir).with_context(|| {
                        format!("No video files found in {}", config.media.downloads_dir.display())
                    })?;
                    info!("Using latest download: {}", latest.display());
                    latest
                }
            };
            let output_dir = output_dir.unwrap_or_else(|| config.media.audio_dir.clone());

            let audio = MediaProcessor::new(&config.media).extract_audio(&input, &output_dir).await?;
            println!("Audio extracted: {}", audio.display());
            Ok(())
        }
        Commands::Submit { file, language, save } => submit(&config, &file, &language, save).await,
        Commands::Dub { tweet_id, url, language, reply } => {
            let pipeline = build_pipeline(&config)?;
            let request = DirectRequest {
                tweet_id,
                tweet_url: url,
                target_language: language,
                reply,
            };

            let pb = spinner("Dubbing...")?;
            let result = pipeline.dub_direct(&request).await;
            pb.finish_and_clear();

            match result {
                Ok(outcome) => {
                    println!("Dubbed into {}: {}", outcome.language, outcome.result_url);
                    if let Some(reply_id) = outcome.reply_id {
                        println!("Replied with status {}", reply_id);
                    }
                    Ok(())
                }
                Err(e) => {
                    println!("{}", e.user_message());
                    Err(e.into())
                }
            }
        }
        Commands::Poll { watch } => {
            let pipeline = build_pipeline(&config)?;
            match watch {
                None => {
                    let summary = pipeline.run_poll_cycle().await?;
                    println!(
                        "{} new mentions: {} dubbed, {} failed, {} skipped",
                        summary.fetched, summary.dubbed, summary.failed, summary.skipped
                    );
                    Ok(())
                }
                Some(secs) => watch_mentions(&pipeline, Duration::from_secs(secs.max(1))).await,
            }
        }
        Commands::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| config.server.listen_addr.clone());
            let pipeline = Arc::new(build_pipeline(&config)?);
            let state = AppState::new(pipeline, config.social.consumer_secret.as_str());
            server::serve(state, &listen).await?;
            Ok(())
        }
        Commands::Config { init } => match init {
            Some(path) => {
                Config::default().save_to_file(&path)?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            }
            None => show_config(&config).await,
        },
        Commands::State { clear } => {
            let store = StateStore::load(&config.state.path)?;
            if clear {
                store.clear().await?;
                println!("Cleared state at {}", config.state.path.display());
                return Ok(());
            }

            let snapshot = store.snapshot().await;
            println!("State file: {}", config.state.path.display());
            println!("Cursor: {}", snapshot.cursor.as_deref().unwrap_or("none"));
            println!("\n{:<22} {:<12} {:<25}", "Mention", "Status", "Updated");
            println!("{}", "-".repeat(60));
            for marker in snapshot.processed.values() {
                println!(
                    "{:<22} {:<12} {:<25}",
                    marker.mention_id,
                    marker.status,
                    marker.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
        Commands::Logs { lines, since_mins } => show_logs(lines, since_mins),
    }
}

fn show_logs(max_lines: usize, since_mins: Option<i64>) -> Result<()> {
    let log_dir = logs::default_log_dir()?;
    let Some(path) = logs::latest_log_file(&log_dir) else {
        println!("No log files in {}", log_dir.display());
        return Ok(());
    };

    let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    println!("Log file: {}", path.display());
    println!("{}", "-".repeat(60));
    for line in logs::filter_log(&content, max_lines, since_mins, chrono::Utc::now()) {
        println!("{}", line);
    }
    Ok(())
}

/// `--config` path, else ./dubber.toml, else defaults; env always wins
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Construct every collaborator once and wire them into a pipeline
fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let social = Arc::new(TwitterClient::new(config.social.clone())?);
    let vendor = Arc::new(MurfClient::new(config.vendor.clone())?);
    let driver = JobDriver::new(vendor, PollPolicy::from(&config.job), config.vendor.priority.clone());

    let understanding = TextUnderstandingFactory::create(&config.extractor)?;
    if let Some(service) = &understanding {
        info!("Using {} for mention extraction", service.name());
    }

    let downloader = Arc::new(HttpDownloader::new(Duration::from_secs(config.vendor.timeout_secs))?);
    let publisher = ReplyPublisher::new(downloader, social.clone(), RetryPolicy::from(&config.retry));
    let state = Arc::new(StateStore::load(&config.state.path)?);

    Ok(Pipeline::new(
        Extractor::new(understanding),
        Arc::new(YtDlpFetcher::new(config.media.clone())),
        driver,
        Arc::new(publisher),
        social,
        state,
        PipelineSettings {
            default_language: config.fallback_language()?,
            bot_handle: config.social.bot_handle.clone(),
            max_results: config.mentions.max_results,
        },
    ))
}

async fn watch_mentions(pipeline: &Pipeline, every: Duration) -> Result<()> {
    info!("Scanning mentions every {:?} (Ctrl-C to stop)", every);
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed scan leaves the cursor untouched; the next tick retries
                if let Err(e) = pipeline.run_poll_cycle().await {
                    error!("Mention scan failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping mention scanner");
                return Ok(());
            }
        }
    }
}

async fn submit(config: &Config, file: &Path, language: &str, save: bool) -> Result<()> {
    let language = normalize_language(language).ok_or_else(|| DubberError::UnsupportedLanguage(language.to_string()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "video.mp4".to_string());
    println!("Submitting {} ({:.1} MB) for {} dubbing", file_name, bytes.len() as f64 / 1024.0 / 1024.0, language);

    let vendor = Arc::new(MurfClient::new(config.vendor.clone())?);
    let driver = JobDriver::new(vendor, PollPolicy::from(&config.job), config.vendor.priority.clone());
    let policy = driver.policy().clone();

    let pb = spinner(&format!(
        "Waiting for dubbing (up to {} checks every {:?})",
        policy.max_attempts, policy.interval
    ))?;
    let result = driver.submit_and_await(&FetchedMedia { file_name, bytes }, language.name()).await;
    pb.finish_and_clear();

    let result_url = match result {
        Ok(url) => url,
        Err(e) => {
            println!("{}", e.user_message());
            return Err(e.into());
        }
    };
    println!("Dubbed video: {}", result_url);

    if save {
        let downloader = HttpDownloader::new(Duration::from_secs(config.vendor.timeout_secs))?;
        let bytes = downloader.download(&result_url).await?;
        tokio::fs::create_dir_all(&config.media.dubbed_dir).await?;
        let output: PathBuf = config.media.dubbed_dir.join(format!(
            "dubbed_{}_{}.mp4",
            chrono::Utc::now().timestamp(),
            language.code()
        ));
        tokio::fs::write(&output, bytes).await?;
        println!("Saved to {}", output.display());
    }
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    println!("\nTools:");
    let mut missing = false;
    for tool in MediaProcessor::new(&config.media).check_tools().await {
        if tool.is_available() {
            println!("  {:<8} {}", tool.name, tool.version.as_deref().unwrap_or_default());
        } else {
            missing = true;
            println!("  {:<8} NOT AVAILABLE ({})", tool.name, tool.error.as_deref().unwrap_or("unknown error"));
        }
    }

    println!("\nSecrets:");
    for (name, value) in config.masked_summary() {
        println!("  {:<22} {}", name, value);
    }

    if missing {
        warn!("Some tools are missing; downloads or audio extraction will fail");
    }
    Ok(())
}

async fn show_config(config: &Config) -> Result<()> {
    println!("\nConfiguration:");
    println!("  {:<22} {}", "default_language", config.default_language);
    println!("  {:<22} {:?}", "extractor", config.extractor.backend);
    println!("  {:<22} {}", "vendor endpoint", config.vendor.endpoint);
    println!(
        "  {:<22} {} x {:?}",
        "job polling",
        config.job.max_attempts,
        config.job.poll_interval()
    );
    println!("  {:<22} {}", "listen_addr", config.server.listen_addr);
    println!("  {:<22} {}", "state", config.state.path.display());
    for (name, value) in config.masked_summary() {
        println!("  {:<22} {}", name, value);
    }

    println!("\nTools:");
    for tool in MediaProcessor::new(&config.media).check_tools().await {
        println!(
            "  {:<8} {}",
            tool.name,
            tool.version.as_deref().unwrap_or("not available")
        );
    }

    println!("\nDirectories:");
    for (label, dir) in [
        ("downloads", &config.media.downloads_dir),
        ("audio", &config.media.audio_dir),
        ("dubbed", &config.media.dubbed_dir),
    ] {
        if dir.exists() {
            println!("  {:<10} {} ({} items)", label, dir.display(), media::count_entries(dir));
        } else {
            println!("  {:<10} {} (missing)", label, dir.display());
        }
    }
    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = logs::default_log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, logs::LOG_FILE_PREFIX);
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("dubber.log").display());
    Ok(guard)
}
