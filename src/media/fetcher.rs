use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::MediaConfig;
use crate::error::{Result, DubberError};
use crate::extract::patterns::normalize_status_host;
use super::{FetchedMedia, MediaCommandBuilder, MediaFetcher};

/// yt-dlp backed fetcher
pub struct YtDlpFetcher {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl YtDlpFetcher {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.ytdlp_path, &config.ffmpeg_path);
        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, source: &str) -> Result<FetchedMedia> {
        let temp_dir = tempfile::tempdir()?;
        let file_name = format!("video_{}.mp4", uuid::Uuid::new_v4().simple());
        let target = temp_dir.path().join(&file_name);

        self.download_to(source, &target).await?;

        let bytes = fs::read(&target).await?;
        if bytes.is_empty() {
            return Err(DubberError::Download(format!("Downloaded file for {} is empty", source)));
        }
        info!("Fetched {} bytes from {}", bytes.len(), source);

        // temp_dir is removed on drop
        Ok(FetchedMedia { file_name, bytes })
    }

    async fn download_to(&self, source: &str, output_path: &Path) -> Result<PathBuf> {
        let url = normalize_status_host(source);
        if url != source {
            info!("Normalized URL to {}", url);
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        info!("Downloading video: {}", url);
        let command = self
            .command_builder
            .download_video(&url, output_path, &self.config.ytdlp_options);

        if let Err(e) = command.execute().await {
            warn!("Video download failed for {}: {}", url, e);
            return Err(DubberError::Download(e.to_string()));
        }

        if !output_path.exists() {
            return Err(DubberError::Download(format!(
                "yt-dlp finished but produced no file at {}",
                output_path.display()
            )));
        }

        info!("Video downloaded successfully: {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

/// Remediation hints printed when an operator download fails
pub fn download_hints() -> Vec<&'static str> {
    vec![
        "Update yt-dlp to the latest release (brew upgrade yt-dlp / python3 -m pip install -U yt-dlp)",
        "If the post requires login, pass browser cookies via media.ytdlp_options, e.g. [\"--cookies-from-browser\", \"chrome\"]",
        "Ensure the URL is a public post with an attached video",
    ]
}
