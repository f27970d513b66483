use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::config::MediaConfig;
use crate::error::{Result, DubberError};
use super::MediaCommandBuilder;

/// ffmpeg operations and tool availability probes
pub struct MediaProcessor {
    command_builder: MediaCommandBuilder,
}

/// Result of probing one external tool
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

impl MediaProcessor {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.ytdlp_path, &config.ffmpeg_path),
        }
    }

    /// Extract an mp3 track from `video_path` into `output_dir/<stem>.mp3`
    pub async fn extract_audio(&self, video_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        if !video_path.exists() {
            return Err(DubberError::Validation(format!(
                "Video file not found at {}",
                video_path.display()
            )));
        }

        let stem = video_path
            .file_stem()
            .ok_or_else(|| DubberError::Validation("Invalid video filename".to_string()))?
            .to_string_lossy()
            .to_string();

        fs::create_dir_all(output_dir).await?;
        let audio_path = output_dir.join(format!("{}.mp3", stem));

        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());
        self.command_builder
            .extract_audio(video_path, audio_path.as_path())
            .execute()
            .await?;

        info!("Audio extraction completed");
        Ok(audio_path)
    }

    /// Probe yt-dlp and ffmpeg
    pub async fn check_tools(&self) -> Vec<ToolStatus> {
        vec![
            probe("yt-dlp", self.command_builder.ytdlp_version().execute().await),
            probe("ffmpeg", self.command_builder.ffmpeg_version().execute().await),
        ]
    }
}

fn probe(name: &'static str, result: Result<String>) -> ToolStatus {
    match result {
        Ok(stdout) => ToolStatus {
            name,
            version: Some(stdout.lines().next().unwrap_or("unknown").trim().to_string()),
            error: None,
        },
        Err(e) => ToolStatus {
            name,
            version: None,
            error: Some(e.to_string()),
        },
    }
}
