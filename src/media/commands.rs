use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, DubberError};

/// External media tool invocation (yt-dlp or ffmpeg)
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// ffmpeg input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Positional output path
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// ffmpeg: overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// ffmpeg: drop the video stream
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-acodec").arg(codec)
    }

    /// ffmpeg VBR quality (0 best .. 9 worst)
    pub fn audio_quality(self, quality: u32) -> Self {
        self.arg("-q:a").arg(quality.to_string())
    }

    /// Run to completion and return stdout. Non-zero exit becomes a media
    /// error carrying the tail of stderr.
    pub async fn execute(&self) -> Result<String> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DubberError::Media(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DubberError::Media(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr_tail(&stderr, 5)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let collected: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join(" | ")
}

/// Builder for the commands the bot runs
pub struct MediaCommandBuilder {
    ytdlp_path: String,
    ffmpeg_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(ytdlp_path: S1, ffmpeg_path: S2) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// yt-dlp download of a status video to an exact path
    pub fn download_video<P: AsRef<Path>>(
        &self,
        url: &str,
        output_path: P,
        additional_options: &[String],
    ) -> MediaCommand {
        MediaCommand::new(&self.ytdlp_path, "Video download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("-o")
            .output(output_path)
            .arg("--trim-filenames")
            .arg("100")
            .args(additional_options.iter().cloned())
            .arg(url)
    }

    /// ffmpeg mp3 extraction
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio extraction")
            .overwrite()
            .input(video_path)
            .no_video()
            .audio_codec("libmp3lame")
            .audio_quality(2)
            .output(audio_path)
    }

    pub fn ytdlp_version(&self) -> MediaCommand {
        MediaCommand::new(&self.ytdlp_path, "yt-dlp version check").arg("--version")
    }

    pub fn ffmpeg_version(&self) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "ffmpeg version check").arg("-version")
    }
}
