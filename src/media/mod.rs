// Media handling
//
// - commands: yt-dlp / ffmpeg command builders
// - fetcher: status video download into transient storage
// - processor: ffmpeg operations and tool probes

pub mod commands;
pub mod fetcher;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub use commands::*;
pub use fetcher::YtDlpFetcher;
pub use processor::MediaProcessor;

use crate::error::Result;

/// Video extensions the operator tooling looks for
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

/// A downloaded video held in memory
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Retrieves the raw video behind a status link
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the video at `source` into memory. Temporary files are
    /// removed before returning.
    async fn fetch(&self, source: &str) -> Result<FetchedMedia>;

    /// Download the video at `source` to `output_path`
    async fn download_to(&self, source: &str, output_path: &Path) -> Result<PathBuf>;
}

/// Newest video file under `dir`, by modification time
pub fn find_latest_video<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(dir.as_ref()).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if !is_video {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };

        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path.to_path_buf()));
        }
    }

    newest.map(|(_, path)| path)
}

/// Number of entries directly under `dir` (0 when missing)
pub fn count_entries<P: AsRef<Path>>(dir: P) -> usize {
    WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .count()
}
