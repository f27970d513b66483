use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Dub videos into another language on request", long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that yt-dlp and ffmpeg are callable and secrets are set
    Check,

    /// Download a post's video to a local file
    Download {
        /// Post URL
        #[arg(short, long)]
        url: String,

        /// Output directory (defaults to media.downloads_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Extract an mp3 track from a video
    ExtractAudio {
        /// Input video (defaults to the newest download)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (defaults to media.audio_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Submit a local video to the dubbing service and wait for the result
    Submit {
        /// Video file
        #[arg(short, long)]
        file: PathBuf,

        /// Target language (name or code)
        #[arg(short, long)]
        language: String,

        /// Download the dubbed video into media.dubbed_dir
        #[arg(long)]
        save: bool,
    },

    /// Run the full flow for one post
    Dub {
        /// Status id to look up
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        tweet_id: Option<String>,

        /// Post URL to dub directly
        #[arg(long)]
        url: Option<String>,

        /// Target language (defaults to the language named in the post)
        #[arg(short, long)]
        language: Option<String>,

        /// Reply to the post with the dubbed video
        #[arg(long)]
        reply: bool,
    },

    /// Scan mentions once, or keep scanning
    Poll {
        /// Seconds between scans (defaults to a single scan)
        #[arg(short, long)]
        watch: Option<u64>,
    },

    /// Serve the webhook and direct-dub endpoints
    Serve {
        /// Listen address (defaults to server.listen_addr)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Show the effective configuration, or write a default file
    Config {
        /// Write a default configuration file to this path
        #[arg(long)]
        init: Option<PathBuf>,
    },

    /// Show or clear the mention cursor and processed markers
    State {
        /// Remove every marker and the cursor
        #[arg(long)]
        clear: bool,
    },

    /// Show recent dubbing activity and errors from the newest log file
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "200")]
        lines: usize,

        /// Only entries from the last N minutes
        #[arg(long)]
        since_mins: Option<i64>,
    },
}
