use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, DubberError};
use crate::language::{normalize_language, Language};

const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "llama3.2";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language used when a mention does not name one
    pub default_language: String,
    pub social: SocialConfig,
    pub vendor: VendorConfig,
    pub extractor: ExtractorConfig,
    pub media: MediaConfig,
    pub job: JobConfig,
    pub mentions: MentionPollConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Base URL of the platform API
    pub api_base: String,
    /// OAuth 2.0 user-context bearer token
    pub bearer_token: String,
    /// Consumer secret used to answer webhook CRC challenges
    pub consumer_secret: String,
    /// Numeric id of the bot account
    pub bot_user_id: String,
    /// Handle of the bot account, without the leading @
    pub bot_handle: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Dubbing job API root
    pub endpoint: String,
    pub api_key: String,
    /// Job priority sent with each submission
    pub priority: String,
    /// Request timeout in seconds for a single submission or status call
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Text-understanding backend used after the regex pass
    pub backend: ExtractorBackend,
    /// Service endpoint (OpenAI-compatible root or Ollama host)
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorBackend {
    /// OpenAI-compatible chat completions with JSON response format
    OpenAI,
    /// Local Ollama `/api/generate` with `format: json`
    Ollama,
    /// Regex only
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to yt-dlp binary
    pub ytdlp_path: String,
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Where operator downloads land
    pub downloads_dir: PathBuf,
    /// Where dubbed results are saved by the CLI
    pub dubbed_dir: PathBuf,
    /// Where extracted audio lands
    pub audio_dir: PathBuf,
    /// Additional yt-dlp arguments, e.g. ["--cookies-from-browser", "chrome"]
    pub ytdlp_options: Vec<String>,
}

/// Dubbing job polling budget. The product of the two is the only timeout
/// the job driver enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionPollConfig {
    /// Seconds between poll cycles in watch mode
    pub interval_secs: u64,
    /// Page size requested from the mentions feed
    pub max_results: u32,
}

/// Bounded exponential backoff for idempotent reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding the cursor and processed markers
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_language: "English".to_string(),
            social: SocialConfig::default(),
            vendor: VendorConfig::default(),
            extractor: ExtractorConfig::default(),
            media: MediaConfig::default(),
            job: JobConfig::default(),
            mentions: MentionPollConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twitter.com".to_string(),
            bearer_token: String::new(),
            consumer_secret: String::new(),
            bot_user_id: String::new(),
            bot_handle: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.murf.ai/v1/murfdub".to_string(),
            api_key: String::new(),
            priority: "LOW".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            backend: ExtractorBackend::OpenAI,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            timeout_secs: 20,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            downloads_dir: PathBuf::from("downloads"),
            dubbed_dir: PathBuf::from("dubbed"),
            audio_dir: PathBuf::from("audio"),
            ytdlp_options: Vec::new(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            max_attempts: 120,
        }
    }
}

impl Default for MentionPollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_results: 20,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".dubber/state.json"),
        }
    }
}

impl JobConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubberError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DubberError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubberError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubberError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. A non-empty variable always
    /// wins over the value loaded from the file.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MURF_API_KEY") {
            self.vendor.api_key = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.extractor.api_key = v;
        }
        if let Some(v) = get("TWITTER_BEARER_TOKEN").or_else(|| get("ACCESS_TOKEN")) {
            self.social.bearer_token = v;
        }
        if let Some(v) = get("API_KEY_SECRET") {
            self.social.consumer_secret = v;
        }
        if let Some(v) = get("BOT_USER_ID") {
            self.social.bot_user_id = v;
        }
        if let Some(v) = get("BOT_HANDLE") {
            self.social.bot_handle = v.trim_start_matches('@').to_string();
        }
        if let Some(v) = get("DUBBER_DEFAULT_LANGUAGE") {
            self.default_language = v;
        }
        if let Some(v) = get("DUBBER_EXTRACTOR_BACKEND") {
            self.extractor.backend = parse_extractor_backend(&v)?;
            // An OpenAI endpoint left over from defaults is useless to Ollama
            if self.extractor.backend == ExtractorBackend::Ollama
                && self.extractor.endpoint == ExtractorConfig::default().endpoint
            {
                self.extractor.endpoint = OLLAMA_DEFAULT_ENDPOINT.to_string();
                self.extractor.model = OLLAMA_DEFAULT_MODEL.to_string();
            }
        }
        if let Some(v) = get("DUBBER_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }

        debug!("Environment overrides applied");
        Ok(())
    }

    /// Check the values every command depends on
    pub fn validate(&self) -> Result<()> {
        self.fallback_language()?;
        if self.job.max_attempts == 0 {
            return Err(DubberError::Config("job.max_attempts must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(DubberError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The configured fallback language, resolved against the locale table
    pub fn fallback_language(&self) -> Result<Language> {
        normalize_language(&self.default_language).ok_or_else(|| {
            DubberError::Config(format!(
                "default_language '{}' is not supported",
                self.default_language
            ))
        })
    }

    /// Secrets with their values masked for display
    pub fn masked_summary(&self) -> Vec<(&'static str, String)> {
        let entries = [
            ("MURF_API_KEY", self.vendor.api_key.as_str()),
            ("OPENAI_API_KEY", self.extractor.api_key.as_str()),
            ("TWITTER_BEARER_TOKEN", self.social.bearer_token.as_str()),
            ("API_KEY_SECRET", self.social.consumer_secret.as_str()),
        ];

        entries
            .iter()
            .map(|(label, value)| (*label, mask_secret(value)))
            .collect()
    }
}

/// Parse an extractor backend name
pub fn parse_extractor_backend(value: &str) -> Result<ExtractorBackend> {
    match value.trim().to_lowercase().as_str() {
        "openai" => Ok(ExtractorBackend::OpenAI),
        "ollama" => Ok(ExtractorBackend::Ollama),
        "disabled" | "none" | "regex" => Ok(ExtractorBackend::Disabled),
        _ => Err(DubberError::Config(format!(
            "Invalid extractor backend '{}'. Valid backends: openai, ollama, disabled",
            value
        ))),
    }
}

fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        "Not Set".to_string()
    } else if value.chars().count() > 8 {
        let chars: Vec<char> = value.chars().collect();
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "set".to_string()
    }
}
