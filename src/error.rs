use thiserror::Error;

use crate::language::Language;

#[derive(Error, Debug)]
pub enum DubberError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Dubbing vendor rejected the job: {0}")]
    VendorRejected(String),

    #[error("Dubbing vendor failed: {0}")]
    VendorFailed(String),

    #[error("Dubbing job {job_id} did not finish after {attempts} status checks")]
    Timeout { job_id: String, attempts: u32 },

    #[error("Social platform error: {0}")]
    Social(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("State store error: {0}")]
    State(String),
}

impl DubberError {
    /// Short machine-readable code used in structured HTTP errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UnsupportedLanguage(_) => "unsupported_language",
            Self::Download(_) => "download_error",
            Self::VendorRejected(_) => "vendor_rejected",
            Self::VendorFailed(_) => "vendor_failed",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config_error",
            Self::Social(_) => "social_error",
            _ => "internal_error",
        }
    }

    /// Requester-facing text. Never carries internal detail for
    /// infrastructure failures.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::UnsupportedLanguage(lang) => format!(
                "Sorry, I can't dub into \"{}\" yet. Supported languages: {}.",
                lang,
                Language::supported_names().join(", ")
            ),
            Self::Download(_) => {
                "I couldn't download that video. The video might be private or unavailable.".to_string()
            }
            Self::VendorRejected(msg) | Self::VendorFailed(msg) => {
                format!("The dubbing service couldn't process this video: {}", msg)
            }
            Self::Timeout { .. } => {
                "Dubbing is taking longer than expected. The video may be too large or the service slow; please try again later.".to_string()
            }
            _ => "Something went wrong while dubbing this video. Please try again later.".to_string(),
        }
    }

    /// Network-level faults that an idempotent read may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DubberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_vendor_failure() {
        let timeout = DubberError::Timeout { job_id: "job-1".to_string(), attempts: 120 };
        let failed = DubberError::VendorFailed("boom".to_string());

        assert_eq!(timeout.code(), "timeout");
        assert_eq!(failed.code(), "vendor_failed");
        assert!(timeout.user_message().contains("too large"));
        assert!(failed.user_message().contains("boom"));
    }

    #[test]
    fn test_download_message_hints_private_video() {
        let err = DubberError::Download("yt-dlp exited with status 1: ERROR".to_string());
        let message = err.user_message();

        assert!(message.contains("might be private"));
        assert!(!message.contains("yt-dlp"));
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = DubberError::State("disk full at /var/lib".to_string());
        assert!(!err.user_message().contains("/var/lib"));
        assert_eq!(err.code(), "internal_error");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_unsupported_language_lists_supported() {
        let err = DubberError::UnsupportedLanguage("Klingon".to_string());
        let message = err.user_message();
        assert!(message.contains("Klingon"));
        assert!(message.contains("Korean"));
    }
}
