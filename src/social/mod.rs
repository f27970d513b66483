// Social platform access
//
// - twitter: X/Twitter API v2 client

pub mod twitter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use twitter::TwitterClient;

use crate::error::Result;

/// Where a mention came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Poll,
    Direct,
    Webhook,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Poll => "poll",
            Self::Direct => "direct",
            Self::Webhook => "webhook",
        };
        f.write_str(label)
    }
}

/// A post that asks the bot for a dub. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionEvent {
    pub id: String,
    pub author_handle: String,
    pub raw_text: String,
    pub source_kind: SourceKind,
    /// Status this post replies to or quotes, used as the video source when
    /// the text carries no link
    #[serde(default)]
    pub referenced_status_id: Option<String>,
}

impl MentionEvent {
    pub fn new(id: impl Into<String>, author_handle: impl Into<String>, raw_text: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            author_handle: author_handle.into(),
            raw_text: raw_text.into(),
            source_kind,
            referenced_status_id: None,
        }
    }

    pub fn with_reference(mut self, status_id: Option<String>) -> Self {
        self.referenced_status_id = status_id;
        self
    }
}

/// Platform operations the bot needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Mentions of the bot newer than `since_id`, oldest first
    async fn fetch_mentions(&self, since_id: Option<String>, max_results: u32) -> Result<Vec<MentionEvent>>;

    /// A single status by id
    async fn lookup_status(&self, status_id: &str) -> Result<MentionEvent>;

    /// Upload a video; returns the platform media id
    async fn upload_video(&self, bytes: Vec<u8>) -> Result<String>;

    /// Post a reply; returns the new status id
    async fn post_reply(&self, in_reply_to: &str, text: &str, media_id: Option<String>) -> Result<String>;
}

/// Compare two numeric status ids without parsing overflow-prone values.
/// Non-numeric ids compare lexicographically.
pub fn compare_status_ids(a: &str, b: &str) -> std::cmp::Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}
