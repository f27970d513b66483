// Mention source adapters
//
// Every origin produces the same `MentionEvent`:
// - MentionPoller: mentions feed bounded by the persisted cursor
// - DirectSource: single status lookup by id
// - webhook: push payload normalization and CRC challenge answers

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DubberError, Result};
use crate::social::{MentionEvent, SocialClient, SourceKind, compare_status_ids};
use crate::state::{MarkerStatus, StateStore};

type HmacSha256 = Hmac<Sha256>;

/// One scan of the mentions feed
#[derive(Debug, Clone, Default)]
pub struct MentionBatch {
    /// Unprocessed mentions, oldest first
    pub events: Vec<MentionEvent>,
    /// Newest id seen in the scan, including skipped mentions
    pub newest_id: Option<String>,
}

/// Timer-driven adapter over the mentions feed
pub struct MentionPoller {
    social: Arc<dyn SocialClient>,
    state: Arc<StateStore>,
    bot_handle: String,
    max_results: u32,
}

impl MentionPoller {
    pub fn new(social: Arc<dyn SocialClient>, state: Arc<StateStore>, bot_handle: impl Into<String>, max_results: u32) -> Self {
        Self {
            social,
            state,
            bot_handle: bot_handle.into(),
            max_results,
        }
    }

    /// Fetch mentions newer than the cursor, dropping those already marked
    /// and the bot's own posts
    pub async fn fetch_batch(&self) -> Result<MentionBatch> {
        let since = self.state.cursor().await;
        let fetched = self.social.fetch_mentions(since.clone(), self.max_results).await?;
        let fetched_count = fetched.len();

        let newest_id = fetched
            .iter()
            .map(|m| m.id.as_str())
            .max_by(|a, b| compare_status_ids(a, b))
            .map(str::to_string);

        let mut events = Vec::with_capacity(fetched.len());
        for mention in fetched {
            if self.state.is_processed(&mention.id).await {
                debug!("Skipping already processed mention {}", mention.id);
                continue;
            }
            if is_own_event(&mention, &self.bot_handle) {
                debug!("Skipping own post {}", mention.id);
                self.state.mark(&mention.id, MarkerStatus::Skipped).await?;
                continue;
            }
            events.push(mention);
        }

        info!(
            "Mention scan since {:?}: {} new of {} fetched",
            since,
            events.len(),
            fetched_count
        );
        Ok(MentionBatch { events, newest_id })
    }

    /// Advance the cursor once every event in `batch` was handled
    pub async fn commit(&self, batch: &MentionBatch) -> Result<()> {
        if let Some(newest) = &batch.newest_id {
            self.state.advance_cursor(newest).await?;
        }
        Ok(())
    }
}

/// Single-item lookup adapter
pub struct DirectSource {
    social: Arc<dyn SocialClient>,
}

impl DirectSource {
    pub fn new(social: Arc<dyn SocialClient>) -> Self {
        Self { social }
    }

    pub async fn lookup(&self, status_id: &str) -> Result<MentionEvent> {
        let status_id = status_id.trim();
        if status_id.is_empty() || !status_id.bytes().all(|c| c.is_ascii_digit()) {
            return Err(DubberError::Validation(format!("'{}' is not a status id", status_id)));
        }
        let mut event = self.social.lookup_status(status_id).await?;
        event.source_kind = SourceKind::Direct;
        Ok(event)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlexibleId {
    Text(String),
    Number(u64),
}

impl FlexibleId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebhookUser {
    #[serde(default)]
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct WebhookTweet {
    id_str: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: WebhookUser,
    #[serde(default)]
    in_reply_to_status_id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookPayload {
    Simple {
        id: FlexibleId,
        text: String,
        #[serde(default)]
        screen_name: String,
    },
    // Account activity deliveries without tweet events normalize to nothing
    Activity {
        #[serde(default)]
        tweet_create_events: Vec<WebhookTweet>,
    },
}

/// Normalize a webhook body in either supported shape
pub fn normalize_webhook_payload(body: &[u8]) -> Result<Vec<MentionEvent>> {
    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| DubberError::Validation(format!("malformed webhook payload: {}", e)))?;

    let events = match payload {
        WebhookPayload::Simple { id, text, screen_name } => {
            vec![MentionEvent::new(id.into_string(), screen_name, text, SourceKind::Webhook)]
        }
        WebhookPayload::Activity { tweet_create_events } => tweet_create_events
            .into_iter()
            .map(|tweet| {
                MentionEvent::new(tweet.id_str, tweet.user.screen_name, tweet.text, SourceKind::Webhook)
                    .with_reference(tweet.in_reply_to_status_id_str)
            })
            .collect(),
    };
    Ok(events)
}

/// True when the bot authored `event`
pub fn is_own_event(event: &MentionEvent, bot_handle: &str) -> bool {
    let handle = bot_handle.trim().trim_start_matches('@');
    !handle.is_empty() && event.author_handle.trim_start_matches('@').eq_ignore_ascii_case(handle)
}

/// Answer to a webhook CRC challenge: `sha256=` + base64 HMAC-SHA256 of the
/// token keyed by the consumer secret
pub fn crc_response(crc_token: &str, consumer_secret: &str) -> Result<String> {
    if consumer_secret.is_empty() {
        return Err(DubberError::Config(
            "API_KEY_SECRET is not set (social.consumer_secret)".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(consumer_secret.as_bytes())
        .map_err(|e| DubberError::Config(format!("invalid consumer secret: {}", e)))?;
    mac.update(crc_token.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(format!("sha256={}", BASE64.encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::MockSocialClient;

    fn mention(id: &str, author: &str) -> MentionEvent {
        MentionEvent::new(id, author, "@dubbot dub in es", SourceKind::Poll)
    }

    #[test]
    fn test_crc_response_matches_known_digest() {
        let token = crc_response("The quick brown fox jumps over the lazy dog", "key").unwrap();
        assert_eq!(token, "sha256=97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn test_crc_requires_secret() {
        assert!(matches!(crc_response("t", ""), Err(DubberError::Config(_))));
    }

    #[test]
    fn test_normalize_account_activity_payload() {
        let body = br#"{
            "for_user_id": "1",
            "tweet_create_events": [
                {"id_str": "55", "text": "@dubbot french please", "user": {"screen_name": "carol"},
                 "in_reply_to_status_id_str": "50"}
            ]
        }"#;
        let events = normalize_webhook_payload(body).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "55");
        assert_eq!(events[0].author_handle, "carol");
        assert_eq!(events[0].source_kind, SourceKind::Webhook);
        assert_eq!(events[0].referenced_status_id.as_deref(), Some("50"));
    }

    #[test]
    fn test_normalize_simple_payload() {
        let events = normalize_webhook_payload(br#"{"id": 77, "text": "dub to hi", "screen_name": "dave"}"#).unwrap();
        assert_eq!(events[0].id, "77");
        assert_eq!(events[0].raw_text, "dub to hi");

        let events = normalize_webhook_payload(br#"{"id": "78", "text": "x"}"#).unwrap();
        assert_eq!(events[0].id, "78");
        assert_eq!(events[0].author_handle, "");
    }

    #[test]
    fn test_other_activity_yields_no_events() {
        let events = normalize_webhook_payload(br#"{"favorite_events": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_validation_error() {
        assert!(matches!(normalize_webhook_payload(b"not json"), Err(DubberError::Validation(_))));
        assert!(matches!(normalize_webhook_payload(b"[1,2]"), Err(DubberError::Validation(_))));
    }

    #[test]
    fn test_is_own_event() {
        assert!(is_own_event(&mention("1", "DubBot"), "@dubbot"));
        assert!(!is_own_event(&mention("1", "alice"), "dubbot"));
        assert!(!is_own_event(&mention("1", "alice"), ""));
    }

    #[tokio::test]
    async fn test_poller_filters_processed_and_own_mentions() {
        let state = Arc::new(StateStore::in_memory());
        state.mark("101", MarkerStatus::Completed).await.unwrap();
        state.advance_cursor("100").await.unwrap();

        let mut social = MockSocialClient::new();
        social
            .expect_fetch_mentions()
            .withf(|since, max| since.as_deref() == Some("100") && *max == 20)
            .times(1)
            .returning(|_, _| Ok(vec![mention("101", "alice"), mention("102", "dubbot"), mention("103", "bob")]));

        let poller = MentionPoller::new(Arc::new(social), state.clone(), "dubbot", 20);
        let batch = poller.fetch_batch().await.unwrap();

        let ids: Vec<&str> = batch.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["103"]);
        assert_eq!(batch.newest_id.as_deref(), Some("103"));

        assert_eq!(state.marker("102").await.unwrap().status, MarkerStatus::Skipped);

        // Cursor only moves on commit
        assert_eq!(state.cursor().await.as_deref(), Some("100"));
        poller.commit(&batch).await.unwrap();
        assert_eq!(state.cursor().await.as_deref(), Some("103"));
    }

    #[tokio::test]
    async fn test_direct_lookup_rejects_non_numeric_ids() {
        let mut social = MockSocialClient::new();
        social.expect_lookup_status().times(0);

        let source = DirectSource::new(Arc::new(social));
        assert!(matches!(source.lookup("abc").await, Err(DubberError::Validation(_))));
    }

    #[tokio::test]
    async fn test_direct_lookup_tags_source() {
        let mut social = MockSocialClient::new();
        social
            .expect_lookup_status()
            .times(1)
            .returning(|id| Ok(MentionEvent::new(id, "erin", "video", SourceKind::Poll)));

        let event = DirectSource::new(Arc::new(social)).lookup("42").await.unwrap();
        assert_eq!(event.source_kind, SourceKind::Direct);
        assert_eq!(event.id, "42");
    }
}
