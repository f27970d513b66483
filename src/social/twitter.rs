use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SocialConfig;
use crate::error::{DubberError, Result};
use super::{MentionEvent, SocialClient, SourceKind};

/// Upload chunk size for APPEND requests
const UPLOAD_CHUNK_BYTES: usize = 4 * 1024 * 1024;
/// Upper bound on media processing status checks after FINALIZE
const MAX_PROCESSING_CHECKS: u32 = 60;
/// Upper bound on mention pages read in one scan
const MAX_MENTION_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<UserData>,
}

#[derive(Debug, Default, Deserialize)]
struct ListMeta {
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetListResponse {
    #[serde(default)]
    data: Vec<TweetData>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: ListMeta,
}

#[derive(Debug, Deserialize)]
struct SingleTweetResponse {
    data: TweetData,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    id: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    data: MediaData,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Serialize)]
struct ReplyRef<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Serialize)]
struct MediaRef {
    media_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    reply: ReplyRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaRef>,
}

/// X/Twitter API v2 client authenticated with an app bearer token
pub struct TwitterClient {
    client: Client,
    config: SocialConfig,
}

impl TwitterClient {
    pub fn new(config: SocialConfig) -> Result<Self> {
        if config.bearer_token.is_empty() {
            return Err(DubberError::Config(
                "TWITTER_BEARER_TOKEN is not set (social.bearer_token)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/2/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.config.bearer_token)
    }

    async fn upload_chunks(&self, media_id: &str, bytes: &[u8]) -> Result<()> {
        for (index, chunk) in bytes.chunks(UPLOAD_CHUNK_BYTES).enumerate() {
            let form = Form::new()
                .text("segment_index", index.to_string())
                .part("media", Part::bytes(chunk.to_vec()).file_name("chunk"));

            let response = self
                .authorized(self.client.post(self.url(&format!("media/upload/{}/append", media_id))))
                .multipart(form)
                .send()
                .await?;
            check_status(response, "media append").await?;
            debug!("Appended segment {} of media {}", index, media_id);
        }
        Ok(())
    }

    async fn wait_for_processing(&self, media_id: &str, mut info: Option<ProcessingInfo>) -> Result<()> {
        let mut checks = 0;
        while let Some(current) = info {
            match current.state.as_str() {
                "succeeded" => return Ok(()),
                "failed" => {
                    return Err(DubberError::Social(format!("media {} processing failed", media_id)));
                }
                _ if checks >= MAX_PROCESSING_CHECKS => {
                    return Err(DubberError::Social(format!(
                        "media {} still processing after {} checks",
                        media_id, checks
                    )));
                }
                _ => {}
            }

            tokio::time::sleep(Duration::from_secs(current.check_after_secs.unwrap_or(1))).await;
            checks += 1;

            let response = self
                .authorized(self.client.get(self.url("media/upload")))
                .query(&[("command", "STATUS"), ("media_id", media_id)])
                .send()
                .await?;
            let body = check_status(response, "media status").await?;
            let parsed: MediaResponse = serde_json::from_str(&body)?;
            info = parsed.data.processing_info;
        }
        Ok(())
    }
}

#[async_trait]
impl SocialClient for TwitterClient {
    async fn fetch_mentions(&self, since_id: Option<String>, max_results: u32) -> Result<Vec<MentionEvent>> {
        if self.config.bot_user_id.is_empty() {
            return Err(DubberError::Config(
                "BOT_USER_ID is not set (social.bot_user_id)".to_string(),
            ));
        }

        // The API accepts 5..=100
        let mut base_query = vec![
            ("max_results", max_results.clamp(5, 100).to_string()),
            ("expansions", "author_id,referenced_tweets.id".to_string()),
            ("tweet.fields", "author_id,referenced_tweets".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(since) = since_id {
            base_query.push(("since_id", since));
        }

        // Pages come newest first; every page down to `since_id` is read so the
        // caller never sees a partial window
        let url = self.url(&format!("users/{}/mentions", self.config.bot_user_id));
        let mut mentions = Vec::new();
        let mut page_token: Option<String> = None;
        for page in 1..=MAX_MENTION_PAGES {
            let mut query = base_query.clone();
            if let Some(token) = page_token.take() {
                query.push(("pagination_token", token));
            }

            let response = self.authorized(self.client.get(&url)).query(&query).send().await?;
            let body = check_status(response, "mentions lookup").await?;
            let (events, next_token) = parse_mentions_page(&body)?;
            debug!("Mentions page {}: {} events", page, events.len());
            mentions.extend(events);

            match next_token {
                Some(token) => page_token = Some(token),
                None => {
                    mentions.sort_by(|a, b| super::compare_status_ids(&a.id, &b.id));
                    debug!("Fetched {} mentions", mentions.len());
                    return Ok(mentions);
                }
            }
        }

        Err(DubberError::Social(format!(
            "mentions feed still paginating after {} pages",
            MAX_MENTION_PAGES
        )))
    }

    async fn lookup_status(&self, status_id: &str) -> Result<MentionEvent> {
        let response = self
            .authorized(self.client.get(self.url(&format!("tweets/{}", status_id))))
            .query(&[
                ("expansions", "author_id"),
                ("tweet.fields", "author_id,referenced_tweets"),
                ("user.fields", "username"),
            ])
            .send()
            .await?;
        let body = check_status(response, "status lookup").await?;
        parse_single_status(&body)
    }

    async fn upload_video(&self, bytes: Vec<u8>) -> Result<String> {
        if bytes.is_empty() {
            return Err(DubberError::Social("refusing to upload an empty video".to_string()));
        }

        let init = json!({
            "media_type": "video/mp4",
            "total_bytes": bytes.len(),
            "media_category": "tweet_video",
        });
        let response = self
            .authorized(self.client.post(self.url("media/upload/initialize")))
            .json(&init)
            .send()
            .await?;
        let body = check_status(response, "media initialize").await?;
        let media_id = serde_json::from_str::<MediaResponse>(&body)?.data.id;
        info!("Uploading {} bytes as media {}", bytes.len(), media_id);

        self.upload_chunks(&media_id, &bytes).await?;

        let response = self
            .authorized(self.client.post(self.url(&format!("media/upload/{}/finalize", media_id))))
            .send()
            .await?;
        let body = check_status(response, "media finalize").await?;
        let finalized: MediaResponse = serde_json::from_str(&body)?;

        self.wait_for_processing(&media_id, finalized.data.processing_info).await?;
        Ok(media_id)
    }

    async fn post_reply(&self, in_reply_to: &str, text: &str, media_id: Option<String>) -> Result<String> {
        let request = build_reply(in_reply_to, text, media_id);
        let response = self
            .authorized(self.client.post(self.url("tweets")))
            .json(&request)
            .send()
            .await?;
        let body = check_status(response, "reply").await?;
        let created: CreateTweetResponse = serde_json::from_str(&body)?;
        info!("Posted reply {} to {}", created.data.id, in_reply_to);
        Ok(created.data.id)
    }
}

/// Body text of a 2xx response, or a `Social` error carrying the API's answer
async fn check_status(response: Response, operation: &str) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(DubberError::Social(format!("{} failed with HTTP {}: {}", operation, status, body)))
    }
}

fn build_reply<'a>(in_reply_to: &'a str, text: &'a str, media_id: Option<String>) -> CreateTweetRequest<'a> {
    CreateTweetRequest {
        text,
        reply: ReplyRef {
            in_reply_to_tweet_id: in_reply_to,
        },
        media: media_id.map(|id| MediaRef { media_ids: vec![id] }),
    }
}

fn to_event(tweet: TweetData, handles: &HashMap<String, String>, source_kind: SourceKind) -> MentionEvent {
    let author = tweet
        .author_id
        .as_ref()
        .and_then(|id| handles.get(id))
        .cloned()
        .unwrap_or_default();
    // Prefer the post being replied to, then a quoted one
    let referenced = tweet
        .referenced_tweets
        .iter()
        .find(|r| r.kind == "replied_to")
        .or_else(|| tweet.referenced_tweets.iter().find(|r| r.kind == "quoted"))
        .map(|r| r.id.clone());

    MentionEvent::new(tweet.id, author, tweet.text, source_kind).with_reference(referenced)
}

fn handle_map(includes: Includes) -> HashMap<String, String> {
    includes.users.into_iter().map(|u| (u.id, u.username)).collect()
}

/// One page of mentions, oldest first, plus the token for the next page
fn parse_mentions_page(body: &str) -> Result<(Vec<MentionEvent>, Option<String>)> {
    let parsed: TweetListResponse = serde_json::from_str(body)?;
    let handles = handle_map(parsed.includes);

    let mut mentions: Vec<MentionEvent> = parsed
        .data
        .into_iter()
        .map(|tweet| to_event(tweet, &handles, SourceKind::Poll))
        .collect();
    mentions.sort_by(|a, b| super::compare_status_ids(&a.id, &b.id));
    let next_token = parsed.meta.next_token.filter(|t| !t.is_empty());
    Ok((mentions, next_token))
}

fn parse_single_status(body: &str) -> Result<MentionEvent> {
    let parsed: SingleTweetResponse = serde_json::from_str(body)?;
    let handles = handle_map(parsed.includes);
    Ok(to_event(parsed.data, &handles, SourceKind::Direct))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENTIONS: &str = r#"{
        "data": [
            {"id": "300", "text": "@dubbot spanish please", "author_id": "u2",
             "referenced_tweets": [{"type": "replied_to", "id": "250"}]},
            {"id": "200", "text": "@dubbot dub https://x.com/a/status/1 in ko", "author_id": "u1"}
        ],
        "includes": {"users": [{"id": "u1", "username": "alice"}, {"id": "u2", "username": "bob"}]},
        "meta": {"newest_id": "300", "result_count": 2}
    }"#;

    #[test]
    fn test_parse_mentions_oldest_first() {
        let (mentions, next_token) = parse_mentions_page(MENTIONS).unwrap();
        assert_eq!(next_token, None);

        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].id, "200");
        assert_eq!(mentions[0].author_handle, "alice");
        assert_eq!(mentions[0].referenced_status_id, None);
        assert_eq!(mentions[1].id, "300");
        assert_eq!(mentions[1].author_handle, "bob");
        assert_eq!(mentions[1].referenced_status_id.as_deref(), Some("250"));
        assert!(mentions.iter().all(|m| m.source_kind == SourceKind::Poll));
    }

    #[test]
    fn test_parse_empty_mentions() {
        let (mentions, next_token) = parse_mentions_page(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(mentions.is_empty());
        assert_eq!(next_token, None);
    }

    #[test]
    fn test_parse_single_status_prefers_replied_to() {
        let body = r#"{
            "data": {"id": "9", "text": "look", "author_id": "u1",
                     "referenced_tweets": [{"type": "quoted", "id": "7"}, {"type": "replied_to", "id": "8"}]},
            "includes": {"users": [{"id": "u1", "username": "alice"}]}
        }"#;
        let event = parse_single_status(body).unwrap();

        assert_eq!(event.source_kind, SourceKind::Direct);
        assert_eq!(event.referenced_status_id.as_deref(), Some("8"));
    }

    fn page_body(ids: std::ops::RangeInclusive<u32>, next_token: Option<&str>) -> serde_json::Value {
        let data: Vec<serde_json::Value> = ids
            .rev()
            .map(|id| json!({"id": id.to_string(), "text": "@dubbot dub in es", "author_id": "u1"}))
            .collect();
        let mut meta = json!({"result_count": data.len()});
        if let Some(token) = next_token {
            meta["next_token"] = json!(token);
        }
        json!({"data": data, "includes": {"users": [{"id": "u1", "username": "alice"}]}, "meta": meta})
    }

    #[tokio::test]
    async fn test_fetch_mentions_reads_every_page() {
        use axum::{Json, Router, extract::{Query, State}, routing::get};
        use std::sync::{Arc, Mutex};

        type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

        async fn mentions_page(
            State(seen): State<Seen>,
            Query(query): Query<HashMap<String, String>>,
        ) -> Json<serde_json::Value> {
            let body = match query.get("pagination_token").map(String::as_str) {
                Some("page2") => page_body(101..=105, None),
                _ => page_body(106..=110, Some("page2")),
            };
            seen.lock().unwrap().push(query);
            Json(body)
        }

        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/2/users/:id/mentions", get(mentions_page))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = TwitterClient::new(SocialConfig {
            api_base: format!("http://{}", addr),
            bearer_token: "token".to_string(),
            bot_user_id: "42".to_string(),
            ..SocialConfig::default()
        })
        .unwrap();
        let fetched = client.fetch_mentions(Some("100".to_string()), 5).await.unwrap();

        let ids: Vec<String> = fetched.iter().map(|m| m.id.clone()).collect();
        let expected: Vec<String> = (101..=110).map(|id: u32| id.to_string()).collect();
        assert_eq!(ids, expected);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|q| q.get("since_id").map(String::as_str) == Some("100")));
        assert_eq!(seen[1].get("pagination_token").map(String::as_str), Some("page2"));
    }

    #[test]
    fn test_reply_body() {
        let with_media = serde_json::to_value(build_reply("42", "Here you go", Some("m1".to_string()))).unwrap();
        assert_eq!(with_media["reply"]["in_reply_to_tweet_id"], "42");
        assert_eq!(with_media["media"]["media_ids"][0], "m1");

        let text_only = serde_json::to_value(build_reply("42", "Sorry", None)).unwrap();
        assert!(text_only.get("media").is_none());
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let err = TwitterClient::new(SocialConfig::default()).err().unwrap();
        assert!(matches!(err, DubberError::Config(_)));
    }
}
