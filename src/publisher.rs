use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{DubberError, Result};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::social::SocialClient;

/// Fetches a finished dub from its result URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET downloader
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResultDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DubberError::Download(format!("empty result from {}", url)));
        }
        Ok(bytes.to_vec())
    }
}

/// Where a reply goes
#[derive(Debug, Clone)]
pub struct ReplyTarget {
    pub status_id: String,
    pub handle: String,
}

impl ReplyTarget {
    pub fn new(status_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            status_id: status_id.into(),
            handle: handle.into(),
        }
    }

    fn prefix(&self) -> String {
        let handle = self.handle.trim().trim_start_matches('@');
        if handle.is_empty() {
            String::new()
        } else {
            format!("@{} ", handle)
        }
    }
}

/// Posts finished dubs as media replies and failures as text replies
pub struct ReplyPublisher {
    downloader: Arc<dyn ResultDownloader>,
    social: Arc<dyn SocialClient>,
    retry: RetryPolicy,
}

impl ReplyPublisher {
    pub fn new(downloader: Arc<dyn ResultDownloader>, social: Arc<dyn SocialClient>, retry: RetryPolicy) -> Self {
        Self {
            downloader,
            social,
            retry,
        }
    }

    /// Download `result_url`, upload it, and reply with the video.
    /// Returns the reply id.
    pub async fn publish(&self, target: &ReplyTarget, language: &str, result_url: &str) -> Result<String> {
        let bytes = retry_with_backoff(&self.retry, "result download", || self.downloader.download(result_url)).await?;
        info!("Downloaded dubbed video ({} bytes)", bytes.len());

        let media_id = self.social.upload_video(bytes).await?;
        let text = format!("{}Here's your video dubbed in {}!", target.prefix(), language);
        self.social.post_reply(&target.status_id, &text, Some(media_id)).await
    }

    /// Tell the requester why nothing is coming. Errors are logged only.
    pub async fn notify_failure(&self, target: &ReplyTarget, message: &str) {
        let text = format!("{}{}", target.prefix(), message);
        if let Err(e) = self.social.post_reply(&target.status_id, &text, None).await {
            warn!("Failed to notify requester on {}: {}", target.status_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::MockSocialClient;

    fn publisher(downloader: MockResultDownloader, social: MockSocialClient) -> ReplyPublisher {
        ReplyPublisher::new(Arc::new(downloader), Arc::new(social), RetryPolicy::new(3, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_publish_uploads_and_replies_with_media() {
        let mut downloader = MockResultDownloader::new();
        downloader
            .expect_download()
            .withf(|url: &str| url == "https://cdn.example/out.mp4")
            .times(1)
            .returning(|_| Ok(vec![1, 2, 3]));

        let mut social = MockSocialClient::new();
        social
            .expect_upload_video()
            .withf(|bytes| bytes == &vec![1u8, 2, 3])
            .times(1)
            .returning(|_| Ok("media-1".to_string()));
        social
            .expect_post_reply()
            .withf(|to: &str, text: &str, media| {
                to == "55" && text == "@alice Here's your video dubbed in Spanish!" && media.as_deref() == Some("media-1")
            })
            .times(1)
            .returning(|_, _, _| Ok("reply-1".to_string()));

        let target = ReplyTarget::new("55", "alice");
        let reply = publisher(downloader, social)
            .publish(&target, "Spanish", "https://cdn.example/out.mp4")
            .await
            .unwrap();
        assert_eq!(reply, "reply-1");
    }

    #[tokio::test]
    async fn test_failed_download_posts_nothing() {
        let mut downloader = MockResultDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_| Err(DubberError::Download("gone".to_string())));

        let mut social = MockSocialClient::new();
        social.expect_upload_video().times(0);
        social.expect_post_reply().times(0);

        let result = publisher(downloader, social)
            .publish(&ReplyTarget::new("55", "alice"), "Spanish", "https://cdn.example/out.mp4")
            .await;
        assert!(matches!(result, Err(DubberError::Download(_))));
    }

    #[tokio::test]
    async fn test_notify_failure_swallows_errors() {
        let mut social = MockSocialClient::new();
        social
            .expect_post_reply()
            .withf(|_, text: &str, media| text == "Sorry" && media.is_none())
            .times(1)
            .returning(|_, _, _| Err(DubberError::Social("rate limited".to_string())));

        publisher(MockResultDownloader::new(), social)
            .notify_failure(&ReplyTarget::new("55", ""), "Sorry")
            .await;
    }
}
