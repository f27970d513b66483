use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::dubbing::JobDriver;
use crate::error::{DubberError, Result};
use crate::extract::patterns::status_id_from_url;
use crate::extract::{Extraction, Extractor};
use crate::language::{Language, normalize_language};
use crate::media::MediaFetcher;
use crate::publisher::{ReplyPublisher, ReplyTarget};
use crate::social::{MentionEvent, SocialClient};
use crate::source::{DirectSource, MentionPoller};
use crate::state::{MarkerStatus, StateStore};

/// Fixed inputs for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Used when a mention names no language
    pub default_language: Language,
    pub bot_handle: String,
    pub max_results: u32,
}

/// A finished dub
#[derive(Debug, Clone, PartialEq)]
pub struct DubOutcome {
    pub language: Language,
    pub result_url: String,
    /// `None` when no reply was requested or posting it failed
    pub reply_id: Option<String>,
}

/// What happened to one mention
#[derive(Debug)]
pub enum MentionOutcome {
    AlreadyProcessed,
    Dubbed(DubOutcome),
    Failed(DubberError),
}

/// Totals for one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub dubbed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Operator request for a single status outside the mentions feed
#[derive(Debug, Clone, Default)]
pub struct DirectRequest {
    pub tweet_id: Option<String>,
    pub tweet_url: Option<String>,
    pub target_language: Option<String>,
    /// Reply to the looked-up status with the result
    pub reply: bool,
}

/// Per-mention orchestration: dedupe, extract, fetch, dub, publish, mark.
/// Collaborators are built once at startup and shared.
pub struct Pipeline {
    extractor: Extractor,
    fetcher: Arc<dyn MediaFetcher>,
    driver: JobDriver,
    publisher: Arc<ReplyPublisher>,
    state: Arc<StateStore>,
    poller: MentionPoller,
    direct: DirectSource,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        extractor: Extractor,
        fetcher: Arc<dyn MediaFetcher>,
        driver: JobDriver,
        publisher: Arc<ReplyPublisher>,
        social: Arc<dyn SocialClient>,
        state: Arc<StateStore>,
        settings: PipelineSettings,
    ) -> Self {
        let poller = MentionPoller::new(social.clone(), state.clone(), settings.bot_handle.clone(), settings.max_results);
        let direct = DirectSource::new(social);
        Self {
            extractor,
            fetcher,
            driver,
            publisher,
            state,
            poller,
            direct,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Handle one mention end to end. `Err` is reserved for state store
    /// failures; dub failures are reported to the requester and returned as
    /// `MentionOutcome::Failed`.
    pub async fn handle_mention(&self, event: &MentionEvent) -> Result<MentionOutcome> {
        let span = info_span!(
            "mention",
            correlation_id = %Uuid::new_v4(),
            mention_id = %event.id,
            source = %event.source_kind
        );
        self.handle_mention_inner(event).instrument(span).await
    }

    async fn handle_mention_inner(&self, event: &MentionEvent) -> Result<MentionOutcome> {
        // Marked before any dub work so a crash never yields a second reply
        if !self.state.try_claim(&event.id).await? {
            debug!("Mention {} already processed", event.id);
            return Ok(MentionOutcome::AlreadyProcessed);
        }
        info!("Handling mention from @{}: {}", event.author_handle, event.raw_text);

        let target = ReplyTarget::new(event.id.clone(), event.author_handle.clone());
        match self.dub_mention(event).await {
            Ok((language, result_url)) => {
                let reply_id = self.reply_quietly(&target, language, &result_url).await;
                self.state.mark(&event.id, MarkerStatus::Completed).await?;
                Ok(MentionOutcome::Dubbed(DubOutcome {
                    language,
                    result_url,
                    reply_id,
                }))
            }
            Err(e) => {
                warn!("Mention {} failed [{}]: {}", event.id, e.code(), e);
                self.publisher.notify_failure(&target, &e.user_message()).await;
                self.state.mark(&event.id, MarkerStatus::Failed).await?;
                Ok(MentionOutcome::Failed(e))
            }
        }
    }

    async fn dub_mention(&self, event: &MentionEvent) -> Result<(Language, String)> {
        let extraction = self.extractor.extract(&event.raw_text).await;
        let language = self.resolve_language(extraction.language.as_deref())?;
        let source_url = resolve_source_url(&extraction, event.referenced_status_id.as_deref())?;
        self.dub_url(&source_url, language).await
    }

    async fn dub_url(&self, source_url: &str, language: Language) -> Result<(Language, String)> {
        info!("Dubbing {} into {}", source_url, language);
        let media = self.fetcher.fetch(source_url).await?;
        let result_url = self.driver.submit_and_await(&media, language.name()).await?;
        info!("Dub ready: {}", result_url);
        Ok((language, result_url))
    }

    fn resolve_language(&self, requested: Option<&str>) -> Result<Language> {
        match requested {
            Some(name) => normalize_language(name).ok_or_else(|| DubberError::UnsupportedLanguage(name.to_string())),
            None => {
                debug!("No language requested, using {}", self.settings.default_language);
                Ok(self.settings.default_language)
            }
        }
    }

    /// Record a mention that will not be dubbed, such as the bot's own post
    pub async fn skip_mention(&self, event: &MentionEvent) -> Result<()> {
        debug!("Skipping mention {} from @{}", event.id, event.author_handle);
        self.state.mark(&event.id, MarkerStatus::Skipped).await
    }

    /// One scan of the mentions feed. The cursor advances only when every
    /// mention in the batch was handled.
    pub async fn run_poll_cycle(&self) -> Result<PollSummary> {
        let batch = self.poller.fetch_batch().await?;
        let mut summary = PollSummary {
            fetched: batch.events.len(),
            ..PollSummary::default()
        };

        for event in &batch.events {
            match self.handle_mention(event).await? {
                MentionOutcome::Dubbed(_) => summary.dubbed += 1,
                MentionOutcome::Failed(_) => summary.failed += 1,
                MentionOutcome::AlreadyProcessed => summary.skipped += 1,
            }
        }

        self.poller.commit(&batch).await?;
        info!(
            "Poll cycle done: {} fetched, {} dubbed, {} failed, {} skipped",
            summary.fetched, summary.dubbed, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Synchronous dub of one status, bypassing dedupe
    pub async fn dub_direct(&self, request: &DirectRequest) -> Result<DubOutcome> {
        let span = info_span!("direct", correlation_id = %Uuid::new_v4());
        self.dub_direct_inner(request).instrument(span).await
    }

    async fn dub_direct_inner(&self, request: &DirectRequest) -> Result<DubOutcome> {
        let explicit_language = request
            .target_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        if let Some(tweet_id) = request.tweet_id.as_deref().filter(|id| !id.trim().is_empty()) {
            let event = self.direct.lookup(tweet_id).await?;
            let extraction = self.extractor.extract(&event.raw_text).await;
            let language = self.resolve_language(explicit_language.or(extraction.language.as_deref()))?;
            // Without a link in the text the looked-up status itself carries the video
            let source_url = extraction
                .source_url
                .clone()
                .unwrap_or_else(|| status_url(&event.id));

            let (language, result_url) = self.dub_url(&source_url, language).await?;
            let reply_id = if request.reply {
                let target = ReplyTarget::new(event.id.clone(), event.author_handle.clone());
                self.reply_quietly(&target, language, &result_url).await
            } else {
                None
            };
            return Ok(DubOutcome {
                language,
                result_url,
                reply_id,
            });
        }

        let source_url = request
            .tweet_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DubberError::Validation("tweetId or tweetUrl is required".to_string()))?;
        let language = self.resolve_language(explicit_language)?;
        let (language, result_url) = self.dub_url(source_url, language).await?;

        let reply_id = match (request.reply, status_id_from_url(source_url)) {
            (true, Some(status_id)) => {
                self.reply_quietly(&ReplyTarget::new(status_id, ""), language, &result_url)
                    .await
            }
            (true, None) => {
                warn!("Cannot reply: {} is not a status link", source_url);
                None
            }
            (false, _) => None,
        };
        Ok(DubOutcome {
            language,
            result_url,
            reply_id,
        })
    }

    async fn reply_quietly(&self, target: &ReplyTarget, language: Language, result_url: &str) -> Option<String> {
        match self.publisher.publish(target, language.name(), result_url).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Reply to {} failed: {}", target.status_id, e);
                None
            }
        }
    }
}

fn status_url(status_id: &str) -> String {
    format!("https://twitter.com/i/status/{}", status_id)
}

/// The extracted link, else the post the mention replies to
fn resolve_source_url(extraction: &Extraction, referenced_status_id: Option<&str>) -> Result<String> {
    extraction
        .source_url
        .clone()
        .or_else(|| referenced_status_id.map(status_url))
        .ok_or_else(|| {
            DubberError::Validation(
                "I couldn't find a video to dub. Reply to the post with the video or include its link.".to_string(),
            )
        })
}
