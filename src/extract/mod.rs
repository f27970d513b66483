// Language/URL extraction
//
// Mention text is turned into a (language, source url) pair in two passes:
// - patterns: deterministic regex guesses for the status link and language
// - a text-understanding service asked for strict JSON, whose fields win
//   whenever they are present and valid
//
// Service backends:
// - OpenAI: OpenAI-compatible chat completions
// - Ollama: local Ollama generate API

pub mod ollama;
pub mod openai;
pub mod patterns;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ExtractorBackend, ExtractorConfig};
use crate::error::Result;
use crate::language::normalize_language;

/// Fields a text-understanding service returns for a mention
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceExtraction {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, rename = "tweetUrl")]
    pub tweet_url: Option<String>,
}

/// Extractor output. `None` fields mean the caller cannot proceed and should
/// tell the requester what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub language: Option<String>,
    pub source_url: Option<String>,
}

/// Best-effort structured reading of free-form mention text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextUnderstanding: Send + Sync {
    /// Ask the service for `{language, tweetUrl}` as strict JSON
    async fn extract_fields(&self, text: &str) -> Result<ServiceExtraction>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Factory for creating text-understanding backends
pub struct TextUnderstandingFactory;

impl TextUnderstandingFactory {
    /// `None` when the backend is disabled
    pub fn create(config: &ExtractorConfig) -> Result<Option<Arc<dyn TextUnderstanding>>> {
        match config.backend {
            ExtractorBackend::OpenAI => {
                if config.api_key.is_empty() {
                    warn!("OpenAI extractor selected without an API key; using pattern matching only");
                    return Ok(None);
                }
                Ok(Some(Arc::new(openai::OpenAIUnderstanding::new(config.clone())?)))
            }
            ExtractorBackend::Ollama => Ok(Some(Arc::new(ollama::OllamaUnderstanding::new(config.clone())?))),
            ExtractorBackend::Disabled => Ok(None),
        }
    }
}

/// Shared prompt for every backend
pub(crate) fn build_extraction_prompt(text: &str) -> String {
    format!(
        "You read social media posts that ask a bot to dub a video into another language.\n\
         \n\
         Extract two fields from the post:\n\
         - language: the target language the user wants, as an English language name (e.g. \"Spanish\"), or null\n\
         - tweetUrl: the full URL of the post containing the video, or null\n\
         \n\
         Return ONLY strict JSON in the form {{\"language\": ..., \"tweetUrl\": ...}}.\n\
         Do not add explanations.\n\
         \n\
         [Post]\n\
         {}",
        text
    )
}

/// Parse a service reply body, tolerating code fences around the JSON
pub(crate) fn parse_service_reply(raw: &str) -> Result<ServiceExtraction> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    Ok(serde_json::from_str(trimmed)?)
}

/// Hybrid pattern + service extractor. Never fails.
#[derive(Clone)]
pub struct Extractor {
    service: Option<Arc<dyn TextUnderstanding>>,
}

impl Extractor {
    pub fn new(service: Option<Arc<dyn TextUnderstanding>>) -> Self {
        Self { service }
    }

    /// Pattern matching only
    pub fn patterns_only() -> Self {
        Self { service: None }
    }

    pub async fn extract(&self, text: &str) -> Extraction {
        let url_guess = patterns::find_status_url(text);
        let language_guess = patterns::guess_language(text).map(|l| l.name().to_string());
        debug!("Pattern guesses: language={:?}, url={:?}", language_guess, url_guess);

        let service = match &self.service {
            Some(service) if !text.trim().is_empty() => service,
            _ => {
                return Extraction {
                    language: language_guess,
                    source_url: url_guess,
                };
            }
        };

        match service.extract_fields(text).await {
            Ok(fields) => {
                debug!("{} extraction: {:?}", service.name(), fields);
                let service_language = fields
                    .language
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("null"));
                // A recognizable pattern guess beats a service answer we can't resolve
                let language = match service_language {
                    Some(l) if normalize_language(&l).is_some() => Some(l),
                    Some(l) => language_guess.or(Some(l)),
                    None => language_guess,
                };
                let source_url = fields
                    .tweet_url
                    .map(|u| u.trim().to_string())
                    .filter(|u| patterns::is_http_url(u))
                    .or(url_guess);
                Extraction { language, source_url }
            }
            Err(e) => {
                warn!("{} extraction failed, using pattern guesses: {}", service.name(), e);
                Extraction {
                    language: language_guess,
                    source_url: url_guess,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DubberError;

    const MENTION: &str = "please dub this in ko https://x.com/user/status/123";

    fn extractor_with(mock: MockTextUnderstanding) -> Extractor {
        Extractor::new(Some(Arc::new(mock)))
    }

    #[tokio::test]
    async fn test_patterns_work_when_service_fails() {
        let mut mock = MockTextUnderstanding::new();
        mock.expect_name().return_const("mock");
        mock.expect_extract_fields()
            .times(1)
            .returning(|_| Err(DubberError::Json(serde_json::from_str::<()>("{").unwrap_err())));

        let extraction = extractor_with(mock).extract(MENTION).await;

        assert_eq!(extraction.language.as_deref(), Some("Korean"));
        assert_eq!(extraction.source_url.as_deref(), Some("https://x.com/user/status/123"));
    }

    #[tokio::test]
    async fn test_service_fields_win() {
        let mut mock = MockTextUnderstanding::new();
        mock.expect_name().return_const("mock");
        mock.expect_extract_fields().returning(|_| {
            Ok(ServiceExtraction {
                language: Some("Spanish".to_string()),
                tweet_url: Some("https://twitter.com/other/status/999".to_string()),
            })
        });

        let extraction = extractor_with(mock).extract(MENTION).await;

        assert_eq!(extraction.language.as_deref(), Some("Spanish"));
        assert_eq!(extraction.source_url.as_deref(), Some("https://twitter.com/other/status/999"));
    }

    #[tokio::test]
    async fn test_omitted_or_invalid_service_fields_fall_back() {
        let mut mock = MockTextUnderstanding::new();
        mock.expect_name().return_const("mock");
        mock.expect_extract_fields().returning(|_| {
            Ok(ServiceExtraction {
                language: None,
                tweet_url: Some("not a url".to_string()),
            })
        });

        let extraction = extractor_with(mock).extract(MENTION).await;

        assert_eq!(extraction.language.as_deref(), Some("Korean"));
        assert_eq!(extraction.source_url.as_deref(), Some("https://x.com/user/status/123"));
    }

    #[tokio::test]
    async fn test_unresolvable_service_language_yields_to_guess() {
        let mut mock = MockTextUnderstanding::new();
        mock.expect_name().return_const("mock");
        mock.expect_extract_fields().returning(|_| {
            Ok(ServiceExtraction {
                language: Some("Korean language".to_string()),
                tweet_url: None,
            })
        });

        let extraction = extractor_with(mock).extract(MENTION).await;
        assert_eq!(extraction.language.as_deref(), Some("Korean"));

        // Without a guess the raw answer is kept so the caller can report it
        let mut mock = MockTextUnderstanding::new();
        mock.expect_name().return_const("mock");
        mock.expect_extract_fields().returning(|_| {
            Ok(ServiceExtraction {
                language: Some("Klingon".to_string()),
                tweet_url: None,
            })
        });

        let extraction = extractor_with(mock).extract("dub https://x.com/user/status/123").await;
        assert_eq!(extraction.language.as_deref(), Some("Klingon"));
    }

    #[tokio::test]
    async fn test_empty_text_skips_service() {
        let mut mock = MockTextUnderstanding::new();
        mock.expect_extract_fields().times(0);

        let extraction = extractor_with(mock).extract("   ").await;
        assert_eq!(extraction, Extraction::default());
    }

    #[tokio::test]
    async fn test_patterns_only() {
        let extraction = Extractor::patterns_only().extract("dub to French").await;
        assert_eq!(extraction.language.as_deref(), Some("French"));
        assert_eq!(extraction.source_url, None);
    }

    #[test]
    fn test_parse_service_reply() {
        let parsed = parse_service_reply("```json\n{\"language\":\"German\",\"tweetUrl\":null}\n```").unwrap();
        assert_eq!(parsed.language.as_deref(), Some("German"));
        assert_eq!(parsed.tweet_url, None);

        assert!(parse_service_reply("Sure! The language is German").is_err());
    }

    #[test]
    fn test_disabled_backend_creates_nothing() {
        let config = ExtractorConfig {
            backend: ExtractorBackend::Disabled,
            ..ExtractorConfig::default()
        };
        assert!(TextUnderstandingFactory::create(&config).unwrap().is_none());
    }
}
