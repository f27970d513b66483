// OpenAI-compatible chat completions backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::error::{Result, DubberError};
use super::{build_extraction_prompt, parse_service_reply, ServiceExtraction, TextUnderstanding};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAIUnderstanding {
    client: Client,
    config: ExtractorConfig,
}

impl OpenAIUnderstanding {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextUnderstanding for OpenAIUnderstanding {
    async fn extract_fields(&self, text: &str) -> Result<ServiceExtraction> {
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": "You extract structured fields and answer with JSON only." },
                { "role": "user", "content": build_extraction_prompt(text) }
            ]
        });

        debug!("Sending extraction request to: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DubberError::Validation(format!(
                "Chat completion API error {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DubberError::Validation("Chat completion returned no content".to_string()))?;

        debug!("Raw extraction response: {}", content);
        parse_service_reply(&content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
