// Local Ollama backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::error::{Result, DubberError};
use super::{build_extraction_prompt, parse_service_reply, ServiceExtraction, TextUnderstanding};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

pub struct OllamaUnderstanding {
    client: Client,
    config: ExtractorConfig,
}

impl OllamaUnderstanding {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextUnderstanding for OllamaUnderstanding {
    async fn extract_fields(&self, text: &str) -> Result<ServiceExtraction> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: build_extraction_prompt(text),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending extraction request to: {}", url);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DubberError::Validation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await?;
        debug!("Raw Ollama response: {}", generated.response);

        if generated.response.trim().is_empty() {
            return Err(DubberError::Validation("Empty extraction received".to_string()));
        }

        parse_service_reply(&generated.response)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
