use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::VendorConfig;
use crate::error::{Result, DubberError};
use super::{DubbingVendor, JobSubmission, StatusPayload};

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VendorErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Murf dubbing API client
pub struct MurfClient {
    client: Client,
    config: VendorConfig,
}

impl MurfClient {
    pub fn new(config: VendorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DubberError::Config(
                "MURF_API_KEY is not set (vendor.api_key)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl DubbingVendor for MurfClient {
    async fn submit_job(&self, submission: JobSubmission) -> Result<String> {
        let size = submission.bytes.len();
        let part = Part::bytes(submission.bytes)
            .file_name(submission.file_name.clone())
            .mime_str(mime_for(&submission.file_name))?;

        let form = Form::new()
            .part("file", part)
            .text("file_name", submission.file_name.clone())
            .text("priority", submission.priority.clone())
            .text("target_locales", submission.target_locale.clone());

        info!(
            "Creating dubbing job for {} ({} bytes, locale {})",
            submission.file_name, size, submission.target_locale
        );

        let response = self
            .client
            .post(self.url("jobs/create"))
            .header("api-key", &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DubberError::VendorRejected(format!("job submission failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DubberError::VendorRejected(format!(
                "HTTP {}: {}",
                status,
                vendor_error_message(&body)
            )));
        }

        parse_job_id(&body)
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusPayload> {
        let response = self
            .client
            .get(self.url(&format!("jobs/{}/status", job_id)))
            .header("api-key", &self.config.api_key)
            .send()
            .await?
            .error_for_status()?;

        let payload: StatusPayload = response.json().await?;
        debug!("Job {} status payload: {:?}", job_id, payload);
        Ok(payload)
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".mov") {
        "video/quicktime"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".mkv") {
        "video/x-matroska"
    } else {
        "video/mp4"
    }
}

/// Job id from a successful create response
fn parse_job_id(body: &str) -> Result<String> {
    let parsed: CreateJobResponse = serde_json::from_str(body)
        .map_err(|_| DubberError::VendorRejected(format!("Unexpected response from vendor: {}", truncate(body, 200))))?;

    parsed
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| DubberError::VendorRejected(format!("Unexpected response from vendor: {}", truncate(body, 200))))
}

/// Vendor's own message from an error body, falling back to the raw text
fn vendor_error_message(body: &str) -> String {
    serde_json::from_str::<VendorErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error_message).or(b.error))
        .unwrap_or_else(|| truncate(body, 200))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
