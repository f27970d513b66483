// Dubbing job orchestration
//
// - murf: HTTP client for the dubbing vendor's job API
// - driver: submit-and-poll loop that drives one job to a terminal state

pub mod driver;
pub mod murf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use driver::{JobDriver, PollPolicy};
pub use murf::MurfClient;

use crate::error::{Result, DubberError};

/// Everything the vendor needs to create a job
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Vendor locale code, e.g. `es_ES`
    pub target_locale: String,
    pub priority: String,
}

/// Status endpoint payload, as sent by the vendor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub download_details: Vec<DownloadDetail>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadDetail {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Validated reading of a `StatusPayload`
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Pending,
    Running,
    Completed { download_url: String },
    Failed { reason: String },
    /// A status value this client does not know; treated as in progress
    Unrecognized(String),
}

impl StatusPayload {
    /// Check required fields for the reported status. A completed job with
    /// no usable download entry is itself a vendor failure.
    pub fn into_report(self) -> Result<StatusReport> {
        let status = self.status.unwrap_or_default().trim().to_uppercase();
        match status.as_str() {
            "PENDING" => Ok(StatusReport::Pending),
            "RUNNING" | "IN_PROGRESS" => Ok(StatusReport::Running),
            "COMPLETED" => self
                .download_details
                .into_iter()
                .filter_map(|d| d.download_url)
                .find(|url| !url.trim().is_empty())
                .map(|download_url| StatusReport::Completed { download_url })
                .ok_or_else(|| {
                    DubberError::VendorFailed("completed but no download details".to_string())
                }),
            "FAILED" => Ok(StatusReport::Failed {
                reason: self
                    .failure_reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            }),
            _ => Ok(StatusReport::Unrecognized(status)),
        }
    }
}

/// Dubbing job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
        };
        f.write_str(label)
    }
}

/// One vendor job. Only the driver mutates it; once terminal it is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DubJob {
    pub job_id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub failure_reason: Option<String>,
}

impl DubJob {
    pub fn submitted(job_id: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            result_url: None,
            failure_reason: None,
        }
    }

    /// Apply an observed status. Returns false when the job was already
    /// terminal and the observation was ignored.
    pub fn transition(&mut self, status: JobStatus, result_url: Option<String>, failure_reason: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if status == JobStatus::Completed {
            self.result_url = result_url;
        }
        if matches!(status, JobStatus::Failed | JobStatus::TimedOut) {
            self.failure_reason = failure_reason;
        }
        true
    }
}

/// External dub-rendering service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DubbingVendor: Send + Sync {
    /// Create a job; returns the vendor job id. Must not be retried.
    async fn submit_job(&self, submission: JobSubmission) -> Result<String>;

    /// Fetch the current job status
    async fn job_status(&self, job_id: &str) -> Result<StatusPayload>;
}
