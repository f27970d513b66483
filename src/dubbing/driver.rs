use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::error::{Result, DubberError};
use crate::language::normalize_language;
use crate::media::FetchedMedia;
use super::{DubJob, DubbingVendor, JobStatus, JobSubmission, StatusReport};

/// Fixed-interval polling budget. `interval * max_attempts` is the whole
/// driver timeout; there is no per-call deadline on top of it.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 120,
        }
    }
}

impl From<&JobConfig> for PollPolicy {
    fn from(config: &JobConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Drives a single (video, language) submission to a result URL.
///
/// Submission happens once and is never retried. Status polls that fail at
/// the transport level are logged and spend one attempt; only a vendor
/// verdict or an exhausted budget ends the loop.
#[derive(Clone)]
pub struct JobDriver {
    vendor: Arc<dyn DubbingVendor>,
    policy: PollPolicy,
    priority: String,
}

impl JobDriver {
    pub fn new(vendor: Arc<dyn DubbingVendor>, policy: PollPolicy, priority: impl Into<String>) -> Self {
        Self {
            vendor,
            policy,
            priority: priority.into(),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submit `media` for dubbing into `language` and wait for the result URL.
    pub async fn submit_and_await(&self, media: &FetchedMedia, language: &str) -> Result<String> {
        // Locale lookup precedes any upload
        let language = normalize_language(language)
            .ok_or_else(|| DubberError::UnsupportedLanguage(language.trim().to_string()))?;

        let submission = JobSubmission {
            file_name: media.file_name.clone(),
            bytes: media.bytes.clone(),
            target_locale: language.locale_code().to_string(),
            priority: self.priority.clone(),
        };

        let job_id = self.vendor.submit_job(submission).await?;
        info!("Created dubbing job {} ({})", job_id, language.locale_code());

        let job = self.await_job(DubJob::submitted(job_id)).await;
        match job.status {
            JobStatus::Completed => job
                .result_url
                .ok_or_else(|| DubberError::VendorFailed("completed but no download details".to_string())),
            JobStatus::TimedOut => Err(DubberError::Timeout {
                job_id: job.job_id,
                attempts: self.policy.max_attempts,
            }),
            _ => Err(DubberError::VendorFailed(
                job.failure_reason.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }

    /// Poll an already-submitted job until it reaches a terminal state
    pub async fn await_job(&self, mut job: DubJob) -> DubJob {
        for attempt in 1..=self.policy.max_attempts {
            match self.vendor.job_status(&job.job_id).await {
                Ok(payload) => match payload.into_report() {
                    Ok(StatusReport::Completed { download_url }) => {
                        info!("Job {} completed after {} status checks", job.job_id, attempt);
                        job.transition(JobStatus::Completed, Some(download_url), None);
                        return job;
                    }
                    Ok(StatusReport::Failed { reason }) => {
                        warn!("Job {} failed: {}", job.job_id, reason);
                        job.transition(JobStatus::Failed, None, Some(reason));
                        return job;
                    }
                    Ok(StatusReport::Pending) => {
                        job.transition(JobStatus::Pending, None, None);
                    }
                    Ok(StatusReport::Running) => {
                        job.transition(JobStatus::Running, None, None);
                    }
                    Ok(StatusReport::Unrecognized(status)) => {
                        warn!("Job {} reported unrecognized status '{}'", job.job_id, status);
                    }
                    Err(e) => {
                        warn!("Job {} reported an unusable result: {}", job.job_id, e);
                        let reason = match e {
                            DubberError::VendorFailed(reason) => reason,
                            other => other.to_string(),
                        };
                        job.transition(JobStatus::Failed, None, Some(reason));
                        return job;
                    }
                },
                Err(e) => {
                    warn!(
                        "Status check {}/{} for job {} failed: {}",
                        attempt, self.policy.max_attempts, job.job_id, e
                    );
                }
            }

            debug!("Job {} is {} (check {}/{})", job.job_id, job.status, attempt, self.policy.max_attempts);
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        warn!(
            "Job {} still not finished after {} status checks",
            job.job_id, self.policy.max_attempts
        );
        job.transition(JobStatus::TimedOut, None, Some("status polling budget exhausted".to_string()));
        job
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dubbing::{MockDubbingVendor, StatusPayload};

    fn media() -> FetchedMedia {
        FetchedMedia {
            file_name: "video_1.mp4".to_string(),
            bytes: vec![0u8; 16],
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 120,
        }
    }

    fn status(json: &str) -> StatusPayload {
        serde_json::from_str(json).unwrap()
    }

    fn driver(vendor: MockDubbingVendor) -> JobDriver {
        JobDriver::new(Arc::new(vendor), fast_policy(), "LOW")
    }

    fn network_error() -> DubberError {
        DubberError::Social("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_completes_after_running_polls() {
        let mut vendor = MockDubbingVendor::new();
        vendor
            .expect_submit_job()
            .withf(|s| s.target_locale == "ko_KR" && s.priority == "LOW" && s.file_name == "video_1.mp4")
            .times(1)
            .returning(|_| Ok("job-42".to_string()));

        let mut polls = 0;
        vendor
            .expect_job_status()
            .withf(|id| id == "job-42")
            .times(6)
            .returning(move |_| {
                polls += 1;
                if polls <= 5 {
                    Ok(status(r#"{"status":"RUNNING"}"#))
                } else {
                    Ok(status(
                        r#"{"status":"COMPLETED","download_details":[{"download_url":"https://cdn/dub.mp4"}]}"#,
                    ))
                }
            });

        let url = driver(vendor).submit_and_await(&media(), "Korean").await.unwrap();
        assert_eq!(url, "https://cdn/dub.mp4");
    }

    #[tokio::test]
    async fn test_times_out_after_exact_budget() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().times(1).returning(|_| Ok("job-slow".to_string()));
        vendor
            .expect_job_status()
            .times(120)
            .returning(|_| Ok(status(r#"{"status":"RUNNING"}"#)));

        let err = driver(vendor).submit_and_await(&media(), "es").await.unwrap_err();
        match err {
            DubberError::Timeout { job_id, attempts } => {
                assert_eq!(job_id, "job-slow");
                assert_eq!(attempts, 120);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completed_without_download_is_vendor_failure() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().returning(|_| Ok("job-1".to_string()));
        vendor
            .expect_job_status()
            .times(1)
            .returning(|_| Ok(status(r#"{"status":"COMPLETED","download_details":[]}"#)));

        let err = driver(vendor).submit_and_await(&media(), "French").await.unwrap_err();
        assert!(matches!(err, DubberError::VendorFailed(ref m) if m == "completed but no download details"));
    }

    #[tokio::test]
    async fn test_failed_job_carries_vendor_reason() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().returning(|_| Ok("job-1".to_string()));
        vendor
            .expect_job_status()
            .times(1)
            .returning(|_| Ok(status(r#"{"status":"FAILED","failure_reason":"No speech detected"}"#)));

        let err = driver(vendor).submit_and_await(&media(), "German").await.unwrap_err();
        assert!(matches!(err, DubberError::VendorFailed(ref m) if m == "No speech detected"));
    }

    #[tokio::test]
    async fn test_unsupported_language_makes_no_calls() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().times(0);
        vendor.expect_job_status().times(0);

        let err = driver(vendor).submit_and_await(&media(), "Klingon").await.unwrap_err();
        assert!(matches!(err, DubberError::UnsupportedLanguage(ref l) if l == "Klingon"));
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_polled() {
        let mut vendor = MockDubbingVendor::new();
        vendor
            .expect_submit_job()
            .times(1)
            .returning(|_| Err(DubberError::VendorRejected("HTTP 413: File too large".to_string())));
        vendor.expect_job_status().times(0);

        let err = driver(vendor).submit_and_await(&media(), "Hindi").await.unwrap_err();
        assert!(matches!(err, DubberError::VendorRejected(_)));
    }

    #[tokio::test]
    async fn test_poll_errors_are_absorbed() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().returning(|_| Ok("job-flaky".to_string()));

        let mut polls = 0;
        vendor.expect_job_status().times(4).returning(move |_| {
            polls += 1;
            match polls {
                1 | 3 => Err(network_error()),
                2 => Ok(status(r#"{"status":"PENDING"}"#)),
                _ => Ok(status(
                    r#"{"status":"COMPLETED","download_details":[{"download_url":"https://cdn/ok.mp4"}]}"#,
                )),
            }
        });

        let url = driver(vendor).submit_and_await(&media(), "ja").await.unwrap();
        assert_eq!(url, "https://cdn/ok.mp4");
    }

    #[tokio::test]
    async fn test_poll_errors_still_spend_budget() {
        let mut vendor = MockDubbingVendor::new();
        vendor.expect_submit_job().returning(|_| Ok("job-down".to_string()));
        vendor
            .expect_job_status()
            .times(5)
            .returning(|_| Err(network_error()));

        let driver = JobDriver::new(
            Arc::new(vendor),
            PollPolicy {
                interval: Duration::ZERO,
                max_attempts: 5,
            },
            "LOW",
        );

        let err = driver.submit_and_await(&media(), "zh").await.unwrap_err();
        assert!(matches!(err, DubberError::Timeout { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_await_job_records_terminal_state() {
        let mut vendor = MockDubbingVendor::new();
        vendor
            .expect_job_status()
            .times(2)
            .returning(|_| Ok(status(r#"{"status":"RUNNING"}"#)));

        let driver = JobDriver::new(
            Arc::new(vendor),
            PollPolicy {
                interval: Duration::ZERO,
                max_attempts: 2,
            },
            "LOW",
        );

        let job = driver.await_job(DubJob::submitted("job-9".to_string())).await;
        assert_eq!(job.status, JobStatus::TimedOut);
        assert!(job.result_url.is_none());
    }
}
