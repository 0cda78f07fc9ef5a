use super::retry::RetryPolicy;
use super::{metrics, ControllerError, JobOutcome, UploadController, RELOAD_AFTER_COMPLETE};
use crate::api::{JobStatus, ProgressId, StatusReport};
use crate::ui::{AlertKind, JobProgress};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TRANSIENT_RETRIES: u8 = 3;

/// Pacing and limits of the status loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Gap between one answer and the next check
    pub interval: Duration,
    /// Give up after this many checks. `None` polls until a final status.
    pub max_attempts: Option<u32>,
    /// Consecutive transport failures tolerated before giving up
    pub transient_retries: u8,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
        }
    }
}

impl PollPolicy {
    /// True once `attempts` checks used up the budget. Never true when unbounded.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

impl UploadController {
    /// Check the job until it completes, fails, or `cancel` fires.
    ///
    /// Checks never overlap: the next one is scheduled only after the
    /// previous answer was handled.
    pub async fn poll_status(
        &self,
        progress_id: &ProgressId,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ControllerError> {
        let retry = RetryPolicy::new(self.policy.transient_retries, self.policy.interval);
        let mut attempts: u32 = 0;
        let mut failures: u8 = 0;

        tracing::info!(
            "Polling job {} every {}ms",
            progress_id,
            self.policy.interval.as_millis()
        );

        loop {
            attempts = attempts.saturating_add(1);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.on_cancelled(progress_id)),
                result = self.api.progress(progress_id) => result,
            };

            let delay = match result {
                Ok(report) => {
                    self.record(metrics::PROGRESS, true);
                    failures = 0;

                    match report.status {
                        JobStatus::Completed => return Ok(self.on_completed(progress_id, report)),
                        JobStatus::Failed => return Ok(self.on_failed(progress_id, report)),
                        _ => {
                            tracing::debug!(
                                "Job {} still {} (check {})",
                                progress_id,
                                report.status,
                                attempts
                            );
                            self.ui.progress(JobProgress {
                                progress_id: progress_id.to_string(),
                                status: report.status,
                                percent: report.progress,
                                message: report.message,
                            });
                        }
                    }

                    if self.policy.exhausted(attempts) {
                        return Err(self.on_timed_out(progress_id, attempts));
                    }
                    self.policy.interval
                }
                Err(e) => {
                    self.record(metrics::PROGRESS, false);
                    if !retry.should_retry(failures, &e) {
                        tracing::error!("Giving up on job {} after check {}: {}", progress_id, attempts, e);
                        self.ui.release_submit();
                        self.ui.show_alert(
                            AlertKind::Danger,
                            format!("Lost contact with the server: {}", e),
                        );
                        return Err(ControllerError::PollTransportError(e));
                    }

                    let delay = retry.backoff(failures);
                    tracing::warn!(
                        "Status check {} for job {} failed: {}; retrying in {}ms",
                        attempts,
                        progress_id,
                        e,
                        delay.as_millis()
                    );
                    failures += 1;
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.on_cancelled(progress_id)),
                _ = sleep(delay) => {}
            }
        }
    }

    fn on_completed(&self, progress_id: &ProgressId, report: StatusReport) -> JobOutcome {
        tracing::info!("Job {} completed", progress_id);
        self.ui.release_submit();
        self.ui.show_alert(AlertKind::Success, "Processing complete!");
        self.ui.schedule_reload(RELOAD_AFTER_COMPLETE);

        JobOutcome::Completed {
            progress_id: progress_id.clone(),
            message: report.message,
        }
    }

    fn on_failed(&self, progress_id: &ProgressId, report: StatusReport) -> JobOutcome {
        let message = report
            .message
            .unwrap_or_else(|| "Processing failed.".to_string());
        tracing::warn!("Job {} failed: {}", progress_id, message);
        self.ui.release_submit();
        self.ui
            .show_alert(AlertKind::Danger, format!("Processing failed: {}", message));

        JobOutcome::Failed {
            progress_id: progress_id.clone(),
            message,
        }
    }

    fn on_cancelled(&self, progress_id: &ProgressId) -> JobOutcome {
        tracing::info!("Stopped polling job {}", progress_id);
        self.ui.release_submit();
        JobOutcome::Cancelled
    }

    fn on_timed_out(&self, progress_id: &ProgressId, attempts: u32) -> ControllerError {
        tracing::error!("Job {} not finished after {} checks", progress_id, attempts);
        self.ui.release_submit();
        self.ui.show_alert(
            AlertKind::Danger,
            format!("Processing is taking too long; stopped after {} checks.", attempts),
        );
        ControllerError::PollTimedOut { attempts }
    }
}
