// src/controller/mod.rs
// Upload-Process-Poll Controller

use crate::api::{ApiError, CsrfSource, FileId, ProcessorApi, ProgressId, FILES_PATH};
use crate::ui::{AlertKind, UiHandle};
use crate::upload::{self, SelectedFile, Submission, UploadOptions, ValidationError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod metrics;
pub mod poll;
pub mod retry;

#[cfg(test)]
mod tests;

pub use metrics::RequestMetrics;
pub use poll::PollPolicy;

/// Delay between a completed job and the page reload
pub const RELOAD_AFTER_COMPLETE: Duration = Duration::from_millis(1500);
/// Delay between a started process-by-id and the page reload
pub const RELOAD_AFTER_PROCESS: Duration = Duration::from_millis(2000);
/// Delay between a delete and the jump back to the file list
pub const NAVIGATE_AFTER_DELETE: Duration = Duration::from_millis(800);

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("An upload is already in progress")]
    Busy,

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Processing failed to start: {0}")]
    ProcessStartFailed(ApiError),

    #[error("Lost contact with the server: {0}")]
    PollTransportError(ApiError),

    #[error("No final status after {attempts} checks")]
    PollTimedOut { attempts: u32 },

    #[error("{0}")]
    ActionFailed(String),
}

/// How a job ended from the controller's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        progress_id: ProgressId,
        message: Option<String>,
    },
    Failed {
        progress_id: ProgressId,
        message: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Result of a confirm-gated action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    Declined,
}

/// Yes/no gate in front of destructive actions
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

#[async_trait]
impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub struct UploadController {
    api: Arc<dyn ProcessorApi>,
    csrf: Arc<dyn CsrfSource>,
    ui: UiHandle,
    policy: PollPolicy,
    metrics: Mutex<RequestMetrics>,
}

impl UploadController {
    pub fn new(
        api: Arc<dyn ProcessorApi>,
        csrf: Arc<dyn CsrfSource>,
        ui: UiHandle,
        policy: PollPolicy,
    ) -> Self {
        tracing::info!(
            "Upload controller ready: api={}, poll every {}ms",
            api.name(),
            policy.interval.as_millis()
        );

        Self {
            api,
            csrf,
            ui,
            policy,
            metrics: Mutex::new(RequestMetrics::new()),
        }
    }

    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    pub fn metrics(&self) -> RequestMetrics {
        match self.metrics.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => RequestMetrics::new(),
        }
    }

    fn record(&self, endpoint: &str, ok: bool) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record(endpoint, ok);
        }
    }

    fn token(&self) -> Option<String> {
        let token = self.csrf.csrf_token();
        if token.is_none() {
            tracing::warn!("No anti-forgery token available; sending request without one");
        }
        token
    }

    /// Full flow: validate, upload, start processing, then poll to a final status.
    ///
    /// Each step starts only after the previous one succeeded.
    pub async fn submit(
        &self,
        file: Option<SelectedFile>,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ControllerError> {
        let submission = match upload::validate(file) {
            Ok(submission) => submission,
            Err(e) => {
                self.ui.show_alert(AlertKind::Warning, e.to_string());
                return Err(e.into());
            }
        };
        tracing::info!("{}", submission.describe());

        if !self.ui.claim_submit() {
            self.ui
                .show_alert(AlertKind::Warning, "An upload is already in progress.");
            return Err(ControllerError::Busy);
        }

        let progress_id = self.submit_upload(&submission, options).await?;
        self.start_processing(&progress_id).await?;
        self.poll_status(&progress_id, cancel).await
    }

    /// Follow a job that was started elsewhere
    pub async fn watch(
        &self,
        progress_id: &ProgressId,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ControllerError> {
        if !self.ui.claim_submit() {
            return Err(ControllerError::Busy);
        }
        self.poll_status(progress_id, cancel).await
    }

    /// Send the file. The submit button stays disabled on success.
    pub async fn submit_upload(
        &self,
        submission: &Submission,
        options: &UploadOptions,
    ) -> Result<ProgressId, ControllerError> {
        let token = self.token();
        let result = self
            .api
            .upload(submission, options, token.as_deref())
            .await
            .map_err(|e| e.detail().unwrap_or_else(|| e.to_string()))
            .and_then(|response| response.accepted_id());

        match result {
            Ok(progress_id) => {
                self.record(metrics::UPLOAD, true);
                tracing::info!("Upload accepted: progress_id={}", progress_id);
                Ok(progress_id)
            }
            Err(reason) => {
                self.record(metrics::UPLOAD, false);
                tracing::warn!("Upload of {} failed: {}", submission.file_name, reason);
                self.ui.release_submit();
                self.ui.show_alert(AlertKind::Danger, "Upload failed.");
                Err(ControllerError::UploadFailed(reason))
            }
        }
    }

    /// Ask the server to process an uploaded job
    pub async fn start_processing(&self, progress_id: &ProgressId) -> Result<(), ControllerError> {
        tracing::info!("Sending process request for progress_id {}", progress_id);
        let token = self.token();

        match self.api.start_processing(progress_id, token.as_deref()).await {
            Ok(()) => {
                self.record(metrics::PROCESS, true);
                Ok(())
            }
            Err(e) => {
                self.record(metrics::PROCESS, false);
                tracing::warn!("Process request for {} failed: {}", progress_id, e);
                self.ui
                    .show_alert(AlertKind::Danger, "Processing failed to start.");
                self.ui.release_submit();
                Err(ControllerError::ProcessStartFailed(e))
            }
        }
    }

    /// Delete a stored file after confirmation
    pub async fn delete_file(
        &self,
        file_id: FileId,
        file_name: &str,
        confirm: &dyn Confirm,
    ) -> Result<ActionOutcome, ControllerError> {
        let prompt = format!(
            "Are you sure you want to delete \"{}\"? This action cannot be undone.",
            file_name
        );
        if !confirm.confirm(&prompt).await {
            tracing::info!("Delete of file {} declined", file_id);
            return Ok(ActionOutcome::Declined);
        }

        let token = self.token();
        match self.api.delete_file(file_id, token.as_deref()).await {
            Ok(()) => {
                self.record(metrics::DELETE, true);
                self.ui
                    .show_alert(AlertKind::Success, "File deleted successfully.");
                self.ui.schedule_navigate(FILES_PATH, NAVIGATE_AFTER_DELETE);
                Ok(ActionOutcome::Done)
            }
            Err(e) => {
                self.record(metrics::DELETE, false);
                let message = match e.detail() {
                    Some(detail) => format!("Delete failed: {}", detail),
                    None => "Delete failed".to_string(),
                };
                self.ui.show_alert(AlertKind::Danger, message.clone());
                Err(ControllerError::ActionFailed(message))
            }
        }
    }

    /// Process a stored file after confirmation
    pub async fn process_file(
        &self,
        file_id: FileId,
        confirm: &dyn Confirm,
    ) -> Result<ActionOutcome, ControllerError> {
        if !confirm.confirm("Start processing this file?").await {
            tracing::info!("Processing of file {} declined", file_id);
            return Ok(ActionOutcome::Declined);
        }

        let token = self.token();
        match self.api.process_file(file_id, token.as_deref()).await {
            Ok(response) if response.success => {
                self.record(metrics::PROCESS, true);
                if let Some(message) = response.message.as_deref() {
                    tracing::info!("File {}: {}", file_id, message);
                }
                self.ui
                    .show_alert(AlertKind::Success, "Processing started successfully!");
                self.ui.schedule_reload(RELOAD_AFTER_PROCESS);
                Ok(ActionOutcome::Done)
            }
            Ok(response) => {
                self.record(metrics::PROCESS, false);
                let message = format!(
                    "Error: {}",
                    response.message.as_deref().unwrap_or("unknown error")
                );
                self.ui.show_alert(AlertKind::Danger, message.clone());
                Err(ControllerError::ActionFailed(message))
            }
            Err(e) => {
                self.record(metrics::PROCESS, false);
                tracing::warn!("Process request for file {} failed: {}", file_id, e);
                let message = "An error occurred while processing the file.";
                self.ui.show_alert(AlertKind::Danger, message);
                Err(ControllerError::ActionFailed(message.to_string()))
            }
        }
    }
}
