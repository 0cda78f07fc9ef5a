// src/api/mod.rs
// API Module - the processor web app's HTTP endpoints

mod csrf;
mod http;
mod types;

pub use csrf::{CookieJar, CsrfSource, DEFAULT_CSRF_COOKIE};
pub use http::{HttpApi, DEFAULT_CSRF_HEADER};
pub use types::{
    clean_response_text, ActionResponse, ApiError, JobStatus, ProgressId, StatusReport,
    UploadResponse,
};

use crate::upload::{Submission, UploadOptions};
use async_trait::async_trait;

/// Identifier of a file already stored on the server
pub type FileId = u64;

pub const UPLOAD_PATH: &str = "/app/";
pub const FILES_PATH: &str = "/app/files/";

pub fn process_path(id: impl std::fmt::Display) -> String {
    format!("/app/process/{}/", id)
}

pub fn progress_path(id: &ProgressId) -> String {
    format!("/app/progress/{}/", id)
}

pub fn delete_path(file_id: FileId) -> String {
    format!("/app/files/{}/delete/", file_id)
}

/// The remote side of the upload workflow.
///
/// `csrf` is the anti-forgery token for mutating calls; `None` means the
/// session carries no token and the request goes out without one.
#[async_trait]
pub trait ProcessorApi: Send + Sync {
    /// Send the workbook and return the server's verdict
    async fn upload(
        &self,
        submission: &Submission,
        options: &UploadOptions,
        csrf: Option<&str>,
    ) -> Result<UploadResponse, ApiError>;

    /// Ask the server to start on an uploaded job
    async fn start_processing(&self, id: &ProgressId, csrf: Option<&str>) -> Result<(), ApiError>;

    /// One status check
    async fn progress(&self, id: &ProgressId) -> Result<StatusReport, ApiError>;

    /// Process a file that is already on the server
    async fn process_file(
        &self,
        file_id: FileId,
        csrf: Option<&str>,
    ) -> Result<ActionResponse, ApiError>;

    /// Remove a stored file
    async fn delete_file(&self, file_id: FileId, csrf: Option<&str>) -> Result<(), ApiError>;

    /// Where requests go, for logs
    fn name(&self) -> &str;
}
