// src/api/types.rs
// Wire Types and Error Definitions

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const MAX_DETAIL_CHARS: usize = 240;

/// Server-issued identifier correlating an upload with its processing job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProgressId(String);

impl ProgressId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProgressId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The server hands out its row id, so numbers are the common case.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => ProgressId(n.to_string()),
            Raw::Text(s) => ProgressId(s),
        })
    }
}

/// Body returned by the upload endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub progress_id: Option<ProgressId>,
    /// Form errors keyed by field name
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl UploadResponse {
    /// The progress id when the upload was accepted, otherwise a reason
    pub fn accepted_id(self) -> Result<ProgressId, String> {
        if !self.success {
            return Err(self.error_summary().unwrap_or_else(|| "server rejected the upload".into()));
        }

        match self.progress_id {
            Some(id) if !id.as_str().trim().is_empty() => Ok(id),
            _ => Err("response carried no progress id".into()),
        }
    }

    fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }

        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        Some(parts.join("; "))
    }
}

/// Processing state as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Other,
}

impl JobStatus {
    /// Returns true once no further polling should happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other => "unknown",
        };
        f.write_str(text)
    }
}

/// Body returned by the progress endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    /// Rough completion percentage (0 - 100)
    #[serde(default)]
    pub progress: Option<u32>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            message: None,
            progress: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Body returned by the process-by-id endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// API error types with retry classification
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Cannot read {path}: {reason}")]
    File { path: String, reason: String },
}

impl ApiError {
    /// Returns true if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server supplied text, cleaned up for display
    pub fn detail(&self) -> Option<String> {
        match self {
            ApiError::Status { body, .. } => {
                let cleaned = clean_response_text(body);
                (!cleaned.is_empty()).then_some(cleaned)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Strip markup from an error page and squeeze it onto one short line
pub fn clean_response_text(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static NOISE_RE: OnceLock<Regex> = OnceLock::new();
    let noise = NOISE_RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)>")
            .expect("valid noise regex")
    });
    let tags = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

    let without_noise = noise.replace_all(text, " ");
    let stripped = tags.replace_all(&without_noise, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > MAX_DETAIL_CHARS {
        let mut short: String = collapsed.chars().take(MAX_DETAIL_CHARS).collect();
        short.push_str("...");
        short
    } else {
        collapsed
    }
}
