// src/upload/types.rs
// Upload Types and Validation Errors

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file picked by the user, before any validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    /// Location on disk
    pub path: PathBuf,
    /// File name as shown to the server
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            size,
        }
    }

    /// Read name and size from the file's metadata
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(path, name, metadata.len()))
    }
}

/// A file that passed pre-flight checks and may be uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    /// Declared MIME type, guessed from the extension
    pub mime: String,
}

impl Submission {
    /// Human readable line shown once a file is chosen
    pub fn describe(&self) -> String {
        let megabytes = self.size as f64 / 1024.0 / 1024.0;
        format!("Selected: {} ({:.2} MB)", self.file_name, megabytes)
    }
}

/// How the server should lay out the processed workbook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    #[default]
    New,
    Template,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::New => "new",
            OutputType::Template => "template",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra form fields sent alongside the uploaded file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub output_type: OutputType,
    pub template_file: Option<PathBuf>,
}

impl UploadOptions {
    /// Use `template` as the output layout
    pub fn with_template(path: impl Into<PathBuf>) -> Self {
        Self {
            output_type: OutputType::Template,
            template_file: Some(path.into()),
        }
    }
}

/// Pre-flight failures, surfaced to the user as warnings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a file to upload.")]
    MissingFile,

    #[error("File size must be under 10MB.")]
    TooLarge { size: u64, max: u64 },

    #[error("Only Excel files (.xlsx, .xls) are allowed.")]
    BadExtension { name: String },
}
