// src/upload/mod.rs
// Upload Module - file selection and pre-flight checks

mod types;

pub use types::{OutputType, SelectedFile, Submission, UploadOptions, ValidationError};

/// Largest file the server accepts (10 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted workbook extensions, compared case-insensitively
pub const ALLOWED_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// Check a selection before anything is sent over the wire.
///
/// Runs the same checks the upload form runs, in the same order: presence,
/// size, then extension.
pub fn validate(file: Option<SelectedFile>) -> Result<Submission, ValidationError> {
    let file = file.ok_or(ValidationError::MissingFile)?;

    if file.size > MAX_UPLOAD_BYTES {
        tracing::warn!(
            "Rejected {}: {} bytes > {} bytes",
            file.name,
            file.size,
            MAX_UPLOAD_BYTES
        );
        return Err(ValidationError::TooLarge {
            size: file.size,
            max: MAX_UPLOAD_BYTES,
        });
    }

    let lowered = file.name.to_lowercase();
    if !ALLOWED_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        tracing::warn!("Rejected {}: not an Excel workbook", file.name);
        return Err(ValidationError::BadExtension { name: file.name });
    }

    let mime = mime_guess::from_path(&file.name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(Submission {
        path: file.path,
        file_name: file.name,
        size: file.size,
        mime,
    })
}
