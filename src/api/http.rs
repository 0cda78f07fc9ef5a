// src/api/http.rs
// reqwest client for the processor web app

use super::{
    delete_path, process_path, progress_path, ActionResponse, ApiError, FileId, ProcessorApi,
    ProgressId, StatusReport, UploadResponse, UPLOAD_PATH,
};
use crate::upload::{OutputType, Submission, UploadOptions};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{multipart, Body, Method, RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

pub const DEFAULT_CSRF_HEADER: &str = "X-CSRFToken";
const REQUESTED_WITH: &str = "x-requested-with";
const XML_HTTP_REQUEST: &str = "XMLHttpRequest";
const FILE_FIELD: &str = "original_file";
const TEMPLATE_FIELD: &str = "template_file";

pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
    csrf_header: HeaderName,
}

impl HttpApi {
    /// `cookie` is sent verbatim as the `Cookie` header of every request.
    pub fn new(
        base_url: &str,
        cookie: Option<String>,
        csrf_header: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(REQUESTED_WITH, HeaderValue::from_static(XML_HTTP_REQUEST));
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| ApiError::Network(format!("invalid cookie header: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let csrf_header = HeaderName::from_bytes(csrf_header.as_bytes())
            .map_err(|e| ApiError::Network(format!("invalid header name '{}': {}", csrf_header, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!("HTTP API initialized for {}", base_url);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            csrf_header,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str, csrf: Option<&str>) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let builder = self.client.request(method, url);
        match csrf {
            Some(token) => builder.header(self.csrf_header.clone(), token),
            None => builder,
        }
    }

    /// Stream a file from disk into a multipart part
    async fn file_part(path: &Path, file_name: &str, mime: &str) -> Result<multipart::Part, ApiError> {
        let file_error = |reason: String| ApiError::File {
            path: path.display().to_string(),
            reason,
        };

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| file_error(e.to_string()))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| file_error(e.to_string()))?
            .len();

        multipart::Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| file_error(e.to_string()))
    }

    async fn build_form(
        submission: &Submission,
        options: &UploadOptions,
    ) -> Result<multipart::Form, ApiError> {
        let file_part =
            Self::file_part(&submission.path, &submission.file_name, &submission.mime).await?;

        let mut form = multipart::Form::new()
            .text("output_type", options.output_type.as_str())
            .part(FILE_FIELD, file_part);

        if options.output_type == OutputType::Template {
            if let Some(template) = options.template_file.as_deref() {
                let name = template
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "template.xlsx".to_string());
                let mime = mime_guess::from_path(template).first_or_octet_stream();
                let part = Self::file_part(template, &name, mime.essence_str()).await?;
                form = form.part(TEMPLATE_FIELD, part);
            }
        }

        Ok(form)
    }
}

/// Turn a non-2xx response into an error carrying the body text
async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("HTTP {} body: {} bytes", status, body.len());
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ProcessorApi for HttpApi {
    async fn upload(
        &self,
        submission: &Submission,
        options: &UploadOptions,
        csrf: Option<&str>,
    ) -> Result<UploadResponse, ApiError> {
        tracing::info!(
            "Uploading {} ({} bytes, output={})",
            submission.file_name,
            submission.size,
            options.output_type
        );

        let form = Self::build_form(submission, options).await?;
        let response = self
            .request(Method::POST, UPLOAD_PATH, csrf)
            .multipart(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<UploadResponse>().await?)
    }

    async fn start_processing(&self, id: &ProgressId, csrf: Option<&str>) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, &process_path(id), csrf)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // The body is informational; any 2xx means the job was accepted.
        if let Ok(body) = response.json::<ActionResponse>().await {
            tracing::debug!(
                "Process response for {}: success={}, message={:?}",
                id,
                body.success,
                body.message
            );
        }
        Ok(())
    }

    async fn progress(&self, id: &ProgressId) -> Result<StatusReport, ApiError> {
        let response = self
            .request(Method::GET, &progress_path(id), None)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            // An unknown job still answers with a terminal report.
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<StatusReport>(&body) {
                Ok(report) => Ok(report),
                Err(_) => Err(ApiError::Status { status: 404, body }),
            };
        }

        let response = ensure_success(response).await?;
        Ok(response.json::<StatusReport>().await?)
    }

    async fn process_file(
        &self,
        file_id: FileId,
        csrf: Option<&str>,
    ) -> Result<ActionResponse, ApiError> {
        let response = self
            .request(Method::POST, &process_path(file_id), csrf)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<ActionResponse>().await?)
    }

    async fn delete_file(&self, file_id: FileId, csrf: Option<&str>) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, &delete_path(file_id), csrf)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
