//! [`DocumentService`] over the Google Generative Language REST API.
//!
//! ## Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload    | `POST /upload/v1beta/files` (resumable: start, then upload+finalize) |
//! | state     | `GET /v1beta/{files/…}` |
//! | generate  | `POST /v1beta/{models/…}:generateContent` |
//! | delete    | `DELETE /v1beta/{files/…}` |
//! | models    | `GET /v1beta/models` (paged) |
//!
//! The API key travels in the `x-goog-api-key` header, never in a URL, so it
//! cannot leak into logs or error messages that quote the request URL.
//!
//! ## Why resumable upload?
//! The simple `uploadType=media` variant cannot carry a display name. The
//! two-step resumable protocol can, and the display name is what makes
//! leftover files identifiable in the console if a release ever fails.

use super::{DocumentService, FileState, RemoteFile};
use crate::config::ExtractionConfig;
use crate::error::{InvoiceError, ServiceError};
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Longest slice of a non-JSON error body kept in a [`ServiceError`].
const MAX_ERROR_BODY: usize = 300;

/// HTTP client for the Generative Language API.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from the config's credential, endpoint and timeout.
    ///
    /// # Errors
    /// [`InvoiceError::MissingApiKey`] when the config carries no key.
    pub fn new(config: &ExtractionConfig) -> Result<Self, InvoiceError> {
        if config.api_key.trim().is_empty() {
            return Err(InvoiceError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InvoiceError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }
}

#[async_trait]
impl DocumentService for GeminiClient {
    async fn upload(&self, document: &SourceDocument) -> Result<RemoteFile, ServiceError> {
        let start = self
            .http
            .post(format!("{}/upload/{}/files", self.base_url, API_VERSION))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                document.bytes.len().to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", &document.mime_type)
            .json(&json!({ "file": { "display_name": document.name } }))
            .send()
            .await
            .map_err(transport)?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::http(
                    start.status().as_u16(),
                    None,
                    "upload session response had no x-goog-upload-url header",
                )
            })?;

        let response = self
            .http
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(document.bytes.clone())
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::transport(format!("invalid upload response: {e}")))?;
        debug!(
            "Uploaded {} ({} bytes) as {}",
            document.name,
            document.bytes.len(),
            body.file.name
        );
        Ok(body.file.into())
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError> {
        let response = self
            .http
            .get(self.url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let file: FileResource = response
            .json()
            .await
            .map_err(|e| ServiceError::transport(format!("invalid file resource: {e}")))?;
        Ok(file.into())
    }

    async fn generate(
        &self,
        model: &str,
        file: &RemoteFile,
        instruction: &str,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "fileData": { "mimeType": file.mime_type, "fileUri": file.uri } },
                    { "text": instruction }
                ]
            }],
            "generationConfig": { "temperature": temperature }
        });

        let response = self
            .http
            .post(self.url(&format!("{model}:generateContent")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::transport(format!("invalid generateContent response: {e}")))?;

        parsed.into_text()
    }

    async fn delete_file(&self, name: &str) -> Result<(), ServiceError> {
        let response = self
            .http
            .delete(self.url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.url("models"))
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(transport)?;
            let response = check_status(response).await?;
            let page: ModelList = response
                .json()
                .await
                .map_err(|e| ServiceError::transport(format!("invalid model list: {e}")))?;

            names.extend(
                page.models
                    .into_iter()
                    .filter(ModelResource::supports_generation)
                    .map(|m| m.name),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(names)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: Option<String>,
}

impl From<FileResource> for RemoteFile {
    fn from(f: FileResource) -> Self {
        RemoteFile {
            state: FileState::from_api(f.state.as_deref().unwrap_or_default()),
            name: f.name,
            uri: f.uri,
            mime_type: f.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    /// The answer text, or a `BLOCKED` error when the prompt was refused.
    fn into_text(self) -> Result<String, ServiceError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(ServiceError::http(
                200,
                Some("BLOCKED".into()),
                format!("prompt blocked: {reason}"),
            ));
        }
        Ok(self.text())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelResource {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl ModelResource {
    fn supports_generation(&self) -> bool {
        self.supported_generation_methods.is_empty()
            || self
                .supported_generation_methods
                .iter()
                .any(|m| m == "generateContent")
    }
}

// ── Error mapping ────────────────────────────────────────────────────────

fn transport(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::transport(format!("request timed out: {e}"))
    } else {
        ServiceError::transport(e.to_string())
    }
}

/// Pass successful responses through; turn anything else into a [`ServiceError`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(parse_error_body(status, &body))
}

fn parse_error_body(status: reqwest::StatusCode, body: &str) -> ServiceError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => ServiceError::http(
            status.as_u16(),
            envelope.error.status,
            envelope.error.message,
        ),
        _ => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                trimmed.chars().take(MAX_ERROR_BODY).collect()
            };
            ServiceError::http(status.as_u16(), None, message)
        }
    }
}
