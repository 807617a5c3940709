//! Error types for the edgequake-invoice library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`InvoiceError`] — **Fatal**: the batch cannot start at all (no API key,
//!   invalid configuration, report cannot be written). Returned as
//!   `Err(InvoiceError)` from constructors and report writers.
//!
//! * [`ItemError`] — **Non-fatal**: a single document failed (upload rejected,
//!   remote processing timed out, model answered with garbage) but the rest of
//!   the batch is fine. Rendered into the `error_log` of that document's
//!   [`crate::output::ExtractionRecord`] and never propagated further.
//!
//! * [`ServiceError`] — what the remote service boundary reports. The
//!   pipeline classifies it into an [`ItemError`], deciding on the way
//!   whether the failure is a rate limit worth waiting out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice library.
///
/// Per-document failures use [`ItemError`] and end up inside
/// [`crate::output::ExtractionRecord`] rather than here.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// No credential was found; nothing can be sent to the remote service.
    #[error(
        "No API key configured for the document service.\n\
Set GOOGLE_API_KEY (or GEMINI_API_KEY), or pass --api-key."
    )]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the report file.
    #[error("Failed to write report '{path}': {detail}")]
    ReportWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// The `Display` text is what lands in the report's `error_log` column, so
/// every message reads on its own without the surrounding batch context.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The document bytes could not be read from disk.
    #[error("Could not read '{path}': {detail}")]
    ReadFailed { path: String, detail: String },

    /// Upload, or a state poll after it, was rejected by the service.
    #[error("Upload failed: {detail}")]
    Upload { detail: String },

    /// The remote file stayed in PENDING for the whole poll budget.
    #[error("Timed out waiting for remote processing after {polls} polls")]
    ProcessingTimeout { polls: u32 },

    /// The service reported the uploaded file as FAILED.
    #[error("Remote processing failed for '{file}'")]
    RemoteProcessingFailure { file: String },

    /// The model answered, but no JSON object could be recovered.
    #[error("Invalid JSON in model response")]
    MalformedResponse { excerpt: String },

    /// A single rate-limit/quota rejection. Recoverable: the retry controller
    /// waits out the cooldown and tries again.
    #[error("Rate limited by remote service: {message}")]
    RateLimited { message: String },

    /// Every attempt in the budget hit the rate limit.
    #[error("Failed after {attempts} attempts (quota exceeded)")]
    QuotaExhausted { attempts: u32, last_error: String },

    /// Any other service or transport error. Terminal for the document.
    #[error("Remote service error ({code}): {message}")]
    Remote { code: String, message: String },
}

impl ItemError {
    /// `true` for the one error class the retry controller re-attempts.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ItemError::RateLimited { .. })
    }
}

impl From<ServiceError> for ItemError {
    fn from(e: ServiceError) -> Self {
        if e.is_rate_limited() {
            ItemError::RateLimited {
                message: e.to_string(),
            }
        } else {
            ItemError::Remote {
                code: e.code_label(),
                message: e.message,
            }
        }
    }
}

/// Error reported by a [`crate::service::DocumentService`].
///
/// `status` is the HTTP status when the service answered at all; it is `None`
/// for transport failures (DNS, TLS, timeouts). `code` is the service's
/// symbolic status such as `RESOURCE_EXHAUSTED` or `INVALID_ARGUMENT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ServiceError {
    /// An error the service answered with.
    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            message: message.into(),
        }
    }

    /// A transport-level failure; the service never answered.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Whether this error signals an exhausted request quota.
    ///
    /// The status code and the message text are equivalent triggers: some
    /// gateways return 429 with a generic body, others return a 4xx/5xx whose
    /// message only mentions the quota.
    pub fn is_rate_limited(&self) -> bool {
        if self.status == Some(429) {
            return true;
        }
        if self.code.as_deref() == Some("RESOURCE_EXHAUSTED") {
            return true;
        }
        self.message.contains("429") || self.message.to_lowercase().contains("quota")
    }

    /// Short label combining status and symbolic code, e.g. `400 INVALID_ARGUMENT`.
    pub fn code_label(&self) -> String {
        match (self.status, self.code.as_deref()) {
            (Some(s), Some(c)) => format!("{s} {c}"),
            (Some(s), None) => s.to_string(),
            (None, Some(c)) => c.to_string(),
            (None, None) => "transport".to_string(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_label(), self.message)
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_mentions_env_var() {
        let msg = InvoiceError::MissingApiKey.to_string();
        assert!(msg.contains("GOOGLE_API_KEY"), "got: {msg}");
    }

    #[test]
    fn quota_exhausted_display() {
        let e = ItemError::QuotaExhausted {
            attempts: 3,
            last_error: "429".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("quota"), "got: {msg}");
    }

    #[test]
    fn rate_limit_by_status() {
        let e = ServiceError::http(429, None, "Too Many Requests");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn rate_limit_by_symbolic_code() {
        let e = ServiceError::http(400, Some("RESOURCE_EXHAUSTED".into()), "slow down");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn rate_limit_by_quota_message() {
        let e = ServiceError::http(403, None, "Quota exceeded for metric generate_content");
        assert!(e.is_rate_limited());
        let e = ServiceError::transport("upstream said 429");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn other_errors_are_not_rate_limits() {
        let e = ServiceError::http(400, Some("INVALID_ARGUMENT".into()), "bad file uri");
        assert!(!e.is_rate_limited());
        assert!(!ServiceError::transport("connection reset").is_rate_limited());
    }

    #[test]
    fn service_error_classification() {
        let item: ItemError = ServiceError::http(429, None, "slow down").into();
        assert!(item.is_rate_limited());

        let item: ItemError =
            ServiceError::http(500, Some("INTERNAL".into()), "backend exploded").into();
        assert_eq!(
            item,
            ItemError::Remote {
                code: "500 INTERNAL".into(),
                message: "backend exploded".into(),
            }
        );
        assert!(item.to_string().contains("500 INTERNAL"));
    }

    #[test]
    fn transport_code_label() {
        assert_eq!(ServiceError::transport("dns").code_label(), "transport");
    }
}
