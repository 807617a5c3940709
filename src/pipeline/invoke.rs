//! Extraction: one generation request over a ready remote file.
//!
//! A single attempt, no retries and no cleanup. The retry controller decides
//! whether to call again; the item scope owns the remote file.

use super::normalize::fields_from_raw;
use super::sanitize::sanitize;
use crate::error::ItemError;
use crate::output::InvoiceFields;
use crate::service::{DocumentService, RemoteFile};
use tracing::debug;

/// Characters of a malformed answer kept for the error record.
const EXCERPT_CHARS: usize = 200;

/// Ask `model` to extract the invoice fields from `file`.
///
/// Service errors keep their status/code; rate-limit-class errors come back
/// as [`ItemError::RateLimited`] for the retry controller. An answer with no
/// recoverable JSON object is [`ItemError::MalformedResponse`].
pub async fn invoke(
    service: &dyn DocumentService,
    model: &str,
    file: &RemoteFile,
    instruction: &str,
    temperature: f32,
) -> Result<InvoiceFields, ItemError> {
    let raw = service
        .generate(model, file, instruction, temperature)
        .await
        .map_err(ItemError::from)?;
    debug!("{} answered {} chars for {}", model, raw.len(), file.name);

    match sanitize(&raw) {
        Some(record) => Ok(fields_from_raw(&record)),
        None => Err(ItemError::MalformedResponse {
            excerpt: raw.chars().take(EXCERPT_CHARS).collect(),
        }),
    }
}
