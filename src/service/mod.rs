//! The remote document-understanding service boundary.
//!
//! Everything the pipeline needs from the outside world goes through the
//! [`DocumentService`] trait: upload a document, read its processing state,
//! run a generation request against it, delete it, and list models. The
//! production implementation is [`gemini::GeminiClient`]; tests substitute a
//! scripted in-memory service.
//!
//! ## Handle ownership
//!
//! An uploaded file is a quota-consuming server-side resource until deleted.
//! [`RemoteFileLease`] owns one for the lifetime of a single document's
//! processing and makes the delete happen exactly once on every exit path.

pub mod gemini;
pub mod lease;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

use crate::error::ServiceError;
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use lease::RemoteFileLease;

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    /// Still being ingested; not yet usable in a generation request.
    Pending,
    /// Ready for analysis.
    Ready,
    /// The service gave up on the file.
    Failed,
}

impl FileState {
    /// Map the service's state string. Unknown and unspecified states count
    /// as pending so the poll budget, not a parse error, ends the wait.
    pub fn from_api(state: &str) -> Self {
        match state {
            "ACTIVE" => FileState::Ready,
            "FAILED" => FileState::Failed,
            _ => FileState::Pending,
        }
    }
}

/// A server-side handle to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`. Used for state polls and delete.
    pub name: String,
    /// URI referenced from generation requests.
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// Operations the extraction pipeline needs from the remote service.
///
/// Implementations must be `Send + Sync`: a single client is shared by the
/// orchestrator and by lease drop-guards that may run on a spawned task.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Upload the document bytes, tagged with their MIME type.
    async fn upload(&self, document: &SourceDocument) -> Result<RemoteFile, ServiceError>;

    /// Re-read an uploaded file's metadata, including its current state.
    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError>;

    /// Run one generation request over `file` with a textual instruction and
    /// return the model's free-form text answer.
    async fn generate(
        &self,
        model: &str,
        file: &RemoteFile,
        instruction: &str,
        temperature: f32,
    ) -> Result<String, ServiceError>;

    /// Delete an uploaded file.
    async fn delete_file(&self, name: &str) -> Result<(), ServiceError>;

    /// Names of models usable for generation, e.g. `models/gemini-1.5-flash`.
    async fn list_models(&self) -> Result<Vec<String>, ServiceError>;
}
