//! Submission: upload a document and wait until the service can read it.
//!
//! The upload returns immediately with a PENDING handle; large or scanned
//! PDFs take a few seconds of server-side ingestion before a generation
//! request may reference them. We poll on a fixed interval with a hard cap
//! on the number of polls. Both the timeout and a FAILED state are terminal
//! for the document: retrying the same bytes would not change the outcome.
//!
//! Neither function releases the remote file. [`upload`] hands back a
//! [`RemoteFileLease`] and the caller decides when the file is no longer
//! needed.

use super::clock::Sleeper;
use super::input::SourceDocument;
use crate::error::ItemError;
use crate::service::{DocumentService, FileState, RemoteFile, RemoteFileLease};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Upload `document` and take ownership of the resulting remote file.
pub async fn upload(
    service: &Arc<dyn DocumentService>,
    document: &SourceDocument,
) -> Result<RemoteFileLease, ItemError> {
    debug!(
        "Uploading {} ({} bytes, {})",
        document.name,
        document.bytes.len(),
        document.mime_type
    );
    let file = service
        .upload(document)
        .await
        .map_err(|e| ItemError::Upload {
            detail: e.to_string(),
        })?;
    info!("Uploaded {} as {}", document.name, file.name);
    Ok(RemoteFileLease::new(Arc::clone(service), file))
}

/// Poll until the leased file is READY.
///
/// Each poll waits `interval` first, then queries the state. At most
/// `max_polls` queries are made; a file still PENDING after that fails with
/// [`ItemError::ProcessingTimeout`]. A file that is already READY at upload
/// time is returned without polling.
pub async fn wait_until_ready(
    service: &dyn DocumentService,
    sleeper: &dyn Sleeper,
    lease: &RemoteFileLease,
    interval: Duration,
    max_polls: u32,
) -> Result<RemoteFile, ItemError> {
    let mut file = lease.file().clone();

    for poll in 1..=max_polls {
        match file.state {
            FileState::Ready => return Ok(file),
            FileState::Failed => {
                return Err(ItemError::RemoteProcessingFailure { file: file.name })
            }
            FileState::Pending => {}
        }

        sleeper.sleep(interval).await;
        file = service
            .get_file(lease.name())
            .await
            .map_err(|e| ItemError::Upload {
                detail: e.to_string(),
            })?;
        debug!("Poll {}/{}: {} is {:?}", poll, max_polls, file.name, file.state);
    }

    match file.state {
        FileState::Ready => Ok(file),
        FileState::Failed => Err(ItemError::RemoteProcessingFailure { file: file.name }),
        FileState::Pending => Err(ItemError::ProcessingTimeout { polls: max_polls }),
    }
}
