//! Scoped ownership of an uploaded file.
//!
//! A [`RemoteFileLease`] is created right after a successful upload and is
//! consumed by [`RemoteFileLease::release`], which deletes the remote file.
//! Because `release` takes `self`, a lease can be released at most once.
//!
//! If the owning future is dropped before `release` runs (a cancelled batch,
//! a panic unwinding through the item), `Drop` spawns a best-effort delete on
//! the current Tokio runtime so the file is not left behind on the service.
//! Release failures are logged and never returned: the extracted record is
//! already final by the time cleanup happens.

use super::{DocumentService, RemoteFile};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns one uploaded file until it is released.
pub struct RemoteFileLease {
    service: Arc<dyn DocumentService>,
    file: RemoteFile,
    released: bool,
}

impl RemoteFileLease {
    pub fn new(service: Arc<dyn DocumentService>, file: RemoteFile) -> Self {
        Self {
            service,
            file,
            released: false,
        }
    }

    /// The file as returned by the upload call.
    pub fn file(&self) -> &RemoteFile {
        &self.file
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    /// Delete the remote file. Failures are logged, not raised.
    pub async fn release(mut self) {
        self.released = true;
        match self.service.delete_file(&self.file.name).await {
            Ok(()) => debug!("Released remote file {}", self.file.name),
            Err(e) => warn!("Failed to release remote file {}: {}", self.file.name, e),
        }
    }
}

impl Drop for RemoteFileLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let name = self.file.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Remote file {} dropped without release; deleting in background", name);
                let service = Arc::clone(&self.service);
                handle.spawn(async move {
                    if let Err(e) = service.delete_file(&name).await {
                        warn!("Background release of {} failed: {}", name, e);
                    }
                });
            }
            Err(_) => warn!("Remote file {} leaked: no runtime available to release it", name),
        }
    }
}

impl std::fmt::Debug for RemoteFileLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileLease")
            .field("file", &self.file)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::FakeService;
    use crate::service::FileState;

    fn file(name: &str) -> RemoteFile {
        RemoteFile {
            name: name.into(),
            uri: format!("https://example.test/{name}"),
            mime_type: "application/pdf".into(),
            state: FileState::Ready,
        }
    }

    #[tokio::test]
    async fn release_deletes_once() {
        let fake = FakeService::new();
        let lease = RemoteFileLease::new(fake.clone(), file("files/a"));
        lease.release().await;
        assert_eq!(fake.deleted(), vec!["files/a".to_string()]);
    }

    #[tokio::test]
    async fn release_failure_is_swallowed() {
        let fake = FakeService::new().failing_delete();
        let lease = RemoteFileLease::new(fake.clone(), file("files/b"));
        lease.release().await;
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn drop_without_release_deletes_in_background() {
        let fake = FakeService::new();
        {
            let _lease = RemoteFileLease::new(fake.clone(), file("files/c"));
        }
        // Let the spawned cleanup task run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fake.deleted(), vec!["files/c".to_string()]);
    }
}
