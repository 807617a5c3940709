//! Input handling: the in-memory document and how files on disk become one.
//!
//! A [`SourceDocument`] owns its bytes for exactly one extraction. The batch
//! orchestrator drops it as soon as that document's record exists, so a
//! batch never holds more than one payload at a time when reading from disk.
//! We validate the PDF magic bytes (`%PDF`) on the way in so a stray `.txt`
//! fails locally with a clear message instead of burning an upload.

use crate::error::InvoiceError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// MIME type attached to every upload unless the caller overrides it.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// An opaque document payload plus the name it is reported under.
#[derive(Clone)]
pub struct SourceDocument {
    /// Display name; becomes the `archivo` column of the record.
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceDocument {
    /// A PDF document from bytes already in memory.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Read a local PDF, validating existence, permissions and magic bytes.
    ///
    /// The display name is the file name component of `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InvoiceError> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InvoiceError::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(InvoiceError::PermissionDenied {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(InvoiceError::Internal(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&bytes[..4]);
            return Err(InvoiceError::NotAPdf {
                path: path.to_path_buf(),
                magic,
            });
        }

        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(display_name(path), bytes))
    }
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// The name a path is reported under: its final component, or the whole
/// path when it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Expand a list of files and directories into the PDFs to process.
///
/// Files are kept as given, in order, whatever their extension (the magic
/// byte check decides later). Directories contribute their `*.pdf` entries,
/// non-recursively, sorted by name so runs are reproducible.
pub fn collect_pdf_paths(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_pdf_name(p))
                .collect();
            found.sort();
            out.extend(found);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}

fn is_pdf_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
