//! # edgequake-invoice
//!
//! Extract structured billing fields from invoice PDFs using a remote
//! document-understanding model (Google Gemini).
//!
//! ## Why this crate?
//!
//! Utility and service invoices come from dozens of issuers, each with its
//! own layout, and many are scanned. Template-based extraction breaks on
//! every new issuer. Instead this crate uploads each PDF to a multimodal
//! model, asks for six fields as one JSON object, and turns whatever comes
//! back into a typed record, one per document, even when the model or the
//! quota misbehaves.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     bytes in memory, or read from disk just in time
//!  ├─ 2. Submit    upload + poll until the service reports READY
//!  ├─ 3. Invoke    one generation request with the extraction prompt
//!  ├─ 4. Retry     fixed cooldown on rate limits, bounded attempts
//!  ├─ 5. Sanitize  recover the JSON object from free-form text
//!  ├─ 6. Release   delete the remote file, always
//!  └─ 7. Output    ordered records → CSV / JSON report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{ExtractionConfig, Extractor};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GOOGLE_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::from_env()?;
//!     let extractor = Extractor::new(config).await?;
//!     let result = extractor
//!         .extract_paths(&[PathBuf::from("invoice1.pdf")])
//!         .await;
//!     result.write_csv_file("report.csv")?;
//!     eprintln!("{}/{} OK", result.stats.ok, result.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-invoice = { version = "0.1", default-features = false }
//! ```
//!
//! ## Pacing and Quotas
//!
//! Documents are processed strictly one at a time with a pause between them
//! (4 s by default), which keeps a free-tier key under its per-minute request
//! quota. A rate-limited extraction waits a fixed cooldown (15 s) and tries
//! again, up to `max_attempts` calls in total.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ModelSelection};
pub use error::{InvoiceError, ItemError, ServiceError};
pub use extract::{extract_to_csv, run_batch_sync, Extractor};
pub use output::{
    BatchResult, BatchStats, ExtractionRecord, InvoiceFields, RecordStatus, ReportColumn,
};
pub use pipeline::clock::{Sleeper, TokioSleeper};
pub use pipeline::input::SourceDocument;
pub use pipeline::sanitize::sanitize;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{DocumentService, FileState, RemoteFile, RemoteFileLease};
pub use stream::{extract_path_stream, extract_stream, RecordStream};
