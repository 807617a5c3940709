//! Batch extraction entry points.
//!
//! [`Extractor`] owns one service client and the resolved model, and runs
//! documents strictly one at a time: upload, wait for READY, extract with
//! rate-limit retry, release the remote file, pace, next. Every document
//! yields exactly one [`ExtractionRecord`], in input order, whatever happens
//! to it. Only configuration problems are fatal, and those surface before
//! the first upload.
//!
//! Use [`crate::stream::extract_stream`] instead when records should be
//! consumed as they are produced.

use crate::config::ExtractionConfig;
use crate::error::{InvoiceError, ItemError};
use crate::output::{BatchResult, BatchStats, ExtractionRecord, InvoiceFields};
use crate::pipeline::clock::{Sleeper, TokioSleeper};
use crate::pipeline::input::{display_name, SourceDocument};
use crate::pipeline::invoke::invoke;
use crate::pipeline::retry::{run_with_retry, RetryPolicy};
use crate::pipeline::submit;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use crate::service::gemini::GeminiClient;
use crate::service::models::resolve_model;
use crate::service::{DocumentService, RemoteFileLease};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A document ready to process, or the reason it could not be loaded.
pub(crate) type LoadedItem = Result<SourceDocument, (String, ItemError)>;

/// Runs extraction batches against one remote service.
pub struct Extractor {
    service: Arc<dyn DocumentService>,
    sleeper: Arc<dyn Sleeper>,
    config: ExtractionConfig,
    model: String,
}

impl Extractor {
    /// Connect to the Gemini API described by `config` and resolve the model.
    ///
    /// # Errors
    /// [`InvoiceError::MissingApiKey`] when no credential is configured, or
    /// [`InvoiceError::Internal`] when the HTTP client cannot be built.
    pub async fn new(config: ExtractionConfig) -> Result<Self, InvoiceError> {
        let service: Arc<dyn DocumentService> = Arc::new(GeminiClient::new(&config)?);
        Ok(Self::with_service(config, service).await)
    }

    /// Use an already-built service, e.g. a proxy or an in-memory fake.
    pub async fn with_service(config: ExtractionConfig, service: Arc<dyn DocumentService>) -> Self {
        let model = resolve_model(&*service, &config.model).await;
        info!("Using model {}", model);
        Self {
            service,
            sleeper: Arc::new(TokioSleeper),
            config,
            model,
        }
    }

    /// Replace the timer used for polling, cooldown and pacing waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The fully-qualified model every request goes to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process one document end to end. Never fails: errors become an
    /// ERROR record.
    pub async fn extract_document(&self, document: &SourceDocument) -> ExtractionRecord {
        let start = Instant::now();
        let (result, attempts) = self.process(document).await;
        match result {
            Ok(fields) => ExtractionRecord::ok(&document.name, fields, attempts, start.elapsed()),
            Err(e) => {
                warn!("{}: {}", document.name, e);
                ExtractionRecord::failed(&document.name, e, attempts, start.elapsed())
            }
        }
    }

    /// Process in-memory documents in order.
    pub async fn run_batch(&self, documents: Vec<SourceDocument>) -> BatchResult {
        self.run_items(documents.into_iter().map(Ok)).await
    }

    /// Read and process PDFs from disk in order.
    ///
    /// Each file is read just before it is processed. A file that cannot be
    /// read becomes an ERROR record for that entry; the batch continues.
    pub async fn extract_paths(&self, paths: &[PathBuf]) -> BatchResult {
        self.run_items(paths.iter().map(|p| load(p))).await
    }

    async fn run_items<I>(&self, items: I) -> BatchResult
    where
        I: ExactSizeIterator<Item = LoadedItem>,
    {
        let total = items.len();
        let start = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        info!("Starting batch: {} documents", total);
        if let Some(cb) = cb {
            cb.on_batch_start(total);
        }

        let mut records = Vec::with_capacity(total);
        for (i, item) in items.enumerate() {
            let index = i + 1;
            let record = match item {
                Ok(document) => {
                    if let Some(cb) = cb {
                        cb.on_item_start(index, total, &document.name);
                    }
                    self.extract_document(&document).await
                }
                Err((name, e)) => {
                    if let Some(cb) = cb {
                        cb.on_item_start(index, total, &name);
                    }
                    Self::unreadable(name, e)
                }
            };

            if let Some(cb) = cb {
                match &record.error_log {
                    None => cb.on_item_complete(index, total, &record.file_name),
                    Some(e) => cb.on_item_error(index, total, &record.file_name, e),
                }
            }
            info!(
                "[{}/{}] {} → {} ({} attempts, {}ms)",
                index, total, record.file_name, record.status, record.attempts, record.duration_ms
            );
            records.push(record);

            if index < total {
                self.pace().await;
            }
        }

        let result = BatchResult::new(records, start.elapsed());
        info!(
            "Batch complete: {}/{} OK, {}ms total",
            result.stats.ok, result.stats.total, result.stats.total_duration_ms
        );
        if let Some(cb) = cb {
            cb.on_batch_complete(total, result.stats.ok);
        }
        result
    }

    /// Wait out the inter-document pacing delay.
    pub(crate) async fn pace(&self) {
        debug!("Pacing {}ms before next document", self.config.pacing_delay_ms);
        self.sleeper.sleep(self.config.pacing_delay()).await;
    }

    /// Record for an entry that never became a document.
    pub(crate) fn unreadable(name: String, error: ItemError) -> ExtractionRecord {
        warn!("{}: {}", name, error);
        ExtractionRecord::failed(name, error, 0, std::time::Duration::ZERO)
    }

    /// Upload, analyse, release. The lease is released exactly once on
    /// every path that got past the upload.
    async fn process(&self, document: &SourceDocument) -> (Result<InvoiceFields, ItemError>, u32) {
        let lease = match submit::upload(&self.service, document).await {
            Ok(lease) => lease,
            Err(e) => return (Err(e), 0),
        };
        let outcome = self.analyse(&document.name, &lease).await;
        lease.release().await;
        outcome
    }

    async fn analyse(
        &self,
        name: &str,
        lease: &RemoteFileLease,
    ) -> (Result<InvoiceFields, ItemError>, u32) {
        let file = match submit::wait_until_ready(
            &*self.service,
            &*self.sleeper,
            lease,
            self.config.poll_interval(),
            self.config.max_polls,
        )
        .await
        {
            Ok(file) => file,
            Err(e) => return (Err(e), 0),
        };

        let policy = RetryPolicy {
            max_attempts: self.config.max_attempts,
            cooldown: self.config.rate_limit_cooldown(),
        };
        let service = &*self.service;
        let model = self.model.as_str();
        let file = &file;
        let prompt = self
            .config
            .prompt
            .as_deref()
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
        let temperature = self.config.temperature;

        let outcome = run_with_retry(policy, &*self.sleeper, name, move |_| {
            invoke(service, model, file, prompt, temperature)
        })
        .await;
        (outcome.result, outcome.attempts)
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("model", &self.model)
            .field("config", &self.config)
            .finish()
    }
}

pub(crate) fn load(path: &Path) -> LoadedItem {
    SourceDocument::from_path(path).map_err(|e| {
        (
            display_name(path),
            ItemError::ReadFailed {
                path: path.display().to_string(),
                detail: e.to_string(),
            },
        )
    })
}

/// Extract every PDF in `paths` and write the CSV report to `output_path`.
pub async fn extract_to_csv(
    paths: &[PathBuf],
    output_path: impl AsRef<Path>,
    config: ExtractionConfig,
) -> Result<BatchStats, InvoiceError> {
    let extractor = Extractor::new(config).await?;
    let result = extractor.extract_paths(paths).await;
    result.write_csv_file(output_path)?;
    Ok(result.stats)
}

/// Synchronous wrapper around [`Extractor::run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(
    config: ExtractionConfig,
    documents: Vec<SourceDocument>,
) -> Result<BatchResult, InvoiceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(async {
            let extractor = Extractor::new(config).await?;
            Ok(extractor.run_batch(documents).await)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSelection;
    use crate::error::ServiceError;
    use crate::output::RecordStatus;
    use crate::pipeline::clock::testing::RecordingSleeper;
    use crate::progress::BatchProgressCallback;
    use crate::service::fake::{FakeService, VALID_JSON};
    use crate::service::FileState;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder().api_key("test-key").build().unwrap()
    }

    async fn extractor(
        config: ExtractionConfig,
        fake: &Arc<FakeService>,
    ) -> (Extractor, Arc<RecordingSleeper>) {
        let sleeper = RecordingSleeper::new();
        let ex = Extractor::with_service(config, fake.clone())
            .await
            .with_sleeper(sleeper.clone());
        (ex, sleeper)
    }

    fn docs(names: &[&str]) -> Vec<SourceDocument> {
        names
            .iter()
            .map(|n| SourceDocument::new(*n, b"%PDF-1.4".to_vec()))
            .collect()
    }

    fn rate_limit() -> Result<String, ServiceError> {
        Err(ServiceError::http(
            429,
            Some("RESOURCE_EXHAUSTED".into()),
            "Resource has been exhausted (e.g. check quota).",
        ))
    }

    #[tokio::test]
    async fn example_invoice_is_ok() {
        let fake = FakeService::new().responses(vec![Ok(VALID_JSON.to_string())]);
        let (ex, _) = extractor(config(), &fake).await;

        let result = ex.run_batch(docs(&["invoice1.pdf"])).await;
        let rec = &result.records[0];
        assert_eq!(rec.file_name, "invoice1.pdf");
        assert_eq!(rec.status, RecordStatus::Ok);
        assert_eq!(rec.fields.contract_number.as_deref(), Some("A1"));
        assert_eq!(rec.fields.tax_id.as_deref(), Some("900-1"));
        assert_eq!(rec.fields.company_name.as_deref(), Some("Acme"));
        assert_eq!(rec.fields.issue_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(rec.fields.due_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(rec.fields.amount_due, Some(Decimal::from(150_000)));
        assert_eq!(rec.error_log, None);
        assert_eq!(rec.attempts, 1);
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn n_documents_give_n_records_in_order_with_pacing_between() {
        let fake = FakeService::new().responses(vec![
            Ok(VALID_JSON.to_string()),
            Ok("no json here".to_string()),
            Ok(VALID_JSON.to_string()),
            Err(ServiceError::http(500, Some("INTERNAL".into()), "boom")),
        ]);
        let (ex, sleeper) = extractor(config(), &fake).await;
        let names = ["a.pdf", "b.pdf", "c.pdf", "d.pdf"];

        let result = ex.run_batch(docs(&names)).await;
        let got: Vec<&str> = result.records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(got, names);
        let statuses: Vec<RecordStatus> = result.records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RecordStatus::Ok,
                RecordStatus::Error,
                RecordStatus::Ok,
                RecordStatus::Error
            ]
        );
        assert_eq!(result.stats.ok, 2);
        assert_eq!(result.stats.failed, 2);
        assert_eq!(fake.uploaded_names(), names);
        assert_eq!(sleeper.count_of(ex.config().pacing_delay()), 3);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let fake = FakeService::new();
        let (ex, sleeper) = extractor(config(), &fake).await;
        let result = ex.run_batch(Vec::new()).await;
        assert!(result.records.is_empty());
        assert_eq!(fake.upload_calls(), 0);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn release_once_after_malformed_response() {
        let fake = FakeService::new().responses(vec![Ok("Sorry, I can't.".into())]);
        let (ex, _) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["x.pdf"])[0]).await;
        assert_eq!(rec.error_log.as_deref(), Some("Invalid JSON in model response"));
        assert_eq!(fake.generate_calls(), 1);
        assert_eq!(fake.deleted(), vec!["files/f1".to_string()]);
    }

    #[tokio::test]
    async fn release_once_after_remote_error() {
        let fake = FakeService::new().responses(vec![Err(ServiceError::http(
            400,
            Some("INVALID_ARGUMENT".into()),
            "bad request",
        ))]);
        let (ex, _) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["x.pdf"])[0]).await;
        assert!(matches!(rec.error, Some(ItemError::Remote { .. })));
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_releases_once_and_stops() {
        let fake = FakeService::new().responses(vec![rate_limit(), rate_limit(), rate_limit()]);
        let (ex, sleeper) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["x.pdf"])[0]).await;
        assert_eq!(rec.status, RecordStatus::Error);
        assert!(matches!(rec.error, Some(ItemError::QuotaExhausted { attempts: 3, .. })));
        assert_eq!(rec.attempts, 3);
        assert_eq!(fake.generate_calls(), 3);
        assert_eq!(sleeper.count_of(ex.config().rate_limit_cooldown()), 2);
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_then_success_is_ok() {
        let fake = FakeService::new().responses(vec![rate_limit(), Ok(VALID_JSON.to_string())]);
        let (ex, sleeper) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["x.pdf"])[0]).await;
        assert!(rec.is_ok());
        assert_eq!(rec.attempts, 2);
        assert_eq!(sleeper.count_of(ex.config().rate_limit_cooldown()), 1);
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn poll_timeout_never_extracts_and_still_releases() {
        let cfg = ExtractionConfig::builder()
            .api_key("k")
            .max_polls(3)
            .build()
            .unwrap();
        let fake = FakeService::new().pending_polls(10);
        let (ex, _) = extractor(cfg, &fake).await;

        let rec = ex.extract_document(&docs(&["slow.pdf"])[0]).await;
        assert_eq!(rec.error, Some(ItemError::ProcessingTimeout { polls: 3 }));
        assert_eq!(fake.poll_calls(), 3);
        assert_eq!(fake.generate_calls(), 0);
        assert_eq!(rec.attempts, 0);
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn remote_processing_failure_releases() {
        let fake = FakeService::new().upload_state(FileState::Failed);
        let (ex, _) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["bad.pdf"])[0]).await;
        assert!(matches!(
            rec.error,
            Some(ItemError::RemoteProcessingFailure { .. })
        ));
        assert_eq!(fake.generate_calls(), 0);
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn upload_failure_has_nothing_to_release() {
        let fake = FakeService::new().failing_upload(ServiceError::transport("connection refused"));
        let (ex, _) = extractor(config(), &fake).await;

        let result = ex.run_batch(docs(&["a.pdf", "b.pdf"])).await;
        assert_eq!(result.records.len(), 2);
        assert!(result.records.iter().all(|r| !r.is_ok()));
        assert_eq!(fake.delete_calls(), 0);
    }

    #[tokio::test]
    async fn release_failure_does_not_change_the_record() {
        let fake = FakeService::new().failing_delete();
        let (ex, _) = extractor(config(), &fake).await;

        let rec = ex.extract_document(&docs(&["a.pdf"])[0]).await;
        assert!(rec.is_ok());
        assert_eq!(fake.delete_calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_path_becomes_error_record() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        std::fs::write(&good, b"%PDF-1.7").unwrap();
        let missing = dir.path().join("missing.pdf");

        let fake = FakeService::new();
        let (ex, _) = extractor(config(), &fake).await;
        let result = ex.extract_paths(&[missing, good]).await;

        assert_eq!(result.records[0].file_name, "missing.pdf");
        assert!(matches!(
            result.records[0].error,
            Some(ItemError::ReadFailed { .. })
        ));
        assert_eq!(result.records[1].file_name, "good.pdf");
        assert!(result.records[1].is_ok());
        assert_eq!(fake.upload_calls(), 1);
    }

    #[tokio::test]
    async fn custom_prompt_and_auto_model() {
        let cfg = ExtractionConfig::builder()
            .api_key("k")
            .auto_model()
            .prompt("only the NIT please")
            .build()
            .unwrap();
        assert_eq!(cfg.model, ModelSelection::Auto);
        let fake = FakeService::new().models(Ok(vec![
            "models/gemini-1.0-pro".into(),
            "models/gemini-2.0-flash".into(),
        ]));
        let (ex, _) = extractor(cfg, &fake).await;
        assert_eq!(ex.model(), "models/gemini-2.0-flash");
    }

    struct Counting {
        started: AtomicUsize,
        ok: AtomicUsize,
        err: AtomicUsize,
        finished: AtomicUsize,
    }

    impl BatchProgressCallback for Counting {
        fn on_item_start(&self, _: usize, _: usize, _: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_item_complete(&self, _: usize, _: usize, _: &str) {
            self.ok.fetch_add(1, Ordering::SeqCst);
        }
        fn on_item_error(&self, _: usize, _: usize, _: &str, _: &str) {
            self.err.fetch_add(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, total: usize, ok: usize) {
            assert_eq!((total, ok), (3, 2));
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn progress_callback_sees_every_item() {
        let counter = Arc::new(Counting {
            started: AtomicUsize::new(0),
            ok: AtomicUsize::new(0),
            err: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let cfg = ExtractionConfig::builder()
            .api_key("k")
            .progress_callback(counter.clone())
            .build()
            .unwrap();
        let fake = FakeService::new().responses(vec![
            Ok(VALID_JSON.into()),
            Ok("garbage".into()),
            Ok(VALID_JSON.into()),
        ]);
        let (ex, _) = extractor(cfg, &fake).await;
        ex.run_batch(docs(&["a.pdf", "b.pdf", "c.pdf"])).await;

        assert_eq!(counter.started.load(Ordering::SeqCst), 3);
        assert_eq!(counter.ok.load(Ordering::SeqCst), 2);
        assert_eq!(counter.err.load(Ordering::SeqCst), 1);
        assert_eq!(counter.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_pacing_still_goes_through_sleeper() {
        let cfg = ExtractionConfig::builder()
            .api_key("k")
            .pacing_delay_ms(0)
            .build()
            .unwrap();
        let fake = FakeService::new();
        let (ex, sleeper) = extractor(cfg, &fake).await;
        ex.run_batch(docs(&["a.pdf", "b.pdf"])).await;
        assert_eq!(sleeper.count_of(Duration::ZERO), 1);
    }
}
