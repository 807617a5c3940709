//! Configuration types for invoice extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is constructed once at
//! startup and handed by reference to every stage; nothing in the pipeline
//! reads process-global state after that.
//!
//! # Design choice: builder over constructor
//! Most callers only need an API key. The builder lets them set that and rely
//! on documented defaults for poll, retry and pacing timings.

use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use crate::service::models::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Environment variables consulted by [`ExtractionConfig::from_env`], in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Default REST endpoint of the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for an extraction batch.
///
/// Built via [`ExtractionConfig::builder()`] or [`ExtractionConfig::from_env()`].
///
/// # Example
/// ```rust
/// use edgequake_invoice::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("AIza...")
///     .max_attempts(3)
///     .pacing_delay_ms(4_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Credential for the remote service. Held in memory only; redacted in `Debug`.
    pub api_key: String,

    /// Which model to call. Default: fixed `models/gemini-1.5-flash`.
    pub model: ModelSelection,

    /// Service endpoint. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Wait between file-state polls after upload, in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Maximum number of state polls before giving up. Default: 20.
    ///
    /// With the default interval the service gets ~40 s to ingest a PDF.
    /// Invoices are small; anything slower is treated as stuck.
    pub max_polls: u32,

    /// Extraction attempts per document, counting the first. Range: 1–10. Default: 3.
    ///
    /// Only rate-limit/quota rejections are retried. Malformed answers and
    /// other service errors end the document on the first occurrence.
    pub max_attempts: u32,

    /// Cooldown after a rate-limit rejection, in milliseconds. Default: 15000.
    ///
    /// Per-minute quotas on the free tier reset in well under a minute; a long
    /// fixed wait clears them more reliably than a short exponential ramp.
    pub rate_limit_cooldown_ms: u64,

    /// Pause between documents, in milliseconds. Default: 4000.
    ///
    /// A deliberate throughput cap so a batch stays under the per-minute
    /// request quota instead of bursting into it.
    pub pacing_delay_ms: u64,

    /// Per-HTTP-request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Sampling temperature for the extraction call. Default: 0.1.
    pub temperature: f32,

    /// Custom extraction instruction. If None, uses [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Receives per-document progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: ModelSelection::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 2_000,
            max_polls: 20,
            max_attempts: 3,
            rate_limit_cooldown_ms: 15_000,
            pacing_delay_ms: 4_000,
            request_timeout_secs: 120,
            temperature: 0.1,
            prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .field("max_attempts", &self.max_attempts)
            .field("rate_limit_cooldown_ms", &self.rate_limit_cooldown_ms)
            .field("pacing_delay_ms", &self.pacing_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default config with the API key taken from the environment.
    ///
    /// Checks [`API_KEY_ENV_VARS`] in order. This is the only place a missing
    /// credential is detected; it halts before any document is touched.
    pub fn from_env() -> Result<Self, InvoiceError> {
        let key = API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
            .ok_or(InvoiceError::MissingApiKey)?;
        Self::builder().api_key(key).build()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into().trim().to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = ModelSelection::Fixed(model.into());
        self
    }

    /// Pick the model at startup from the service's model list.
    pub fn auto_model(mut self) -> Self {
        self.config.model = ModelSelection::Auto;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_polls(mut self, n: u32) -> Self {
        self.config.max_polls = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn rate_limit_cooldown_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit_cooldown_ms = ms;
        self
    }

    pub fn pacing_delay_ms(mut self, ms: u64) -> Self {
        self.config.pacing_delay_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, InvoiceError> {
        let c = &self.config;
        if c.max_attempts == 0 || c.max_attempts > 10 {
            return Err(InvoiceError::InvalidConfig(format!(
                "max_attempts must be 1–10, got {}",
                c.max_attempts
            )));
        }
        if c.max_polls == 0 {
            return Err(InvoiceError::InvalidConfig("max_polls must be ≥ 1".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(InvoiceError::InvalidConfig(
                "request_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(InvoiceError::InvalidConfig(format!(
                "base_url must be an HTTP/HTTPS URL, got '{}'",
                c.base_url
            )));
        }
        if let ModelSelection::Fixed(ref m) = c.model {
            if m.trim().is_empty() {
                return Err(InvoiceError::InvalidConfig("model must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the extraction model is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSelection {
    /// Use exactly this model id (`gemini-1.5-flash` or `models/gemini-1.5-flash`).
    Fixed(String),
    /// List the service's models once at startup and pick by priority:
    /// flash 1.5, any flash, pro 1.5, then a legacy fallback.
    Auto,
}

impl Default for ModelSelection {
    fn default() -> Self {
        ModelSelection::Fixed(DEFAULT_MODEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.poll_interval(), Duration::from_secs(2));
        assert_eq!(c.max_polls, 20);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.rate_limit_cooldown(), Duration::from_secs(15));
        assert_eq!(c.pacing_delay(), Duration::from_secs(4));
        assert_eq!(c.model, ModelSelection::Fixed(DEFAULT_MODEL.into()));
    }

    #[test]
    fn builder_rejects_out_of_range_attempts() {
        for n in [0, 11, 99] {
            let err = ExtractionConfig::builder().max_attempts(n).build().unwrap_err();
            assert!(matches!(err, InvoiceError::InvalidConfig(ref m) if m.contains("max_attempts")));
        }
        let c = ExtractionConfig::builder().max_attempts(10).build().unwrap();
        assert_eq!(c.max_attempts, 10);
        let c = ExtractionConfig::builder().max_attempts(1).build().unwrap();
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn builder_rejects_zero_polls() {
        let err = ExtractionConfig::builder().max_polls(0).build().unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(ref m) if m.contains("max_polls")));
        let c = ExtractionConfig::builder().max_polls(1).build().unwrap();
        assert_eq!(c.max_polls, 1);
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let err = ExtractionConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = ExtractionConfig::builder().model("  ").build().unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn builder_strips_trailing_slash() {
        let c = ExtractionConfig::builder()
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:8080");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder()
            .api_key("AIzaSECRET")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("AIzaSECRET"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }
}
