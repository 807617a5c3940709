//! CLI binary for edgequake-invoice.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and writes the report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice::pipeline::input::collect_pdf_paths;
use edgequake_invoice::{
    BatchProgressCallback, BatchResult, ExtractionConfig, Extractor, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// invoice.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the invoice currently in flight.
    item_start: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            item_start: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.item_start
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting fields from {total} invoices…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut s) = self.item_start.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, name: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, ok_count: usize) {
        let failed = total.saturating_sub(ok_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} invoices extracted successfully",
                green("✔"),
                bold(&ok_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoices extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&ok_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every PDF in a folder, CSV report to a file
  invoice-extract facturas/ -o reporte.csv

  # A few files, CSV to stdout
  invoice-extract enero.pdf febrero.pdf

  # JSON records instead of CSV
  invoice-extract --json facturas/ > reporte.json

  # Let the service pick the best available flash model
  invoice-extract --auto-model facturas/ -o reporte.csv

  # Paid tier: no pacing, shorter cooldown
  invoice-extract --pacing-secs 0 --cooldown-secs 5 facturas/ -o reporte.csv

REPORT COLUMNS:
  archivo, estado, nombre_empresa, valor_pagar, fecha_limite,
  fecha_expedicion, nit_empresa, numero_contrato, error_log

  Field columns appear when at least one invoice succeeded; error_log
  appears when at least one failed.

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Google AI Studio API key
  GEMINI_API_KEY          Alternative name for the same key
  INVOICE_MODEL           Override model ID (default models/gemini-1.5-flash)
  RUST_LOG                Override log filter (e.g. edgequake_invoice=debug)
"#;

/// Extract billing fields from invoice PDFs with Google Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract billing fields from invoice PDFs with Google Gemini",
    long_about = "Upload invoice PDFs to Google Gemini one at a time, extract contract \
number, company tax ID, company name, issue date, due date and amount due, and write \
one row per invoice to a CSV (or JSON) report. Failed invoices get an ERROR row with \
the reason instead of stopping the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files or directories containing PDFs.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, env = "INVOICE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output JSON records instead of CSV.
    #[arg(long, env = "INVOICE_JSON")]
    json: bool,

    /// Gemini model ID (e.g. gemini-1.5-flash, models/gemini-1.5-pro).
    #[arg(long, env = "INVOICE_MODEL", conflicts_with = "auto_model")]
    model: Option<String>,

    /// Pick the model from the service's model list (flash 1.5 first).
    #[arg(long, env = "INVOICE_AUTO_MODEL")]
    auto_model: bool,

    /// API key (prefer the environment variable).
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Total extraction attempts per invoice when rate limited (1–10).
    #[arg(long, env = "INVOICE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Seconds to wait after a rate-limit error before retrying.
    #[arg(long, env = "INVOICE_COOLDOWN_SECS", default_value_t = 15)]
    cooldown_secs: u64,

    /// Seconds to pause between invoices.
    #[arg(long, env = "INVOICE_PACING_SECS", default_value_t = 4)]
    pacing_secs: u64,

    /// Milliseconds between processing-state polls after upload.
    #[arg(long, env = "INVOICE_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Maximum processing-state polls before giving up on an invoice.
    #[arg(long, env = "INVOICE_MAX_POLLS", default_value_t = 20)]
    max_polls: u32,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "INVOICE_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "INVOICE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve inputs ───────────────────────────────────────────────────
    let paths = collect_pdf_paths(&cli.inputs).context("Failed to scan input directories")?;
    if paths.is_empty() {
        anyhow::bail!("No PDF files found in the given inputs");
    }

    // ── Build config and client ──────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let extractor = Extractor::new(config)
        .await
        .context("Failed to initialise the Gemini client")?;

    // ── Run batch ────────────────────────────────────────────────────────
    let result = extractor.extract_paths(&paths).await;

    // ── Write report ─────────────────────────────────────────────────────
    match (&cli.output, cli.json) {
        (Some(path), false) => result
            .write_csv_file(path)
            .context("Failed to write CSV report")?,
        (Some(path), true) => {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialise report")?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        (None, false) => {
            let stdout = io::stdout();
            result
                .write_csv(stdout.lock())
                .context("Failed to write to stdout")?;
        }
        (None, true) => {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialise report")?;
            let mut handle = io::stdout().lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        print_summary(&result, &cli, show_progress, extractor.model());
    }

    Ok(())
}

fn print_summary(result: &BatchResult, cli: &Cli, show_progress: bool, model: &str) {
    let stats = &result.stats;
    if !show_progress {
        eprintln!(
            "Extracted {}/{} invoices in {}ms",
            stats.ok, stats.total, stats.total_duration_ms
        );
        if stats.failed > 0 {
            eprintln!("  {} invoices failed", stats.failed);
        }
    }
    if let Some(ref path) = cli.output {
        eprintln!(
            "{}  {}/{} OK  {}ms  →  {}",
            if stats.failed == 0 { green("✔") } else { cyan("⚠") },
            stats.ok,
            stats.total,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
    }
    eprintln!("   {}", dim(&format!("model: {model}")));
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_attempts(cli.max_attempts)
        .rate_limit_cooldown_ms(cli.cooldown_secs * 1000)
        .pacing_delay_ms(cli.pacing_secs * 1000)
        .poll_interval_ms(cli.poll_interval_ms)
        .max_polls(cli.max_polls)
        .request_timeout_secs(cli.api_timeout);

    // --api-key (or GOOGLE_API_KEY through clap) wins; otherwise fall back to
    // the library's own env lookup, which also knows GEMINI_API_KEY.
    let api_key = match cli.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(k) => k.trim().to_string(),
        None => ExtractionConfig::from_env()
            .context("No API key")?
            .api_key,
    };
    builder = builder.api_key(api_key);

    if cli.auto_model {
        builder = builder.auto_model();
    } else if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
