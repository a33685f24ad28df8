//! CLI binary for receipt-ledger.
//!
//! `extract` runs one receipt through the pipeline and prints the reply the
//! upload endpoint would send; `serve` runs that endpoint.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use receipt_ledger::server::{run_server, ServerConfig, DEFAULT_IDENTITY_HEADER};
use receipt_ledger::store::{JsonFileStore, MemoryStore, TransactionStore};
use receipt_ledger::{
    report_reply, IngestConfig, IngestProgressCallback, ProgressCallback, ReceiptPipeline,
    DEFAULT_GEMINI_MODEL,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────

/// Progress bar over the pages of one receipt.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Reading");
        bar.set_message("running OCR…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_ingest_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len} pages  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        self.bar.set_prefix("Extracting");
        self.bar.set_message("");
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, candidates: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3} {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{candidates} transaction(s)"))
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3} {}",
            red("✗"),
            page_num,
            total_pages,
            red(error)
        ));
    }

    fn on_ingest_complete(&self, _total_pages: usize, saved: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} {} transaction(s) saved", green("✔"), saved);
    }
}

// ── Arguments ────────────────────────────────────────────────────────────

/// Turn receipt images and PDFs into finance transactions.
#[derive(Parser, Debug)]
#[command(
    name = "receipt-ledger",
    version,
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECEIPT_LEDGER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RECEIPT_LEDGER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract transactions from one receipt and print the JSON reply.
    Extract(ExtractArgs),
    /// Serve the receipt upload endpoint.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Receipt image (png, jpg, ...) or PDF.
    file: PathBuf,

    /// Owner of the extracted transactions.
    #[arg(long, env = "RECEIPT_LEDGER_USER", default_value = "local")]
    user: String,

    /// Append saved transactions to this JSON file instead of discarding them.
    #[arg(long, env = "RECEIPT_LEDGER_STORE")]
    store: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, env = "RECEIPT_LEDGER_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// JSON file holding saved transactions.
    #[arg(long, env = "RECEIPT_LEDGER_STORE", default_value = "transactions.json")]
    store: PathBuf,

    #[arg(long, env = "RECEIPT_LEDGER_BIND", default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, env = "RECEIPT_LEDGER_PORT", default_value_t = 5000)]
    port: u16,

    /// Request header carrying the authenticated user id.
    #[arg(long, env = "RECEIPT_LEDGER_IDENTITY_HEADER", default_value = DEFAULT_IDENTITY_HEADER)]
    identity_header: String,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Text-generation provider: gemini, or any edgequake-llm provider name.
    #[arg(long, env = "RECEIPT_LEDGER_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Model ID.
    #[arg(long, env = "RECEIPT_LEDGER_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Pages extracted at once.
    #[arg(short, long, env = "RECEIPT_LEDGER_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-call generation timeout in seconds.
    #[arg(long, env = "RECEIPT_LEDGER_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Retries per generation call.
    #[arg(long, env = "RECEIPT_LEDGER_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Tesseract language pack.
    #[arg(long, env = "RECEIPT_LEDGER_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Path to the tesseract binary.
    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory holding the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Currency stored when the receipt names none.
    #[arg(long, env = "RECEIPT_LEDGER_CURRENCY", default_value = "INR")]
    currency: String,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "RECEIPT_LEDGER_MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: usize,
}

impl PipelineArgs {
    fn to_config(&self, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
        let mut builder = IngestConfig::builder()
            .provider_name(&self.provider)
            .model(&self.model)
            .concurrency(self.concurrency)
            .api_timeout_secs(self.api_timeout)
            .max_retries(self.max_retries)
            .ocr_language(&self.ocr_lang)
            .tesseract_path(&self.tesseract)
            .default_currency(&self.currency)
            .max_upload_bytes(self.max_upload_mb * 1024 * 1024);
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(dir) = &self.pdfium_lib {
            builder = builder.pdfium_library_path(dir);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = matches!(&cli.command, Command::Extract(a) if !a.no_progress) && !cli.quiet;
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

    match cli.command {
        Command::Extract(args) => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new())
            } else {
                None
            };
            let config = args.pipeline.to_config(progress)?;
            let store: Arc<dyn TransactionStore> = match &args.store {
                Some(path) => Arc::new(JsonFileStore::new(path)),
                None => Arc::new(MemoryStore::new()),
            };
            let pipeline = ReceiptPipeline::new(config, store)
                .context("Failed to initialise the pipeline")?;

            let result = pipeline.ingest_file(&args.file, &args.user).await;
            let reply = report_reply(&result);
            println!("{}", serde_json::to_string_pretty(&reply.body)?);
            if !reply.is_success() {
                std::process::exit(1);
            }
        }
        Command::Serve(args) => {
            let config = args.pipeline.to_config(None)?;
            let pipeline = ReceiptPipeline::new(config, Arc::new(JsonFileStore::new(&args.store)))
                .context("Failed to initialise the pipeline")?;
            run_server(
                pipeline,
                ServerConfig {
                    bind_addr: args.bind,
                    port: args.port,
                    identity_header: args.identity_header,
                },
            )
            .await
            .context("Server failed")?;
        }
    }

    Ok(())
}
