//! CLI binary for edgequake-invoice2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice::{
    load_document, stream_indexed, write_result, DocumentKind, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, InvoiceError, InvoicePipeline, InvoiceRecord, ProgressCallback, Stage,
    StageFailure,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the current stage of each
/// document, plus one log line per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, source: &str, stage: Stage) {
        let label = match stage {
            Stage::Read => "reading",
            Stage::Normalize => "detecting language",
            Stage::Extract | Stage::Validate => "extracting fields",
        };
        self.bar.set_message(format!("{source}: {label}…"));
    }

    fn on_document_failed(&self, source: &str, failure: &StageFailure) {
        self.bar.println(format!(
            "  {} {}  {} {}",
            red("✗"),
            source,
            dim(&format!("[{}]", failure.stage)),
            red(&failure.reason)
        ));
    }

    fn on_document_complete(&self, source: &str, record: &InvoiceRecord) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            source,
            dim(&format!("{}/4 fields", record.filled_fields()))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scanned invoice (vision model)
  invoice2json scan.png

  # Word document, result written to a file
  invoice2json invoice.docx -o invoice.json

  # Text with an unusual extension
  invoice2json --kind text export.dat

  # Several invoices at once, four in flight
  invoice2json --concurrency 4 a.png b.docx c.txt

  # Show the raw and English text next to the JSON
  invoice2json --show-text rechnung.txt

OUTPUT:
  Success:  {"invoice_number": ..., "date": ..., "vendor": ..., "total": ...}
            (all four keys always present; unknown values are null)
  Failure:  {"stage": "read|normalize|extract|validate", "reason": "..."}
  The exit code is 1 when any document failed.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID

  A .env file in the working directory is loaded first.
"#;

/// Extract invoice fields from images, DOCX and text files using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract invoice number, date, vendor and total as JSON",
    long_about = "Extract structured invoice fields from scanned images, DOCX files and plain \
text using Language Models. Non-English invoices are translated before extraction. Supports \
OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Document kind: image, docx or text. Inferred from the file extension when omitted.
    #[arg(long, value_parser = parse_kind)]
    kind: Option<DocumentKind>,

    /// Write the JSON result to this file instead of stdout (single input only).
    #[arg(short, long, env = "INVOICE2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (must be vision-capable for image inputs).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Retries per model call on transient failures (timeouts, 5xx, 429).
    #[arg(long, env = "INVOICE2JSON_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Documents processed at once when several inputs are given.
    #[arg(short, long, env = "INVOICE2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print the raw and English texts to stderr.
    #[arg(long)]
    show_text: bool,

    /// Print the full output (texts and token stats) instead of the bare result.
    #[arg(long)]
    full: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "INVOICE2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON result.
    #[arg(short, long, env = "INVOICE2JSON_QUIET")]
    quiet: bool,
}

fn parse_kind(s: &str) -> Result<DocumentKind, InvoiceError> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
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

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output accepts a single input, got {}", cli.inputs.len());
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    // Provider resolution fails fast, before any download starts.
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )?;
    let pipeline = InvoicePipeline::new(config).context("Failed to configure LLM provider")?;

    // ── Load documents ───────────────────────────────────────────────────
    let mut documents = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let document = load_document(input, cli.kind, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load '{input}'"))?;
        documents.push(document);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let mut indexed: Vec<(usize, ExtractionOutput)> =
        stream_indexed(pipeline, documents).collect().await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    // Completion order is arbitrary; print in argument order.
    indexed.sort_by_key(|(index, _)| *index);
    let outputs: Vec<ExtractionOutput> = indexed.into_iter().map(|(_, output)| output).collect();

    let mut failed = 0usize;
    for output in &outputs {
        if !output.result.is_success() {
            failed += 1;
        }
        if cli.show_text {
            print_texts(output);
        }

        if let Some(ref path) = cli.output {
            write_result(&output.result, path)
                .await
                .context("Failed to write output")?;
            if !cli.quiet {
                eprintln!("{}  →  {}", status_mark(output), bold(&path.display().to_string()));
            }
        } else {
            let json = if cli.full {
                serde_json::to_string_pretty(output)
            } else {
                serde_json::to_string_pretty(&output.result)
            }
            .context("Failed to serialise output")?;
            println!("{json}");
        }

        if !cli.quiet {
            eprintln!(
                "   {} tokens in  /  {} tokens out  —  {}ms",
                dim(&output.stats.total_input_tokens.to_string()),
                dim(&output.stats.total_output_tokens.to_string()),
                output.stats.total_duration_ms,
            );
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn status_mark(output: &ExtractionOutput) -> String {
    if output.result.is_success() {
        green("✔")
    } else {
        red("✘")
    }
}

fn print_texts(output: &ExtractionOutput) {
    eprintln!("{}", bold(&format!("── {} ──", output.source_name)));
    if let Some(ref raw) = output.raw_text {
        eprintln!("{}\n{}\n", dim("raw text:"), raw.content);
    }
    if let Some(ref normalized) = output.normalized {
        eprintln!(
            "{}\n{}\n",
            dim(&format!(
                "english text (detected: {}, translated: {}):",
                normalized.detected_language, normalized.was_translated
            )),
            normalized.content
        );
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .concurrency(cli.concurrency);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
