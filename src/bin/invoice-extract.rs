//! CLI binary for invoice-vlm.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, prints the extracted fields and optionally answers
//! questions about them.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_vlm::{
    ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, InvoiceExtractor,
    MergePrecedence, PageFailurePolicy, ProgressCallback, SessionHistory,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a page bar during extraction, and streamed answer
/// text during chat.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Bytes of the current chat answer already written to stdout.
    chat_written: Mutex<usize>,
    show_bar: bool,
    stream_chat: AtomicBool,
}

impl CliProgressCallback {
    fn new(show_bar: bool) -> Arc<Self> {
        let bar = if show_bar {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            chat_written: Mutex::new(0),
            show_bar,
            stream_chat: AtomicBool::new(false),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Start streaming a new chat answer to stdout.
    fn begin_answer(&self) {
        if let Ok(mut written) = self.chat_written.lock() {
            *written = 0;
        }
        self.stream_chat.store(self.show_bar, Ordering::SeqCst);
    }

    /// Finish the current answer; returns whether it was already printed.
    fn end_answer(&self) -> bool {
        self.stream_chat.swap(false, Ordering::SeqCst)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(page_num, Instant::now());
        }
        self.bar
            .set_message(format!("Processing page {page_num} of {total_pages}"));
    }

    fn on_page_retry(&self, page_num: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}  attempt {} failed: {}  {}",
            cyan("↻"),
            page_num,
            attempt,
            truncate(error, 70),
            dim("retrying…"),
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, fields_found: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{fields_found:>2}/13 fields")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if !self.show_bar {
            return;
        }
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} page(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }

    fn on_chat_update(&self, accumulated: &str) {
        if !self.stream_chat.load(Ordering::SeqCst) {
            return;
        }
        let Ok(mut written) = self.chat_written.lock() else {
            return;
        };
        if let Some(delta) = accumulated.get(*written..) {
            print!("{delta}");
            let _ = io::stdout().flush();
        }
        *written = accumulated.len();
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one invoice image
  invoice-extract invoice.png

  # Several images, each its own invoice, as JSON
  invoice-extract --json a.png b.jpg > results.json

  # Rendered PDF pages as one document
  invoice-extract --single-document --name scan.pdf page1.png page2.png

  # Ask a question about the result
  invoice-extract invoice.png --ask "When is the payment due?"

  # Interactive chat over every extracted invoice
  invoice-extract a.png b.png --chat

  # Remote Ollama server, different vision model
  invoice-extract --url http://gpu-box:11434 --model llava:13b invoice.png

CHAT COMMANDS:
  :history       list extracted invoices (newest first, * = current)
  :select <id>   ask about another invoice from the history
  :fields        print the current invoice again
  :quit          leave chat

ENVIRONMENT VARIABLES:
  INVOICE_VLM_BASE_URL    Model service URL (default http://localhost:11434)
  INVOICE_VLM_MODEL       Vision model (default llama3.2-vision)
  INVOICE_VLM_CHAT_MODEL  Model for questions (default: the vision model)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Extract invoice fields from images using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract invoice fields from images using a Vision LLM",
    long_about = "Extract 13 standard invoice fields (number, date, amount, currency, parties, \
payment details, tax and account numbers) from invoice images using a vision model served by \
Ollama, then optionally ask questions about the result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invoice image files (PNG or JPEG).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Treat all inputs as the pages of one document, in order.
    #[arg(long)]
    single_document: bool,

    /// Document name for --single-document (default: first file name).
    #[arg(long, requires = "single_document")]
    name: Option<String>,

    /// Model service base URL.
    #[arg(long = "url", env = "INVOICE_VLM_BASE_URL", default_value = "http://localhost:11434")]
    base_url: String,

    /// Vision model used for extraction.
    #[arg(long, env = "INVOICE_VLM_MODEL", default_value = "llama3.2-vision")]
    model: String,

    /// Model used to answer questions.
    #[arg(long, env = "INVOICE_VLM_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_VLM_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per request.
    #[arg(long, env = "INVOICE_VLM_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Attempts per page, including the first.
    #[arg(long, env = "INVOICE_VLM_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[arg(long, env = "INVOICE_VLM_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Per-attempt timeout in seconds (default: none).
    #[arg(long, env = "INVOICE_VLM_TIMEOUT")]
    timeout: Option<u64>,

    /// Pages in flight at once.
    #[arg(short, long, env = "INVOICE_VLM_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Fail the document on the first page that fails.
    #[arg(long)]
    abort_on_page_error: bool,

    /// Keep the first page's value when pages disagree.
    #[arg(long)]
    first_wins: bool,

    /// Upload images as-is, even over 10 MiB.
    #[arg(long)]
    no_optimise: bool,

    /// Path to a text file with a custom extraction prompt.
    #[arg(long, env = "INVOICE_VLM_PROMPT")]
    prompt: Option<PathBuf>,

    /// Output structured JSON instead of the field table.
    #[arg(long)]
    json: bool,

    /// Ask one question about the (last) extracted invoice.
    #[arg(long)]
    ask: Option<String>,

    /// Start an interactive chat after extraction.
    #[arg(long)]
    chat: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build extractor ──────────────────────────────────────────────────
    let progress = CliProgressCallback::new(show_progress);
    let config = build_config(&cli, progress.clone()).await?;
    let extractor = InvoiceExtractor::new(config).context("Failed to create extractor")?;
    let mut history = SessionHistory::new();

    // ── Extract ──────────────────────────────────────────────────────────
    let mut outputs: Vec<ExtractionOutput> = Vec::new();
    let mut failures = 0usize;

    let jobs: Vec<(Vec<PathBuf>, String)> = if cli.single_document {
        let name = cli
            .name
            .clone()
            .unwrap_or_else(|| file_name(&cli.inputs[0]));
        vec![(cli.inputs.clone(), name)]
    } else {
        cli.inputs
            .iter()
            .map(|p| (vec![p.clone()], file_name(p)))
            .collect()
    };

    for (paths, name) in jobs {
        match extractor.extract_files(paths, name.clone()).await {
            Ok(output) => {
                history.record(output.record.clone(), &output.filename, output.page_refs());
                if !cli.json {
                    print_record(&output, cli.quiet);
                }
                outputs.push(output);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), bold(&name), e);
            }
        }
    }

    if cli.json {
        let json = if outputs.len() == 1 {
            serde_json::to_string_pretty(&outputs[0])
        } else {
            serde_json::to_string_pretty(&outputs)
        }
        .context("Failed to serialise output")?;
        println!("{json}");
    }

    if history.is_empty() {
        anyhow::bail!("No invoice could be extracted ({failures} failed)");
    }

    // ── Questions ────────────────────────────────────────────────────────
    if let Some(ref question) = cli.ask {
        answer(&extractor, &progress, &history, question).await?;
    }
    if cli.chat {
        chat_loop(&extractor, &progress, &mut history).await?;
    }

    if failures > 0 {
        anyhow::bail!("{failures} invoice(s) failed");
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Arc<CliProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .base_url(&cli.base_url)
        .model(&cli.model)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_attempts(cli.max_attempts)
        .retry_delay_ms(cli.retry_delay_ms)
        .concurrency(cli.concurrency)
        .optimise_images(!cli.no_optimise)
        .progress_callback(progress as ProgressCallback);

    if let Some(ref m) = cli.chat_model {
        builder = builder.chat_model(m);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if cli.abort_on_page_error {
        builder = builder.page_failure(PageFailurePolicy::Abort);
    }
    if cli.first_wins {
        builder = builder.merge_precedence(MergePrecedence::FirstWins);
    }
    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Print the labelled field table with validity marks.
fn print_record(output: &ExtractionOutput, quiet: bool) {
    println!();
    println!("{}", bold(&output.filename));
    for row in output.record.rows() {
        let mark = if row.valid { green("✓") } else { red("✗") };
        println!("  {mark} {:<22} {}", format!("{}:", row.display_name), row.formatted);
    }
    if let Some(ref info) = output.record.additional_information {
        println!("\n  {}", bold("Additional Information"));
        for line in info.lines() {
            println!("    {line}");
        }
    }
    if !quiet {
        let s = &output.stats;
        eprintln!(
            "{}",
            dim(&format!(
                "  {}/13 fields  {}/{} pages  {} attempts  {}ms",
                s.fields_found, s.processed_pages, s.total_pages, s.total_attempts, s.total_duration_ms
            ))
        );
    }
}

/// Answer one question about the current history entry.
async fn answer(
    extractor: &InvoiceExtractor,
    progress: &CliProgressCallback,
    history: &SessionHistory,
    question: &str,
) -> Result<()> {
    let entry = history.current().context("No invoice selected")?;
    progress.begin_answer();
    let result = extractor.ask(&entry.record, question).await;
    let streamed = progress.end_answer();
    let text = result.context("Chat failed")?;
    if streamed {
        println!();
    } else {
        println!("{text}");
    }
    Ok(())
}

/// Interactive question loop over the session history.
async fn chat_loop(
    extractor: &InvoiceExtractor,
    progress: &CliProgressCallback,
    history: &mut SessionHistory,
) -> Result<()> {
    eprintln!(
        "{} {}",
        cyan("◆"),
        dim("Ask about the invoice. :history, :select <id>, :fields, :quit")
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if let Some(entry) = history.current() {
            print!("{} ", cyan(&format!("{}>", entry.filename)));
        }
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => continue,
            (":quit" | ":q" | "exit", _) => break,
            (":history", _) => print_history(history),
            (":fields", _) => {
                if let Some(entry) = history.current() {
                    for row in entry.record.rows() {
                        println!("  {:<22} {}", format!("{}:", row.display_name), row.formatted);
                    }
                }
            }
            (":select", id) => match id.parse::<u64>().ok().and_then(|id| history.select(id)) {
                Some(entry) => eprintln!("{} {}", green("✓"), entry.filename),
                None => eprintln!("{} no history entry {:?}", red("✗"), id),
            },
            _ => {
                if let Err(e) = answer(extractor, progress, history, line).await {
                    eprintln!("{} {:#}", red("✗"), e);
                }
            }
        }
    }
    Ok(())
}

fn print_history(history: &SessionHistory) {
    let current = history.current().map(|e| e.id);
    for entry in history.entries() {
        let marker = if Some(entry.id) == current { "*" } else { " " };
        println!(
            "{marker} {}  {}  {}  {}",
            entry.id,
            dim(&entry.timestamp),
            entry.filename,
            dim(&format!("{} page(s)", entry.page_count)),
        );
    }
}
