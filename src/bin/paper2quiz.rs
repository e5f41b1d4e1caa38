//! CLI binary for paper2quiz.
//!
//! A thin shim over the library crate that maps subcommands and flags to the
//! config builders and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paper2quiz::{
    explain_file, extract_to_file, inspect, validate_file, BackfillConfig,
    BackfillProgressCallback, ExtractionConfig, ExtractionProgressCallback, GatewayConfig,
};
use std::io;
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn spinner(prefix: &'static str, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix(prefix);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn activate_bar(bar: &ProgressBar, prefix: &'static str, unit: &str, total: usize) {
    let template = format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
         ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
    );
    let style = ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
    bar.set_length(total as u64);
    bar.set_style(style);
    bar.set_prefix(prefix);
    bar.reset_eta();
}

// ── Progress callbacks using indicatif ───────────────────────────────────────

/// One log line per page under a bar anchored at the bottom of the terminal.
struct ExtractProgressBar {
    bar: ProgressBar,
}

impl ExtractProgressBar {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: spinner("Preparing", "Opening PDF…"),
        })
    }
}

impl ExtractionProgressCallback for ExtractProgressBar {
    fn on_extraction_start(&self, total_pages: usize) {
        activate_bar(&self.bar, "Extracting", "pages", total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting questions from {total_pages} pages…"))
        ));
    }

    fn on_page_complete(&self, completed: usize, total: usize, questions_found: usize) {
        let mark = if questions_found > 0 { green("✓") } else { dim("·") };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            mark,
            completed,
            total,
            dim(&format!("{questions_found:>3} questions")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, _total_pages: usize, _total_questions: usize) {
        self.bar.finish_and_clear();
    }
}

struct ExplainProgressBar {
    bar: ProgressBar,
}

impl ExplainProgressBar {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: spinner("Preparing", "Loading paper…"),
        })
    }
}

impl BackfillProgressCallback for ExplainProgressBar {
    fn on_backfill_start(&self, pending: usize) {
        activate_bar(&self.bar, "Explaining", "questions", pending);
    }

    fn on_question_complete(&self, _done: usize, _pending: usize, index: usize, error: Option<&str>) {
        if let Some(error) = error {
            let msg: String = if error.chars().count() > 80 {
                error.chars().take(79).chain(['…']).collect()
            } else {
                error.to_string()
            };
            self.bar
                .println(format!("  {} Question {:>4}  {}", red("✗"), index, red(&msg)));
        }
        self.bar.inc(1);
    }

    fn on_checkpoint(&self, succeeded: usize) {
        self.bar.set_message(format!("checkpoint @ {succeeded}"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract pages 2-14 into a paper file
  paper2quiz extract biology-2019.pdf --start 2 --end 14 -o biology-2019.json

  # Extract from a URL with a different model
  paper2quiz extract https://example.com/paper.pdf --start 1 --end 8 \
      --provider openai --model gpt-4.1-mini -o paper.json

  # Fill in explanations, checkpointing every 10 questions
  paper2quiz explain biology-2019.json -o biology-2019.explained.json

  # Continue an interrupted run from its checkpoint
  paper2quiz explain biology-2019.json -o biology-2019.explained.json --resume

  # Page count (no API key needed)
  paper2quiz inspect biology-2019.pdf

  # Check a paper file for malformed questions
  paper2quiz validate biology-2019.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_PROVIDER      Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Log filter, e.g. paper2quiz=debug
"#;

/// Extract multiple-choice questions from exam-paper PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "paper2quiz",
    version,
    about = "Extract multiple-choice questions from exam-paper PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PAPER2QUIZ_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPER2QUIZ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPER2QUIZ_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract questions from a page range into a paper file.
    Extract(ExtractArgs),
    /// Generate explanations for answered questions in a paper file.
    Explain(ExplainArgs),
    /// Print the page count of a PDF.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        /// PDF user password for encrypted documents.
        #[arg(long, env = "PAPER2QUIZ_PASSWORD")]
        password: Option<String>,
    },
    /// Report malformed questions in a paper file.
    Validate {
        /// Paper file (JSON).
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PAPER2QUIZ_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPER2QUIZ_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// First page to extract (1-indexed).
    #[arg(long)]
    start: usize,

    /// Last page to extract (inclusive).
    #[arg(long)]
    end: usize,

    /// Write the paper file here.
    #[arg(short, long)]
    output: PathBuf,

    /// Paper name. Defaults to the input file stem.
    #[arg(long)]
    name: Option<String>,

    /// Render scale relative to pdfium's default resolution (0.5–6.0).
    #[arg(long, env = "PAPER2QUIZ_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Delay between page requests in milliseconds.
    #[arg(long, env = "PAPER2QUIZ_PAGE_DELAY_MS", default_value_t = 100)]
    page_delay_ms: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAPER2QUIZ_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPER2QUIZ_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ExplainArgs {
    /// Paper file (JSON) to read.
    input: PathBuf,

    /// Checkpoint and output file. Defaults to overwriting the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Checkpoint after this many successful explanations.
    #[arg(long, env = "PAPER2QUIZ_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,

    /// Start from the output file if it already exists.
    #[arg(long)]
    resume: bool,

    /// Regenerate explanations that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Delay between model calls in milliseconds.
    #[arg(long, env = "PAPER2QUIZ_REQUEST_DELAY_MS", default_value_t = 0)]
    request_delay_ms: u64,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters, so library INFO
    // logs are hidden while it is shown.
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

    match cli.command {
        Command::Extract(ref args) => run_extract(&cli, args).await,
        Command::Explain(ref args) => run_explain(&cli, args).await,
        Command::Inspect {
            ref input,
            ref password,
        } => {
            let pages = inspect(input, password.as_deref())
                .await
                .context("Failed to inspect PDF")?;
            println!("File:   {input}");
            println!("Pages:  {pages}");
            Ok(())
        }
        Command::Validate { ref input } => {
            let problems = validate_file(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            if problems.is_empty() {
                if !cli.quiet {
                    eprintln!("{} no problems found", green("✔"));
                }
                return Ok(());
            }
            for problem in &problems {
                println!("{problem}");
            }
            anyhow::bail!("{} problem(s) in {}", problems.len(), input.display());
        }
    }
}

fn gateway_config(args: &ModelArgs) -> Result<GatewayConfig> {
    let mut builder = GatewayConfig::builder()
        .max_tokens(args.max_tokens)
        .temperature(args.temperature);
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    builder.build().context("Invalid model configuration")
}

async fn run_extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let gateway = gateway_config(&args.model)?;

    let mut builder = ExtractionConfig::builder()
        .scale(args.scale)
        .page_delay_ms(args.page_delay_ms)
        .download_timeout_secs(args.download_timeout);
    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    if !cli.quiet && !cli.no_progress {
        builder = builder.progress_callback(ExtractProgressBar::new());
    }
    let extraction = builder.build().context("Invalid configuration")?;

    let paper = extract_to_file(
        &args.input,
        &args.output,
        args.start,
        args.end,
        args.name.as_deref(),
        &gateway,
        &extraction,
    )
    .await
    .context("Extraction failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} questions from {} pages  →  {}",
            green("✔"),
            bold(&paper.stats.total_questions.to_string()),
            paper.stats.pages_processed,
            bold(&args.output.display().to_string()),
        );
        eprintln!(
            "   {} tokens  /  {} estimated",
            dim(&paper.stats.tokens_used.to_string()),
            dim(&paper.stats.estimated_cost),
        );
    }
    Ok(())
}

async fn run_explain(cli: &Cli, args: &ExplainArgs) -> Result<()> {
    let gateway = gateway_config(&args.model)?;
    let output = args.output.clone().unwrap_or_else(|| args.input.clone());

    let mut builder = BackfillConfig::builder()
        .batch_size(args.batch_size)
        .resume(args.resume)
        .skip_existing(!args.overwrite)
        .request_delay_ms(args.request_delay_ms);
    let progress = if !cli.quiet && !cli.no_progress {
        let bar = ExplainProgressBar::new();
        builder = builder.progress_callback(bar.clone());
        Some(bar)
    } else {
        None
    };
    let backfill = builder.build().context("Invalid configuration")?;

    let report = explain_file(&args.input, &output, &gateway, &backfill)
        .await
        .context("Explanation backfill failed")?;

    if let Some(bar) = progress {
        bar.bar.finish_and_clear();
    }

    if !cli.quiet {
        eprintln!(
            "{} {}/{} explanations written  →  {}",
            if report.errors == 0 { green("✔") } else { cyan("⚠") },
            bold(&report.succeeded.to_string()),
            report.pending,
            bold(&output.display().to_string()),
        );
        if report.errors > 0 {
            eprintln!("   {} questions failed, re-run with --resume", red(&report.errors.to_string()));
        }
        eprintln!(
            "   {} skipped without answer, {} already explained",
            dim(&report.ineligible.to_string()),
            dim(&report.already_explained.to_string()),
        );
        eprintln!(
            "   {} tokens  /  {} estimated",
            dim(&report.usage.total_tokens.to_string()),
            dim(&paper2quiz::usage::format_cost(report.estimated_cost)),
        );
    }
    Ok(())
}
