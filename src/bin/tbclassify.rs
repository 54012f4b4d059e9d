//! CLI binary for tb-classify.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClassifyConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tb_classify::pipeline::classify::truncate;
use tb_classify::{
    classify, extract_tables, inspect, reshape, ClassifyConfig, ProcessProgressCallback,
    ProgressCallback, Taxonomy,
};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-batch log
/// lines using [indicatif]. Works correctly when batches complete
/// out-of-order (concurrent mode).
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set by `on_run_start`
    /// (called before any batch is sent).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading workbook…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Classifying");
        self.bar.reset_eta();
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_batches: usize, total_rows: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Classifying {total_rows} rows in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch_index: usize, _total: usize, _rows: usize) {
        self.bar.set_message(format!("batch {}", batch_index + 1));
    }

    fn on_batch_complete(&self, batch_index: usize, total: usize, rows: usize) {
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            green("✓"),
            batch_index + 1,
            total,
            dim(&format!("{rows:>3} rows")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch_index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", truncate(error, 79))
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            red("✗"),
            batch_index + 1,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_batches: usize, succeeded: usize) {
        let failed = total_batches.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} batches classified successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} batches classified  ({} failed)",
                if failed == total_batches {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_batches,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Reshape a raw export into the canonical trial-balance layout
  tbclassify reshape raw_export.xlsx -o trial_balance.xlsx

  # Classify every account line (reshapes first by default)
  tbclassify classify trial_balance.xlsx -o classified.xlsx

  # Classify with a custom chart of accounts and smaller batches
  tbclassify classify tb.xlsx --taxonomy coa.json --batch-size 20 -o out.xlsx

  # Classify a workbook behind a signed URL
  tbclassify classify "https://storage.example.com/tb.xlsx?sig=..." -o out.xlsx

  # Extract a table from a scanned PDF (URL only)
  tbclassify extract "https://storage.example.com/scan.pdf?sig=..." -o extracted.xlsx

  # Inspect sheet names and dimensions (no API key needed)
  tbclassify inspect trial_balance.xlsx --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Classification API key
  JIGSAWSTACK_API_KEY     Vision-OCR API key (extract subcommand)
  TBCLASSIFY_MODEL        Override the classification model
  TBCLASSIFY_API_BASE     OpenAI-compatible base URL (self-hosted gateways)

SETUP:
  1. Set API key:   export OPENAI_API_KEY=sk-...
  2. Classify:      tbclassify classify trial_balance.xlsx -o classified.xlsx
"#;

/// Reshape and classify trial-balance spreadsheets with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "tbclassify",
    version,
    about = "Reshape and classify trial-balance spreadsheets with an LLM",
    long_about = "Normalise trial-balance workbooks (local files or URLs) into a canonical \
column layout and classify every account line into a four-level chart-of-accounts hierarchy \
via an OpenAI-compatible chat-completions API. Scanned PDFs are converted to spreadsheets \
through a vision-OCR service.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TBCLASSIFY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TBCLASSIFY_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "TBCLASSIFY_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "TBCLASSIFY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-API-call timeout in seconds.
    #[arg(long, global = true, env = "TBCLASSIFY_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reshape a workbook into the canonical trial-balance layout.
    Reshape {
        /// Local .xlsx path or HTTP/HTTPS URL.
        input: String,

        /// Write the reshaped workbook here (default: <input>.reshaped.xlsx).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify every account line and fill the classification columns.
    Classify {
        /// Local .xlsx path or HTTP/HTTPS URL.
        input: String,

        /// Write the classified workbook here (default: <input>.classified.xlsx).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Classification model ID.
        #[arg(long, env = "TBCLASSIFY_MODEL", default_value = "gpt-4-turbo")]
        model: String,

        /// Base URL of an OpenAI-compatible chat-completions API.
        #[arg(long, env = "TBCLASSIFY_API_BASE")]
        api_base: Option<String>,

        /// Path to a taxonomy JSON file ({type: {primary: {secondary: [tertiary]}}}).
        #[arg(long, env = "TBCLASSIFY_TAXONOMY")]
        taxonomy: Option<PathBuf>,

        /// Rows per classification request.
        #[arg(long, env = "TBCLASSIFY_BATCH_SIZE", default_value_t = 40)]
        batch_size: usize,

        /// Number of concurrent classification requests.
        #[arg(short, long, env = "TBCLASSIFY_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Sampling temperature (0.0–2.0).
        #[arg(long, env = "TBCLASSIFY_TEMPERATURE", default_value_t = 0.1)]
        temperature: f32,

        /// Max completion tokens per batch.
        #[arg(long, env = "TBCLASSIFY_MAX_TOKENS", default_value_t = 2048)]
        max_tokens: usize,

        /// Retries per batch on transient API failure.
        #[arg(long, env = "TBCLASSIFY_MAX_RETRIES", default_value_t = 3)]
        max_retries: u32,

        /// Skip the reshape pass (workbook is already canonical).
        #[arg(long)]
        no_reshape: bool,

        /// Print run results as JSON to stdout instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Extract a table from a scanned PDF via the vision-OCR service.
    Extract {
        /// HTTP/HTTPS URL the OCR service can fetch (signed URLs work).
        url: String,

        /// Write the extracted workbook here (default: extracted.xlsx).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the extracted grid as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print sheet names, dimensions and merge counts. No remote calls.
    Inspect {
        /// Local .xlsx path or HTTP/HTTPS URL.
        input: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let wants_progress = matches!(cli.command, Command::Classify { .. });
    let show_progress = wants_progress && !cli.quiet && !cli.no_progress;
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
        Command::Reshape { ref input, ref output } => {
            let config = base_config(&cli)?;
            let out = reshape(input, &config).await.context("Reshape failed")?;

            let path = output
                .clone()
                .unwrap_or_else(|| derived_output(input, "reshaped"));
            tokio::fs::write(&path, &out.workbook)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            if !cli.quiet {
                for (sheet, header_row) in &out.header_rows {
                    eprintln!(
                        "  {} {}  {}",
                        green("✓"),
                        bold(sheet),
                        dim(&format!("header found at row {}", header_row + 1)),
                    );
                }
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }

        Command::Classify {
            ref input,
            ref output,
            ref model,
            ref api_base,
            ref taxonomy,
            batch_size,
            concurrency,
            temperature,
            max_tokens,
            max_retries,
            no_reshape,
            json,
        } => {
            let progress_cb: Option<ProgressCallback> = if show_progress && !json {
                let cb = CliProgressCallback::new_dynamic();
                Some(cb as Arc<dyn ProcessProgressCallback>)
            } else {
                None
            };

            let mut builder = ClassifyConfig::builder()
                .model(model.clone())
                .batch_size(batch_size)
                .concurrency(concurrency)
                .temperature(temperature)
                .max_tokens(max_tokens)
                .max_retries(max_retries)
                .reshape_first(!no_reshape)
                .download_timeout_secs(cli.download_timeout)
                .api_timeout_secs(cli.api_timeout);

            if let Some(base) = api_base {
                builder = builder.api_base(base.clone());
            }
            if let Some(path) = taxonomy {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read taxonomy from {}", path.display()))?;
                builder = builder.taxonomy(Taxonomy::from_json(&text)?);
            }
            if let Some(cb) = progress_cb {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let out = classify(input, &config)
                .await
                .context("Classification failed")?;

            let path = output
                .clone()
                .unwrap_or_else(|| derived_output(input, "classified"));
            tokio::fs::write(&path, &out.workbook)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            if json {
                #[derive(serde::Serialize)]
                struct JsonReport<'a> {
                    output: &'a std::path::Path,
                    classifications: &'a [tb_classify::Classification],
                    batches: &'a [tb_classify::BatchResult],
                    stats: &'a tb_classify::RunStats,
                }
                let report = JsonReport {
                    output: &path,
                    classifications: &out.classifications,
                    batches: &out.batches,
                    stats: &out.stats,
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise output")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {}/{} rows classified  {}ms  →  {}",
                    if out.stats.failed_rows == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    out.stats.classified_rows,
                    out.stats.total_rows,
                    out.stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&out.stats.total_input_tokens.to_string()),
                    dim(&out.stats.total_output_tokens.to_string()),
                );
            }
        }

        Command::Extract { ref url, ref output, json } => {
            let config = base_config(&cli)?;
            let out = extract_tables(url, &config)
                .await
                .context("Extraction failed")?;

            let path = output
                .clone()
                .unwrap_or_else(|| PathBuf::from("extracted.xlsx"));
            tokio::fs::write(&path, &out.workbook)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out.grid)
                        .context("Failed to serialise grid")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} rows × {} cols  →  {}",
                    green("✔"),
                    out.grid.row_count(),
                    out.grid.col_count(),
                    bold(&path.display().to_string()),
                );
            }
        }

        Command::Inspect { ref input, json } => {
            let info = inspect(input).await.context("Failed to inspect workbook")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialise metadata")?
                );
            } else {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "File:    {input}")?;
                writeln!(stdout, "Sheets:  {}", info.sheet_names.len())?;
                for (i, name) in info.sheet_names.iter().enumerate() {
                    let (rows, cols) = info.dimensions[i];
                    writeln!(
                        stdout,
                        "  {name}: {rows} rows × {cols} cols, {} merged regions",
                        info.merge_counts[i]
                    )?;
                }
            }
        }
    }

    Ok(())
}

/// Config for subcommands that only need timeouts.
fn base_config(cli: &Cli) -> Result<ClassifyConfig> {
    ClassifyConfig::builder()
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .build()
        .context("Invalid configuration")
}

/// Derive `<stem>.<tag>.xlsx` next to the input for local paths, or a bare
/// `<tag>.xlsx` in the working directory for URLs.
fn derived_output(input: &str, tag: &str) -> PathBuf {
    if input.starts_with("http://") || input.starts_with("https://") {
        return PathBuf::from(format!("{tag}.xlsx"));
    }
    let path = PathBuf::from(input);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| tag.to_string());
    path.with_file_name(format!("{stem}.{tag}.xlsx"))
}
