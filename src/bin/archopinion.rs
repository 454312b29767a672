//! CLI binary for archopinion.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ReviewConfig`, runs the review and writes the report.

use anyhow::{Context, Result};
use archopinion::prompts;
use archopinion::{
    default_output_path, inspect, review_to_file, ErrorKind, OutputFormat, ProgressCallback,
    ProjectInfo, ResponseFormat, ReviewConfig, ReviewError, ReviewProgressCallback, ReviewStage,
    ReviewType, SectionRule,
};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Once};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner for the running stage and one log
/// line per finished stage.
///
/// Nothing is drawn until the first stage starts, so a run that fails
/// before the pipeline leaves the terminal clean.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Once,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Arc::new(Self {
            bar,
            started: Once::new(),
        })
    }

    /// Clear the spinner after a failure outside any stage.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ReviewProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: ReviewStage) {
        self.started.call_once(|| {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
            self.bar.enable_steady_tick(Duration::from_millis(80));
        });
        self.bar.set_prefix(stage.to_string());
        let msg = match stage {
            ReviewStage::Analyse => "waiting for the model…",
            _ => "",
        };
        self.bar.set_message(msg);
    }

    fn on_stage_complete(&self, stage: ReviewStage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<20} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        if stage == ReviewStage::Write {
            self.bar.finish_and_clear();
        }
    }

    fn on_stage_error(&self, stage: ReviewStage, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<20} {}", red("✗"), stage.to_string(), red(&msg)));
        self.bar.finish_and_clear();
    }

    fn on_retry(&self, attempt: u32, max_retries: u32, backoff_ms: u64) {
        self.bar.println(format!(
            "  {} retry {attempt}/{max_retries} in {}",
            cyan("↻"),
            dim(&format!("{:.1}s", backoff_ms as f64 / 1000.0)),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # NPPF review, report written to ./reports/
  archopinion floor-plans-proposed.pdf

  # Building Regulations review with project details
  archopinion -t building-regs --address "12 Acacia Avenue" \
      --project-type "Rear extension" --council "Leeds" drawings.pdf

  # Own prompt, Markdown report to a chosen path
  archopinion --prompt-file brief.txt -o review.md drawings.pdf

  # Review a drawing set published online
  archopinion https://example.org/planning/elevations-proposed.pdf

  # Inspect PDF metadata (no API key needed)
  archopinion --inspect-only site-plan.pdf

REVIEW TYPES:
  nppf            National Planning Policy Framework (default)
  local-plan      Local Plan / Local Development Framework policies
  building-regs   Building Regulations, Approved Documents A-S
  pdr             Permitted Development Rights (GPDO 2015, Schedule 2)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (GOOGLE_API_KEY also accepted)
  GEMINI_MODEL            Override model ID
  OUTPUT_DIR              Directory for reports without -o (default ./reports)

EXIT CODES:
  0  report written
  1  internal error
  2  input error (missing file, not a PDF, too large)
  3  configuration error (missing key, bad flag)
  4  network or API error
  5  report rendering or write error
"#;

/// Review architectural drawing PDFs for UK planning compliance.
#[derive(Parser, Debug)]
#[command(
    name = "archopinion",
    version,
    about = "Review architectural drawing PDFs for UK planning compliance",
    long_about = "Send an architectural drawing PDF (local file or URL) to Google Gemini with a \
fixed compliance prompt (NPPF, Local Plan, Building Regulations or Permitted Development) and \
render the answer as a paginated PDF report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Review type: nppf, local-plan, building-regs, pdr.
    #[arg(short = 't', long = "type", env = "ARCHOPINION_REVIEW_TYPE", default_value = "nppf")]
    review_type: String,

    /// Text file with your own prompt (implies a custom review).
    #[arg(long, env = "ARCHOPINION_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Extra instructions appended after the project details.
    #[arg(long)]
    instructions: Option<String>,

    /// Site address.
    #[arg(long)]
    address: Option<String>,

    /// Project type, e.g. "Two-storey rear extension".
    #[arg(long)]
    project_type: Option<String>,

    /// Local planning authority.
    #[arg(long)]
    council: Option<String>,

    /// Previous planning application reference.
    #[arg(long)]
    planning_ref: Option<String>,

    /// Write the report to this file (format inferred from the extension).
    #[arg(short, long, env = "ARCHOPINION_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for generated report names when -o is not given.
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Report format: pdf, markdown, json.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Gemini model ID.
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// .env file to read the key from (default: ./.env if present).
    #[arg(long, env = "ARCHOPINION_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// API call timeout in seconds.
    #[arg(long, env = "ARCHOPINION_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "ARCHOPINION_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest PDF accepted, in MiB.
    #[arg(long, env = "ARCHOPINION_MAX_DOCUMENT_MB", default_value_t = 20)]
    max_document_mb: usize,

    /// Retries on rate limits, timeouts and 5xx responses.
    #[arg(long, env = "ARCHOPINION_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ARCHOPINION_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Ask the model for a JSON analysis instead of Markdown sections.
    #[arg(long)]
    json_response: bool,

    /// How to split the answer: auto, headings, title-lines, blank-lines.
    #[arg(long, default_value = "auto")]
    section_rule: String,

    /// Regex matching section title lines (overrides --section-rule).
    #[arg(long)]
    section_pattern: Option<String>,

    /// Leave the disclaimer out of the report.
    #[arg(long)]
    no_disclaimer: bool,

    /// Print PDF metadata only, no review.
    #[arg(long)]
    inspect_only: bool,

    /// Print the prompt that would be sent, then exit.
    #[arg(long)]
    print_prompt: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "ARCHOPINION_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ARCHOPINION_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ARCHOPINION_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pdf,
    #[value(alias = "md")]
    Markdown,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Values in .env become visible to the clap env mirrors below.
    dotenvy::dotenv().ok();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match usage_exit_code(&e) {
            Some(code) => {
                let _ = e.print();
                return ExitCode::from(code);
            }
            None => e.exit(),
        },
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", red("error:"), err);
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<ReviewError>())
                .map(|e| e.kind().exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Exit code for a failed parse. `None` for `--help` and `--version`, which
/// clap handles itself.
fn usage_exit_code(err: &clap::Error) -> Option<u8> {
    if err.use_stderr() {
        Some(ErrorKind::Configuration.exit_code())
    } else {
        None
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters, so library INFO logs
    // are hidden while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only && !cli.print_prompt;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.download_timeout)
            .await
            .context("Failed to inspect PDF")?;
        println!("File:         {}", meta.source);
        println!("Drawing:      {}", meta.kind);
        if let Some(ref t) = meta.title {
            println!("Title:        {}", t);
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {}", a);
        }
        println!("Pages:        {}", meta.page_count);
        println!("Size:         {} bytes", meta.size_bytes);
        println!("PDF Version:  {}", meta.pdf_version);
        println!("Encrypted:    {}", meta.is_encrypted);
        return Ok(());
    }

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|s| s as Arc<dyn ReviewProgressCallback>);
    let config = build_config(&cli, progress_cb).await?;

    // ── Print-prompt mode ────────────────────────────────────────────────
    if cli.print_prompt {
        let prompt = prompts::select_prompt(config.review_type, config.custom_prompt.as_deref())?;
        println!("{prompt}");
        if let Some(context) = prompts::build_context(
            &config.project,
            None,
            config.instructions.as_deref(),
            config.response_format,
        ) {
            println!("\n{context}");
        }
        return Ok(());
    }

    // ── Run review ───────────────────────────────────────────────────────
    let format = cli
        .format
        .map(OutputFormat::from)
        .or_else(|| cli.output.as_deref().and_then(OutputFormat::from_path))
        .unwrap_or_default();
    let output_path = match (&cli.output, &cli.output_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(dir)) => Some(default_output_path(dir, &cli.input, format, Local::now())),
        (None, None) => None,
    };

    if !cli.quiet {
        eprintln!(
            "{} {} {}",
            cyan("◆"),
            bold(&format!("{} review of", config.review_type.label())),
            cli.input
        );
    }

    let result = review_to_file(&cli.input, output_path.as_deref(), format, &config).await;
    if result.is_err() {
        if let Some(ref s) = spinner {
            s.abandon();
        }
    }
    let (path, output) = result.context("Review failed")?;

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} sections  {} pages  {}ms  →  {}",
            green("✔"),
            stats.sections,
            stats.page_count,
            stats.total_ms,
            bold(&path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.prompt_tokens.to_string()),
            dim(&stats.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ReviewConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReviewConfig> {
    let section_rule = match cli.section_pattern {
        Some(ref re) => SectionRule::pattern(re)?,
        None => cli.section_rule.parse::<SectionRule>()?,
    };

    let project = ProjectInfo {
        address: cli.address.clone(),
        project_type: cli.project_type.clone(),
        council: cli.council.clone(),
        planning_reference: cli.planning_ref.clone(),
    };

    let mut builder = ReviewConfig::builder()
        .project(project)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_document_bytes(cli.max_document_mb.saturating_mul(1024 * 1024))
        .max_retries(cli.max_retries)
        .temperature(cli.temperature)
        .section_rule(section_rule)
        .include_disclaimer(!cli.no_disclaimer);

    if let Some(ref path) = cli.prompt_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.review_type(ReviewType::Custom).custom_prompt(text);
    } else {
        builder = builder.review_type(cli.review_type.parse::<ReviewType>()?);
    }

    if cli.json_response {
        builder = builder.response_format(ResponseFormat::Json);
    }
    if let Some(ref text) = cli.instructions {
        builder = builder.instructions(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = cli.env_file {
        builder = builder.env_file(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_flag_value_exits_with_configuration_code() {
        let err = Cli::try_parse_from(["archopinion", "--format", "docx", "plans.pdf"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), Some(3));

        let err = Cli::try_parse_from(["archopinion", "--no-such-flag", "plans.pdf"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), Some(3));
    }

    #[test]
    fn help_and_version_are_left_to_clap() {
        let err = Cli::try_parse_from(["archopinion", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), None);
        let err = Cli::try_parse_from(["archopinion", "--version"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), None);
    }

    #[test]
    fn spinner_stays_hidden_until_a_stage_starts() {
        let cb = CliProgressCallback::new();
        assert!(cb.bar.is_hidden());
        assert!(!cb.started.is_completed());

        cb.abandon();
        assert!(cb.bar.is_finished());
        cb.abandon();
    }

    #[test]
    fn first_stage_starts_the_spinner() {
        let cb = CliProgressCallback::new();
        cb.on_stage_start(ReviewStage::Analyse);
        assert!(cb.started.is_completed());
        cb.on_stage_error(ReviewStage::Analyse, "boom");
        assert!(cb.bar.is_finished());
    }
}
