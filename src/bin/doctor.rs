//! CLI binary for doctor-core.
//!
//! A thin shim over the library: runs the input validators from the command
//! line, inspects local files the way an upload would be inspected, and
//! prints the policy tables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doctor_core::validate::{self, file::HASH_CHUNK_SIZE};
use doctor_core::{
    can_convert, ConversionOptions, DocumentFormat, ErrorCode, FileInfo, Priority, ServiceConfig,
    Task, UploadSource, ValidationResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::debug;
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Check an upload name before accepting it
  doctor check-filename "../../etc/passwd"

  # Check a remote source
  doctor check-url https://example.com/readme.md

  # Check pasted text from stdin
  cat notes.md | doctor check-text

  # Inspect a file as an upload and plan a conversion
  doctor inspect report.md --format md --to pdf --priority high

  # Machine-readable inspection
  doctor inspect paper.pdf --format pdf --to html --json

  # Policy tables
  doctor formats
  doctor error-codes

ENVIRONMENT VARIABLES:
  DOCTOR_MAX_FILE_SIZE    File upload ceiling in bytes (default 500000000)
  DOCTOR_MAX_TEXT_SIZE    Raw text ceiling in bytes (default 10485760)
  DOCTOR_MAX_URL_SIZE     URL fetch ceiling in bytes (default 104857600)
  RUST_LOG                Overrides the log filter chosen by -v / -q
"#;

/// Validate uploads and inspect conversion policy for the Doctor service.
#[derive(Parser, Debug)]
#[command(
    name = "doctor",
    version,
    about = "Validate uploads and inspect conversion policy for the Doctor service",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// File upload ceiling in bytes.
    #[arg(long, global = true, env = "DOCTOR_MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

    /// Raw text ceiling in bytes.
    #[arg(long, global = true, env = "DOCTOR_MAX_TEXT_SIZE")]
    max_text_size: Option<u64>,

    /// URL fetch ceiling in bytes.
    #[arg(long, global = true, env = "DOCTOR_MAX_URL_SIZE")]
    max_url_size: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCTOR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCTOR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an upload filename.
    CheckFilename { filename: String },

    /// Validate a URL for remote fetching.
    CheckUrl { url: String },

    /// Validate raw text (argument, --file, or stdin).
    CheckText {
        text: Option<String>,

        /// Read the text from this file.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Inspect a local file as an upload and optionally plan a conversion.
    Inspect {
        path: PathBuf,

        /// Declared format of the file (md, markdown, pdf, html, htm).
        #[arg(long, value_parser = parse_format)]
        format: DocumentFormat,

        /// Target format for a conversion task.
        #[arg(long, value_parser = parse_format)]
        to: Option<DocumentFormat>,

        /// Task priority.
        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,

        /// Conversion options as a JSON object, e.g. '{"page_size":"Letter"}'.
        #[arg(long)]
        options: Option<String>,

        /// Relative storage path to record (default: the file name).
        #[arg(long)]
        stored_as: Option<String>,

        /// Print a JSON report instead of text.
        #[arg(long)]
        json: bool,

        /// Disable the hashing progress bar.
        #[arg(long, env = "DOCTOR_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print the supported formats and the conversion matrix.
    Formats,

    /// Print every error code with its HTTP status.
    ErrorCodes,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PriorityArg {
    Low,
    Normal,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(v: PriorityArg) -> Self {
        match v {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Urgent => Priority::Urgent,
        }
    }
}

fn parse_format(s: &str) -> std::result::Result<DocumentFormat, String> {
    DocumentFormat::parse(s).ok_or_else(|| format!("unknown format '{s}' (use md, pdf or html)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let config = build_config(&cli)?;
    debug!("Config: {:?}", config);

    match cli.command {
        Command::CheckFilename { filename } => {
            report("filename", validate::validate_filename(&filename), cli.quiet)
        }
        Command::CheckUrl { url } => report("url", validate::validate_url(&url), cli.quiet),
        Command::CheckText { text, file } => {
            let text = read_text(text, file)?;
            let max = usize::try_from(config.limits.text).unwrap_or(usize::MAX);
            report("text", validate::validate_text(&text, Some(max)), cli.quiet)
        }
        Command::Inspect {
            path,
            format,
            to,
            priority,
            options,
            stored_as,
            json,
            no_progress,
        } => {
            let show_progress = !cli.quiet && !json && !no_progress;
            inspect(InspectArgs {
                path,
                format,
                to,
                priority: priority.into(),
                options,
                stored_as,
                json,
                show_progress,
                quiet: cli.quiet,
                config,
            })
            .await
        }
        Command::Formats => {
            print_formats();
            Ok(())
        }
        Command::ErrorCodes => {
            print_error_codes();
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder();
    if let Some(n) = cli.max_file_size {
        builder = builder.max_file_size(n);
    }
    if let Some(n) = cli.max_text_size {
        builder = builder.max_text_size(n);
    }
    if let Some(n) = cli.max_url_size {
        builder = builder.max_url_size(n);
    }
    builder.build().context("Invalid configuration")
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(t) = text {
        return Ok(t);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read text from {:?}", path));
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read text from stdin")?;
    Ok(buf)
}

fn report(what: &str, result: ValidationResult, quiet: bool) -> Result<()> {
    match result.into_result() {
        Ok(()) => {
            if !quiet {
                println!("{} {} is valid", green("✓"), what);
            }
            Ok(())
        }
        Err(reason) => bail!("{} {}", red("✗"), reason),
    }
}

// ── inspect ──────────────────────────────────────────────────────────────────

struct InspectArgs {
    path: PathBuf,
    format: DocumentFormat,
    to: Option<DocumentFormat>,
    priority: Priority,
    options: Option<String>,
    stored_as: Option<String>,
    json: bool,
    show_progress: bool,
    quiet: bool,
    config: ServiceConfig,
}

#[derive(Serialize)]
struct Check {
    name: &'static str,
    #[serde(flatten)]
    result: ValidationResult,
}

#[derive(Serialize)]
struct InspectReport {
    checks: Vec<Check>,
    file: Option<FileInfo>,
    task: Option<Task>,
}

async fn inspect(args: InspectArgs) -> Result<()> {
    let meta = std::fs::metadata(&args.path)
        .with_context(|| format!("Failed to stat {:?}", args.path))?;
    let filename = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let limits = args.config.limits;

    let mut checks = vec![
        Check {
            name: "filename",
            result: validate::validate_filename(&filename),
        },
        Check {
            name: "size",
            result: validate::validate_file_size(meta.len(), UploadSource::File, &limits),
        },
        Check {
            name: "quick_format",
            result: validate::quick_format_check(&args.path, args.format),
        },
    ];

    let parsed_options = match &args.options {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).context("--options is not valid JSON")?;
            let map = value.as_object().cloned().unwrap_or_default();
            let result = validate::validate_conversion_options(&map);
            let ok = result.is_valid();
            checks.push(Check {
                name: "options",
                result,
            });
            if ok {
                let options: ConversionOptions = serde_json::from_value(value)
                    .context("Failed to read conversion options")?;
                Some(options)
            } else {
                None
            }
        }
        None => None,
    };

    if let Some(target) = args.to {
        checks.push(Check {
            name: "conversion",
            result: validate::validate_conversion(args.format.as_str(), target.as_str()),
        });
    }

    let all_passed = checks.iter().all(|c| c.result.is_valid());
    let (file, task) = if all_passed {
        let hash = hash_file(&args.path, meta.len(), args.show_progress).await?;
        let stored_as = args.stored_as.clone().unwrap_or_else(|| filename.clone());
        let file = FileInfo::builder(
            filename.clone(),
            args.format,
            meta.len(),
            validate::sanitize_path(&stored_as),
            hash,
        )
        .build(&limits)
        .context("File record rejected")?;

        let task = match args.to {
            Some(target) => {
                let mut task = Task::new(file.id(), args.format, target)
                    .context("Conversion rejected")?
                    .with_priority(args.priority);
                if let Some(options) = parsed_options {
                    task = task.with_options(options).context("Options rejected")?;
                }
                Some(task)
            }
            None => None,
        };
        (Some(file), task)
    } else {
        (None, None)
    };

    let report = InspectReport { checks, file, task };
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        io::stdout()
            .write_all(json.as_bytes())
            .and_then(|_| io::stdout().write_all(b"\n"))
            .context("Failed to write to stdout")?;
    } else if !args.quiet {
        print_report(&report);
    }

    if !all_passed {
        bail!("{} failed one or more checks", args.path.display());
    }
    Ok(())
}

async fn hash_file(path: &std::path::Path, len: u64, show_progress: bool) -> Result<String> {
    let bar = if show_progress {
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  {bytes_per_sec}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Hashing");
        Some(bar)
    } else {
        None
    };

    let path = path.to_path_buf();
    let worker_bar = bar.clone();
    let hash = tokio::task::spawn_blocking(move || {
        let on_progress = |n: u64| {
            if let Some(b) = &worker_bar {
                b.set_position(n);
            }
        };
        validate::content_hash_with_progress(&path, HASH_CHUNK_SIZE, Some(&on_progress))
    })
    .await
    .context("Hashing task panicked")?
    .context("Failed to hash file")?;

    if let Some(b) = bar {
        b.finish_and_clear();
    }
    Ok(hash)
}

fn print_report(report: &InspectReport) {
    for check in &report.checks {
        match check.result.error() {
            None => println!("  {} {}", green("✓"), check.name),
            Some(reason) => println!("  {} {}  {}", red("✗"), check.name, dim(reason)),
        }
    }
    if let Some(file) = &report.file {
        println!();
        println!("{}", bold("File"));
        println!("  id        {}", file.id());
        println!("  name      {}", file.filename());
        println!("  format    {} ({})", file.format(), file.mime_type());
        println!("  size      {} bytes", file.size());
        println!("  path      {}", file.path());
        println!("  sha256    {}", dim(file.content_hash()));
    }
    if let Some(task) = &report.task {
        println!();
        println!("{}", bold("Task"));
        println!("  id        {}", task.id());
        println!("  convert   {} -> {}", task.source_format(), task.target_format());
        println!(
            "  priority  {} (weight {})",
            task.priority(),
            task.priority().queue_weight()
        );
        println!("  status    {}", task.status());
    }
}

// ── tables ───────────────────────────────────────────────────────────────────

fn print_formats() {
    println!("{}", bold("Formats"));
    for f in DocumentFormat::ALL {
        println!(
            "  {:<9} {:<16} {}",
            f.as_str(),
            f.mime_type(),
            dim(&f.extensions().join(" "))
        );
    }
    println!();
    println!("{}", bold("Conversions"));
    print!("  {:<9}", "from\\to");
    for t in DocumentFormat::ALL {
        print!(" {:<9}", t.as_str());
    }
    println!();
    for s in DocumentFormat::ALL {
        print!("  {:<9}", s.as_str());
        for t in DocumentFormat::ALL {
            let mark = if can_convert(s, t) { green("✓") } else { dim("·") };
            print!(" {mark:<18}");
        }
        println!();
    }
}

fn print_error_codes() {
    for code in ErrorCode::ALL {
        println!("  {:<24} {}", code.as_str(), code.http_status());
    }
}
