//! CLI binary for insurance-cardscan.
//!
//! A thin shim over the library crate: `process` runs one scan on two local
//! images, `serve` exposes the HTTP upload endpoint.

use anyhow::{Context, Result};
use cardscan::{
    server, CardScanner, InsuranceType, PipelineConfig, ProgressCallback, ScanProgressCallback,
    ScanStage, ServiceConfig, UploadedImage,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that logs one line per completed stage.
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
        bar.set_prefix("Scanning");
        bar.set_message("reading images…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: ScanStage) {
        if stage == ScanStage::Completed {
            self.bar.finish_and_clear();
            return;
        }
        self.bar.println(format!("{} {}", green("✔"), stage));
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_degraded(&self, stage: ScanStage, detail: String) {
        self.bar
            .println(format!("{} {} degraded: {}", yellow("⚠"), stage, detail));
    }

    fn on_failed(&self, last_stage: ScanStage, error: String) {
        self.bar.abandon_with_message(format!(
            "{} failed after '{}': {}",
            red("✘"),
            last_stage,
            error
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan a card (front first) and print the extracted fields
  cardscan process front.jpg back.jpg

  # Attach the PDF to insurance record 1234 as the secondary card
  cardscan process front.jpg back.jpg --insurance-id 1234 --type secondary

  # Machine-readable output
  cardscan process front.jpg back.jpg --json

  # Run the HTTP upload endpoint
  cardscan serve --addr 0.0.0.0:8080

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (field extraction)
  CARDSCAN_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  CARDSCAN_MODEL          Override model ID (default gpt-4.1-nano)
  GOOGLE_PROJECT_ID       Document AI project
  GOOGLE_LOCATION         Document AI location (default us)
  GOOGLE_ACCESS_TOKEN     OAuth token for Document AI / Drive
  CARDSCAN_SINK           s3 (default) or drive
  S3_BUCKET, AWS_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, S3_ENDPOINT
  DRIVE_FOLDER_ID         Parent folder for Drive uploads
  DATABASE_URL            Postgres URL (or DB_CREDENTIALS_FILE with a JSON file)

A .env file in the working directory is loaded first.
"#;

/// Turn insurance-card photos into a stored PDF and extracted patient fields.
#[derive(Parser, Debug)]
#[command(
    name = "cardscan",
    version,
    about = "Turn insurance-card photos into a stored PDF and extracted patient fields",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CARDSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CARDSCAN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan two local images (front, then back).
    Process {
        /// Front of the card.
        front: PathBuf,

        /// Back of the card.
        back: PathBuf,

        /// Insurance record to attach the PDF link to.
        #[arg(long)]
        insurance_id: Option<i64>,

        /// Insurance slot: primary or secondary.
        #[arg(long = "type", value_enum, default_value = "primary")]
        insurance_type: TypeArg,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,

        /// Disable the progress spinner.
        #[arg(long, env = "CARDSCAN_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Run the HTTP upload endpoint.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "CARDSCAN_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, global = true, env = "CARDSCAN_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, global = true, env = "CARDSCAN_MODEL")]
    model: Option<String>,

    /// Per-image size ceiling after compression, in bytes.
    #[arg(long, global = true, env = "CARDSCAN_MAX_BYTES", default_value_t = 2 * 1024 * 1024)]
    max_bytes: u64,

    /// Longest image side after compression, in pixels.
    #[arg(long, global = true, env = "CARDSCAN_MAX_DIMENSION", default_value_t = 2000)]
    max_dimension: u32,

    /// Maximum upload body accepted by `serve`, in MiB.
    #[arg(long, global = true, env = "CARDSCAN_MAX_UPLOAD_MB", default_value_t = 15)]
    max_upload_mb: usize,

    /// Directory for per-run scratch files (default: system temp dir).
    #[arg(long, global = true, env = "CARDSCAN_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TypeArg {
    Primary,
    Secondary,
}

impl From<TypeArg> for InsuranceType {
    fn from(v: TypeArg) -> Self {
        match v {
            TypeArg::Primary => InsuranceType::Primary,
            TypeArg::Secondary => InsuranceType::Secondary,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the spinner, so they are
    // hidden while it is shown.
    let show_progress = match cli.command {
        Command::Process {
            json, no_progress, ..
        } => !cli.quiet && !json && !no_progress,
        Command::Serve { .. } => false,
    };
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

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };

    let mut services = ServiceConfig::from_env().context("Invalid service configuration")?;
    if cli.pipeline.provider.is_some() {
        services.llm.provider_name = cli.pipeline.provider.clone();
    }
    if cli.pipeline.model.is_some() {
        services.llm.model = cli.pipeline.model.clone();
    }

    let config = build_config(&cli.pipeline, progress)?;
    let scanner =
        CardScanner::from_service_config(&services, config).context("Failed to set up services")?;

    match cli.command {
        Command::Process {
            front,
            back,
            insurance_id,
            insurance_type,
            json,
            ..
        } => {
            let uploads = vec![
                UploadedImage::from_path(&front)
                    .await
                    .with_context(|| format!("Failed to read {}", front.display()))?,
                UploadedImage::from_path(&back)
                    .await
                    .with_context(|| format!("Failed to read {}", back.display()))?,
            ];
            let outcome = scanner
                .process(uploads, insurance_id, insurance_type.into())
                .await
                .context("Scan failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
                );
            } else {
                println!("{}  {}", bold("Name:"), outcome.full_name);
                println!("{}  {}", bold("Member ID:"), outcome.fields.member_id);
                println!("{}  {}", bold("Group ID:"), outcome.fields.group_id);
                println!("{}  {}", bold("Insurer:"), outcome.fields.insurance_company);
                println!("{}  {}", bold("PDF:"), outcome.link);
                if !cli.quiet {
                    if let Some(id) = outcome.insurance_id {
                        eprintln!(
                            "{} {} card {} insurance record {}",
                            if outcome.persisted { green("✔") } else { yellow("⚠") },
                            outcome.insurance_type,
                            if outcome.persisted { "attached to" } else { "not attached to" },
                            id
                        );
                    }
                }
            }
        }
        Command::Serve { addr } => {
            server::serve(addr, scanner)
                .await
                .with_context(|| format!("Server on {addr} failed"))?;
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_bytes(args.max_bytes)
        .max_dimension(args.max_dimension)
        .max_upload_bytes(args.max_upload_mb * 1024 * 1024);

    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
