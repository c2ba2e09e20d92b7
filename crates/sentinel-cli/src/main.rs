//! `sentinel` command line.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sentinel_core::{
    evaluate_rules, repair_json, schema, CandidateProfile, JobLevel, Posting, Screening,
    ScreeningStats, StructuredSummary,
};
use sentinel_runtime::{BatchRunner, PipelineController, PostingReport, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "sentinel",
    about = "Classify job postings with an LLM ensemble and screen them for a candidate",
    version
)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `sentinel_runtime=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline over a file of postings
    Run(RunArgs),

    /// Print the deterministic rule outcome for a structured summary
    Rules {
        /// StructuredSummary JSON file
        #[arg(long)]
        summary: PathBuf,

        /// Target roles, comma separated
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
    },

    /// Repair model output into JSON (reads stdin without FILE)
    Repair { file: Option<PathBuf> },

    /// Print the configuration as YAML
    Config {
        /// Load and validate this file instead of printing defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON array or JSON Lines file of postings
    #[arg(long)]
    postings: PathBuf,

    /// Target roles, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    roles: Vec<String>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable the audit stage
    #[arg(long)]
    no_audit: bool,

    /// Exclude postings that do not offer visa sponsorship
    #[arg(long)]
    needs_sponsorship: bool,

    /// Accepted job levels, comma separated [default: entry]
    #[arg(long, value_delimiter = ',')]
    levels: Vec<JobLevel>,

    /// Write reports here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

/// One output line: the report plus its screening result.
#[derive(Serialize)]
struct ReportLine<'a> {
    #[serde(flatten)]
    report: &'a PostingReport,
    screening: Screening,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Rules { summary, roles } => rules(&summary, &roles),
        Command::Repair { file } => repair(file.as_deref()),
        Command::Config { config } => print_config(config.as_deref()),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if args.no_audit {
        config.pipeline.audit_enabled = false;
    }

    let roles: Vec<String> = args
        .roles
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if roles.is_empty() {
        bail!("--roles needs at least one target role");
    }

    let postings = read_postings(&args.postings)?;
    tracing::info!(
        postings = postings.len(),
        roles = ?roles,
        audit = config.pipeline.audit_enabled,
        "Loaded postings"
    );

    let controller = PipelineController::builder()
        .config(config.clone())
        .build()
        .context("building pipeline")?;
    let runner = BatchRunner::from_config(Arc::new(controller), &config);
    let reports = runner.run(postings, &roles).await;

    let profile = CandidateProfile::new(roles)
        .with_sponsorship(args.needs_sponsorship)
        .with_levels(args.levels);
    let screenings: Vec<Screening> = reports.iter().map(|r| r.screen(&profile)).collect();

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for (report, screening) in reports.iter().zip(&screenings) {
        let line = ReportLine {
            report,
            screening: *screening,
        };
        serde_json::to_writer(&mut out, &line)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    let stats: ScreeningStats = screenings.iter().collect();
    tracing::info!(
        total = stats.total,
        accepted = stats.accepted,
        excluded = stats.excluded(),
        errored = stats.errored,
        skipped = stats.skipped,
        keyword_mismatch = stats.keyword_mismatch,
        no_sponsorship = stats.no_sponsorship,
        level = stats.level,
        requires_phd = stats.requires_phd,
        internship = stats.internship,
        "Screening finished"
    );

    Ok(())
}

/// Accepts a JSON array or one posting per line.
fn read_postings(path: &Path) -> Result<Vec<Posting>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    if text.trim_start().starts_with('[') {
        return serde_json::from_str(&text)
            .with_context(|| format!("parsing {} as a JSON array", path.display()));
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid posting", path.display(), number + 1))
        })
        .collect()
}

fn rules(path: &Path, roles: &[String]) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let summary: StructuredSummary = schema::from_str(&text)?;
    let outcome = evaluate_rules(&summary, roles);

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    tracing::debug!(undecided = ?outcome.undecided_fields(), "Fields left to the ensemble");
    Ok(())
}

fn repair(file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let repaired = repair_json(&text);
    let value: serde_json::Value =
        serde_json::from_str(&repaired).context("output is still not valid JSON after repair")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    print!("{}", config.to_yaml()?);
    Ok(())
}
