//! Duplicate issue detector
//!
//! Runs once per opened issue: compares it against every other open issue
//! and, when the best cosine similarity clears the threshold, comments on
//! the new issue and labels it.

use std::process::ExitCode;

use clap::Parser;
use dedup_core::{
    ActionReporter, DedupError, DetectorConfig, DuplicateDetector, SentenceEmbedder, TriggerEvent,
};
use dedup_github::GitHubTracker;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "dedup_action=info,dedup_core=info,dedup_github=info";

#[derive(Parser, Debug)]
#[command(name = "dedup-action")]
#[command(version, about = "Flag newly opened issues that duplicate an open one")]
struct Args {
    /// Log the comment and label instead of writing them
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_ansi(false)
            .with_current_span(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(args: &Args) -> dedup_core::Result<()> {
    let config = DetectorConfig::from_env()?;
    info!(
        repository = %config.repository,
        threshold = config.threshold.value(),
        label = %config.duplicate_label,
        model = %config.model,
        "configuration loaded"
    );

    let event = TriggerEvent::from_path(&config.event_path)?;

    let tracker = GitHubTracker::from_config(&config)
        .map_err(|e| DedupError::Config(format!("{:#}", e)))?;

    let detection = DuplicateDetector::new(&config, &tracker)
        .detect(event.issue_number, || SentenceEmbedder::load(&config.model))
        .await?;

    info!(
        issue = detection.query.number,
        corpus = detection.corpus_size,
        matched = detection.outcome.is_match(),
        "detection finished"
    );

    ActionReporter::new(&tracker, &config.duplicate_label)
        .dry_run(args.dry_run)
        .report(&detection.query, &detection.outcome)
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.json_logs);

    info!(version = dedup_core::VERSION, dry_run = args.dry_run, "starting duplicate detection");

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "duplicate detection failed");
            ExitCode::from(err.exit_code())
        }
    }
}
