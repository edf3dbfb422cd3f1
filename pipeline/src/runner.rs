use crate::filter::{scan_eligible, EligibilityCriteria};
use crate::processor::{PostOutcome, PostProcessor};
use crate::summary::{FailureRecord, RunCounts, RunSummary};
use analyzer_core::{
    CoreError, Credentials, EnvSecretStore, ErrorExt, FileSecretStore, RunConfig,
};
use llm_interface::{AnthropicProvider, ModelProvider};
use reddit_client::{ForumClient, RedditClient, RedditClientConfig};
use std::time::Instant;
use storage::{Ledger, LocalParquetWriter, RecordWriter, SqliteLedger};
use tracing::{error, info, warn};

/// Running totals for one run.
#[derive(Debug, Default)]
struct RunTally {
    counts: RunCounts,
    failures: Vec<FailureRecord>,
}

impl RunTally {
    fn record(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Processed => self.counts.processed += 1,
            PostOutcome::SkippedDuplicate => self.counts.skipped_duplicates += 1,
            PostOutcome::Failed(failure) => {
                self.counts.failed += 1;
                self.failures.push(failure);
            }
        }
    }
}

/// Fetches credentials, builds the real clients and runs once. Any failure
/// while setting up is fatal.
pub async fn run(config: &RunConfig) -> RunSummary {
    let started = Instant::now();
    config.log_summary();

    let credentials = match fetch_credentials(config).await {
        Ok(credentials) => credentials,
        Err(e) => return setup_failure("Failed to load credentials", &e, started),
    };

    let forum = match RedditClient::new(RedditClientConfig::from_credentials(&credentials)) {
        Ok(client) => client,
        Err(e) => return setup_failure("Failed to create forum client", &e, started),
    };

    let model = match AnthropicProvider::new(
        credentials.model_api_key.clone(),
        config.model_id.clone(),
    ) {
        Ok(provider) => provider.with_base_url(config.model_api_base_url.clone()),
        Err(e) => return setup_failure("Failed to create model client", &e, started),
    };

    let ledger = match SqliteLedger::connect(&config.ledger_database_url).await {
        Ok(ledger) => ledger,
        Err(e) => return setup_failure("Failed to open ledger", &e, started),
    };

    let writer = LocalParquetWriter::new(config.output_location.clone());

    run_with(config, &forum, &model, &writer, &ledger).await
}

async fn fetch_credentials(config: &RunConfig) -> Result<Credentials, CoreError> {
    match &config.secrets_dir {
        Some(dir) => Credentials::fetch(&FileSecretStore::new(dir.clone()), &config.secret_name).await,
        None => Credentials::fetch(&EnvSecretStore::new(), &config.secret_name).await,
    }
}

fn setup_failure(context: &str, error: &CoreError, started: Instant) -> RunSummary {
    error.log_error();
    RunSummary::fatal(
        format!("{}: {}", context, error.failure_reason()),
        RunCounts::default(),
        started.elapsed(),
    )
}

/// Scans for eligible posts and processes each one in order.
pub async fn run_with<F, M, W, L>(
    config: &RunConfig,
    forum: &F,
    model: &M,
    writer: &W,
    ledger: &L,
) -> RunSummary
where
    F: ForumClient,
    M: ModelProvider,
    W: RecordWriter,
    L: Ledger,
{
    let started = Instant::now();
    let criteria = EligibilityCriteria {
        target: config.post_limit,
        scan_budget: config.new_post_check_limit,
        min_comments: config.min_comments_to_process,
    };

    info!(
        "Fetching up to {} new posts from r/{} to find {} with >= {} comments",
        criteria.scan_budget, config.subreddit, criteria.target, criteria.min_comments
    );
    let posts = forum.new_posts(&config.subreddit, criteria.scan_budget);
    let scan = scan_eligible(posts, criteria).await;

    let mut tally = RunTally::default();
    tally.counts.scanned = scan.scanned;
    tally.counts.eligible = scan.eligible.len();
    tally.counts.skipped_low_comments = scan.skipped_low_comments;

    if scan.is_fatal() {
        let reason = scan
            .fetch_error
            .as_ref()
            .map(|e| e.failure_reason())
            .unwrap_or_default();
        error!("No eligible posts could be gathered: {}", reason);
        return RunSummary::fatal(
            format!("Failed to fetch posts from r/{}: {}", config.subreddit, reason),
            tally.counts,
            started.elapsed(),
        );
    }
    if let Some(e) = &scan.fetch_error {
        warn!(
            "Continuing with {} eligible posts gathered before the listing failed: {}",
            scan.eligible.len(),
            e
        );
    }

    if scan.eligible.is_empty() {
        let mut summary = RunSummary::completed(
            tally.counts,
            Vec::new(),
            started.elapsed(),
            criteria.min_comments,
            criteria.target,
        );
        summary.message = format!(
            "No new posts found meeting criteria (>= {} comments) after checking {} posts.",
            criteria.min_comments, scan.scanned
        );
        return summary;
    }

    let processor = PostProcessor::new(config, forum, model, writer, ledger);
    for post in &scan.eligible {
        tally.record(processor.process(post).await);
    }

    RunSummary::completed(
        tally.counts,
        tally.failures,
        started.elapsed(),
        criteria.min_comments,
        criteria.target,
    )
}
