use analyzer_core::{ErrorExt, RedditPost};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Failure records carry at most this many title characters.
pub const FAILURE_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    FullSuccess,
    PartialSuccess,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub post_id: String,
    pub title: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new<E: ErrorExt>(post: &RedditPost, error: &E) -> Self {
        Self {
            post_id: post.id.clone(),
            title: post.short_title(FAILURE_TITLE_CHARS),
            reason: error.failure_reason(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub scanned: usize,
    pub eligible: usize,
    pub processed: usize,
    pub skipped_duplicates: usize,
    pub skipped_low_comments: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub message: String,
    pub counts: RunCounts,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,
    pub duration_secs: f64,
}

impl RunSummary {
    pub fn fatal(message: impl Into<String>, counts: RunCounts, duration: Duration) -> Self {
        Self {
            status: RunStatus::Fatal,
            message: message.into(),
            counts,
            failures: Vec::new(),
            duration_secs: duration.as_secs_f64(),
        }
    }

    /// Summary of a run that got through its eligible list.
    pub fn completed(
        counts: RunCounts,
        failures: Vec<FailureRecord>,
        duration: Duration,
        min_comments: u32,
        target: usize,
    ) -> Self {
        let status = if failures.is_empty() {
            RunStatus::FullSuccess
        } else {
            RunStatus::PartialSuccess
        };

        let message = format!(
            "Processing complete in {:.2}s. Checked {} new posts. Found {} eligible (>= {} comments, target {}). Skipped {} (low comments). Processed {} new. Skipped {} (already processed). Failed {}.",
            duration.as_secs_f64(),
            counts.scanned,
            counts.eligible,
            min_comments,
            target,
            counts.skipped_low_comments,
            counts.processed,
            counts.skipped_duplicates,
            counts.failed,
        );

        Self {
            status,
            message,
            counts,
            failures,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.status == RunStatus::Fatal
    }

    pub fn log(&self) {
        match self.status {
            RunStatus::FullSuccess => info!("{}", self.message),
            RunStatus::PartialSuccess => warn!("{}", self.message),
            RunStatus::Fatal => error!("Run failed: {}", self.message),
        }
        for failure in &self.failures {
            warn!(
                "  - Post {} ('{}'): {}",
                failure.post_id, failure.title, failure.reason
            );
        }
    }
}
