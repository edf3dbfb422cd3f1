use analyzer_core::{CoreError, RedditPost};
use futures::{pin_mut, Stream, StreamExt};
use tracing::{debug, info, warn};

const PROGRESS_LOG_INTERVAL: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityCriteria {
    /// Stop once this many eligible posts are collected.
    pub target: usize,
    /// Maximum number of posts to examine.
    pub scan_budget: usize,
    pub min_comments: u32,
}

impl EligibilityCriteria {
    pub fn is_eligible(&self, post: &RedditPost) -> bool {
        post.num_comments >= self.min_comments
    }
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub eligible: Vec<RedditPost>,
    pub scanned: usize,
    pub skipped_low_comments: usize,
    /// The error that ended the scan early, if any.
    pub fetch_error: Option<CoreError>,
}

impl ScanOutcome {
    /// A fetch error with nothing gathered leaves the run with no work.
    pub fn is_fatal(&self) -> bool {
        self.fetch_error.is_some() && self.eligible.is_empty()
    }
}

/// Consumes `posts` newest first, keeping those with enough comments, until
/// the target is met or the scan budget is spent.
pub async fn scan_eligible<S>(posts: S, criteria: EligibilityCriteria) -> ScanOutcome
where
    S: Stream<Item = Result<RedditPost, CoreError>>,
{
    pin_mut!(posts);
    let mut outcome = ScanOutcome::default();

    while outcome.eligible.len() < criteria.target && outcome.scanned < criteria.scan_budget {
        let post = match posts.next().await {
            Some(Ok(post)) => post,
            Some(Err(e)) => {
                warn!(
                    "Post listing failed after {} posts ({} eligible): {}",
                    outcome.scanned,
                    outcome.eligible.len(),
                    e
                );
                outcome.fetch_error = Some(e);
                break;
            }
            None => break,
        };

        outcome.scanned += 1;
        if outcome.scanned % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                "Checked {} posts, found {} eligible so far",
                outcome.scanned,
                outcome.eligible.len()
            );
        }

        if criteria.is_eligible(&post) {
            debug!("Post {} is eligible ({} comments)", post.id, post.num_comments);
            outcome.eligible.push(post);
        } else {
            outcome.skipped_low_comments += 1;
        }
    }

    info!(
        "Scan finished: checked {}, eligible {}, skipped {} for low comments",
        outcome.scanned,
        outcome.eligible.len(),
        outcome.skipped_low_comments
    );
    outcome
}
