use crate::summary::FailureRecord;
use analyzer_core::{
    CoreError, ErrorExt, LedgerEntry, RedditPost, RunConfig, StoredRecord,
};
use chrono::Utc;
use llm_interface::{GenerationParams, ModelProvider, ModelRequest, Normalizer, PromptBuilder};
use reddit_client::ForumClient;
use storage::{record_key, Ledger, RecordWriter};
use tracing::{debug, error, info, warn};

/// Raw model output is logged up to this many characters.
const RAW_OUTPUT_LOG_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Processed,
    SkippedDuplicate,
    Failed(FailureRecord),
}

/// Consults the ledger before any work is done on a post.
pub async fn is_duplicate<L: Ledger>(ledger: &L, post: &RedditPost) -> Result<bool, CoreError> {
    let seen = ledger.contains(&post.id).await?;
    if seen {
        info!("Post {} already processed. Skipping.", post.id);
    }
    Ok(seen)
}

/// Runs one post through comments, prompt, model, normalization, storage
/// and ledger, strictly in that order.
pub struct PostProcessor<'a, F, M, W, L> {
    config: &'a RunConfig,
    forum: &'a F,
    model: &'a M,
    writer: &'a W,
    ledger: &'a L,
    prompt_builder: PromptBuilder,
    normalizer: Normalizer,
    params: GenerationParams,
}

impl<'a, F, M, W, L> PostProcessor<'a, F, M, W, L>
where
    F: ForumClient,
    M: ModelProvider,
    W: RecordWriter,
    L: Ledger,
{
    pub fn new(config: &'a RunConfig, forum: &'a F, model: &'a M, writer: &'a W, ledger: &'a L) -> Self {
        Self {
            config,
            forum,
            model,
            writer,
            ledger,
            prompt_builder: PromptBuilder::new(config.explanation_schema)
                .with_max_comments(config.max_comments_for_prompt),
            normalizer: Normalizer::new(config.explanation_schema),
            params: GenerationParams::default(),
        }
    }

    pub async fn process(&self, post: &RedditPost) -> PostOutcome {
        match is_duplicate(self.ledger, post).await {
            Ok(true) => return PostOutcome::SkippedDuplicate,
            Ok(false) => {}
            Err(e) => {
                error!("Ledger lookup failed for post {}: {}", post.id, e);
                return PostOutcome::Failed(FailureRecord::new(post, &e));
            }
        }

        match self.analyze_and_store(post).await {
            Ok(()) => PostOutcome::Processed,
            Err(e) => {
                e.log_error();
                error!("Failed to process post {}", post.id);
                PostOutcome::Failed(FailureRecord::new(post, &e))
            }
        }
    }

    async fn analyze_and_store(&self, post: &RedditPost) -> Result<(), CoreError> {
        info!(
            "Processing post {} ('{}')",
            post.id,
            post.short_title(crate::summary::FAILURE_TITLE_CHARS)
        );

        let comments = self.forum.fetch_comments(post).await?;
        let texts: Vec<&str> = comments.iter().filter_map(|c| c.analysis_text()).collect();
        let prompt_comments = &texts[..texts.len().min(self.config.max_comments_for_prompt)];
        let stored_comments = &texts[..texts.len().min(self.config.comment_limit)];
        debug!(
            "Post {}: {} comments fetched, {} usable",
            post.id,
            comments.len(),
            texts.len()
        );

        let prompt = self
            .prompt_builder
            .build(&post.title, &post.selftext, prompt_comments);
        let request = ModelRequest::from_prompt(prompt, self.params.clone());
        let response = self.model.invoke(&request).await?;
        debug!(
            "Raw model output for {}: {}",
            post.id,
            response.text.chars().take(RAW_OUTPUT_LOG_CHARS).collect::<String>()
        );

        let outcome = self.normalizer.analyze(&response.text);
        if let Some(failure) = &outcome.failure {
            warn!(
                "Analysis for post {} is in an error state ({}): {}",
                post.id,
                failure.kind_label(),
                outcome.result.problem_summary
            );
        }

        let analysis_time = Utc::now();
        let record = StoredRecord::new(
            post,
            stored_comments,
            stored_comments.len() as u32,
            outcome.result,
            self.model.model_id(),
            analysis_time,
        );
        let key = record_key(&self.config.key_prefix, analysis_time, &post.id);
        self.writer.write_record(&record, &key).await?;

        self.ledger
            .mark_processed(&LedgerEntry::new(post.id.clone(), analysis_time))
            .await?;
        info!("Post {} processed and marked in ledger", post.id);
        Ok(())
    }
}
