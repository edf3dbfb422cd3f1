use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author name recorded when the forum no longer exposes the account.
pub const DELETED_AUTHOR: &str = "[deleted]";

const DELETED_BODY: &str = "[deleted]";
const REMOVED_BODY: &str = "[removed]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    pub score: i64,
    pub num_comments: u32,
    pub created_utc: DateTime<Utc>,
    pub url: String,
    pub permalink: String,
    pub subreddit: String,
}

impl RedditPost {
    /// Title cut to `max_chars` characters, for logs and failure records.
    pub fn short_title(&self, max_chars: usize) -> String {
        self.title.chars().take(max_chars).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub post_id: String,
    pub author: String,
    pub body: String,
}

impl RedditComment {
    /// Trimmed body, or `None` when the comment is empty, deleted or removed.
    pub fn analysis_text(&self) -> Option<&str> {
        let body = self.body.trim();
        if body.is_empty() || body == DELETED_BODY || body == REMOVED_BODY {
            None
        } else {
            Some(body)
        }
    }
}

/// Which shape `problem_explanation` takes for every record of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSchema {
    #[default]
    Structured,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub definition: String,
    pub use_case: String,
    pub how_it_functions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredExplanation {
    pub primary_concepts: Vec<Concept>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProblemExplanation {
    Text(String),
    Structured(StructuredExplanation),
}

impl ProblemExplanation {
    pub fn schema(&self) -> ExplanationSchema {
        match self {
            ProblemExplanation::Text(_) => ExplanationSchema::Text,
            ProblemExplanation::Structured(_) => ExplanationSchema::Structured,
        }
    }

    /// The explanation text regardless of shape.
    pub fn explanation(&self) -> &str {
        match self {
            ProblemExplanation::Text(text) => text,
            ProblemExplanation::Structured(structured) => &structured.explanation,
        }
    }
}

/// Model analysis of one post, always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub problem_summary: String,
    pub problem_explanation: ProblemExplanation,
    pub solution_summary: String,
    pub solution_explanation: String,
    pub suggested_categories: Vec<String>,
}

/// One row of the columnar output, written once per processed post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub selftext: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub original_comment_count: u32,
    pub fetched_comment_count: u32,
    pub post_timestamp_utc: DateTime<Utc>,
    pub fetched_comments_text: String,
    pub analysis: AnalysisResult,
    pub analysis_timestamp_utc: DateTime<Utc>,
    pub model_id: String,
}

impl StoredRecord {
    pub fn new(
        post: &RedditPost,
        stored_comments: &[&str],
        fetched_comment_count: u32,
        analysis: AnalysisResult,
        model_id: &str,
        analysis_timestamp_utc: DateTime<Utc>,
    ) -> Self {
        let fetched_comments_text = stored_comments
            .iter()
            .map(|body| format!("- {body}"))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            selftext: post.selftext.clone(),
            url: post.url.clone(),
            author: post.author.clone(),
            score: post.score,
            original_comment_count: post.num_comments,
            fetched_comment_count,
            post_timestamp_utc: post.created_utc,
            fetched_comments_text,
            analysis,
            analysis_timestamp_utc,
            model_id: model_id.to_string(),
        }
    }
}

/// Marks a post as handled. Written only after its record is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub post_id: String,
    pub processed_timestamp_utc: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(post_id: impl Into<String>, processed_timestamp_utc: DateTime<Utc>) -> Self {
        Self {
            post_id: post_id.into(),
            processed_timestamp_utc,
        }
    }
}
