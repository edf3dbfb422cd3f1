#[cfg(test)]
mod tests {
    use crate::{is_duplicate, run_with, PostOutcome, PostProcessor, RunStatus};
    use analyzer_core::{
        CoreError, DatabaseError, LedgerEntry, LlmError, ProblemExplanation, RedditApiError,
        RedditComment, RedditPost, RunConfig, StorageError, StoredRecord,
    };
    use chrono::Utc;
    use futures::{stream, Stream};
    use llm_interface::{ModelProvider, ModelRequest, ModelResponse};
    use reddit_client::ForumClient;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use storage::{Ledger, RecordWriter};

    type Events = Arc<Mutex<Vec<String>>>;

    const GOOD_RESPONSE: &str = r#"
{"problem_summary": "Lambda times out", "problem_explanation": {"primary_concepts": [{"name": "Lambda", "definition": "Serverless compute", "use_case": "APIs", "how_it_functions": "Runs on demand"}], "explanation": "The function exceeds its timeout."}, "solution_summary": "Raise the timeout", "solution_explanation": "Set timeout to 30s.", "suggested_categories": ["Lambda", "Serverless"]}"#;

    fn events() -> Events {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn log(events: &Events, entry: String) {
        events.lock().unwrap().push(entry);
    }

    fn post(id: &str, num_comments: u32) -> RedditPost {
        RedditPost {
            id: id.to_string(),
            title: format!("Question {id}"),
            selftext: "Body with {braces}".to_string(),
            author: "asker".to_string(),
            score: 3,
            num_comments,
            created_utc: Utc::now(),
            url: format!("https://www.reddit.com/r/aws/comments/{id}/"),
            permalink: format!("https://www.reddit.com/r/aws/comments/{id}/"),
            subreddit: "aws".to_string(),
        }
    }

    fn config() -> RunConfig {
        let values: HashMap<&str, &str> = HashMap::from([
            ("OUTPUT_LOCATION", "/tmp/unused"),
            ("MODEL_ID", "test-model"),
            ("LEDGER_DATABASE_URL", "sqlite::memory:"),
            ("POST_LIMIT", "2"),
            ("NEW_POST_CHECK_LIMIT", "10"),
            ("MIN_COMMENTS_TO_PROCESS", "2"),
            ("COMMENT_LIMIT", "4"),
        ]);
        RunConfig::from_lookup(|key| values.get(key).map(|v| v.to_string())).unwrap()
    }

    struct MockForum {
        posts: Vec<RedditPost>,
        /// Position (zero-based) at which the listing fails.
        fail_at: Option<usize>,
        comments: HashMap<String, Vec<&'static str>>,
        failing_comments: HashSet<String>,
        events: Events,
    }

    impl MockForum {
        fn new(posts: Vec<RedditPost>, events: &Events) -> Self {
            Self {
                posts,
                fail_at: None,
                comments: HashMap::new(),
                failing_comments: HashSet::new(),
                events: events.clone(),
            }
        }
    }

    impl ForumClient for MockForum {
        fn new_posts<'a>(
            &'a self,
            _subreddit: &'a str,
            limit: usize,
        ) -> impl Stream<Item = Result<RedditPost, CoreError>> + 'a {
            let mut items: Vec<Result<RedditPost, CoreError>> =
                self.posts.iter().take(limit).cloned().map(Ok).collect();
            if let Some(position) = self.fail_at {
                items.truncate(position);
                items.push(Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: 503,
                })));
            }
            stream::iter(items)
        }

        async fn fetch_comments(&self, post: &RedditPost) -> Result<Vec<RedditComment>, CoreError> {
            log(&self.events, format!("comments:{}", post.id));
            if self.failing_comments.contains(&post.id) {
                return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
            }
            Ok(self
                .comments
                .get(&post.id)
                .map(|bodies| {
                    bodies
                        .iter()
                        .map(|body| RedditComment {
                            post_id: post.id.clone(),
                            author: "commenter".to_string(),
                            body: body.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct MockModel {
        response: Result<String, ()>,
        prompts: Arc<Mutex<Vec<String>>>,
        events: Events,
    }

    impl MockModel {
        fn replying(text: &str, events: &Events) -> Self {
            Self {
                response: Ok(text.to_string()),
                prompts: Arc::new(Mutex::new(Vec::new())),
                events: events.clone(),
            }
        }

        fn failing(events: &Events) -> Self {
            Self {
                response: Err(()),
                prompts: Arc::new(Mutex::new(Vec::new())),
                events: events.clone(),
            }
        }
    }

    impl ModelProvider for MockModel {
        fn model_id(&self) -> &str {
            "test-model"
        }

        async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, CoreError> {
            log(&self.events, "model".to_string());
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages[0].content.clone());
            match &self.response {
                Ok(text) => Ok(ModelResponse {
                    text: text.clone(),
                    ..Default::default()
                }),
                Err(()) => Err(CoreError::Llm(LlmError::ServiceUnavailable {
                    provider: "mock".to_string(),
                })),
            }
        }
    }

    struct MockWriter {
        fail_for: HashSet<String>,
        records: Arc<Mutex<Vec<(String, StoredRecord)>>>,
        events: Events,
    }

    impl MockWriter {
        fn new(events: &Events) -> Self {
            Self {
                fail_for: HashSet::new(),
                records: Arc::new(Mutex::new(Vec::new())),
                events: events.clone(),
            }
        }
    }

    impl RecordWriter for MockWriter {
        async fn write_record(&self, record: &StoredRecord, key: &str) -> Result<(), CoreError> {
            log(&self.events, format!("write:{}", record.post_id));
            if self.fail_for.contains(&record.post_id) {
                return Err(CoreError::Storage(StorageError::WriteFailed {
                    key: key.to_string(),
                    reason: "disk full".to_string(),
                }));
            }
            self.records
                .lock()
                .unwrap()
                .push((key.to_string(), record.clone()));
            Ok(())
        }
    }

    struct MockLedger {
        seen: Mutex<HashSet<String>>,
        entries: Mutex<Vec<LedgerEntry>>,
        failing_lookups: HashSet<String>,
        failing_marks: HashSet<String>,
        events: Events,
    }

    impl MockLedger {
        fn new(seen: &[&str], events: &Events) -> Self {
            Self {
                seen: Mutex::new(seen.iter().map(|s| s.to_string()).collect()),
                entries: Mutex::new(Vec::new()),
                failing_lookups: HashSet::new(),
                failing_marks: HashSet::new(),
                events: events.clone(),
            }
        }
    }

    impl Ledger for MockLedger {
        async fn contains(&self, post_id: &str) -> Result<bool, CoreError> {
            log(&self.events, format!("lookup:{post_id}"));
            if self.failing_lookups.contains(post_id) {
                return Err(CoreError::Database(DatabaseError::Sql(sqlx::Error::PoolTimedOut)));
            }
            Ok(self.seen.lock().unwrap().contains(post_id))
        }

        async fn mark_processed(&self, entry: &LedgerEntry) -> Result<(), CoreError> {
            log(&self.events, format!("mark:{}", entry.post_id));
            if self.failing_marks.contains(&entry.post_id) {
                return Err(CoreError::Database(DatabaseError::Sql(sqlx::Error::PoolTimedOut)));
            }
            self.seen.lock().unwrap().insert(entry.post_id.clone());
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_processes_post_in_order() {
        let events = events();
        let mut forum = MockForum::new(vec![post("p1", 5)], &events);
        forum.comments.insert(
            "p1".to_string(),
            vec!["first", "  ", "[deleted]", "second", "[removed]", "third", "fourth", "fifth"],
        );
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let processor = PostProcessor::new(&config, &forum, &model, &writer, &ledger);
        let outcome = processor.process(&post("p1", 5)).await;

        assert_eq!(outcome, PostOutcome::Processed);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["lookup:p1", "comments:p1", "model", "write:p1", "mark:p1"]
        );

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Body with (braces)"));
        assert!(prompt.contains("Comment 3:\nthird"));
        assert!(!prompt.contains("Comment 4:"));
        assert!(!prompt.contains("[deleted]"));

        let records = writer.records.lock().unwrap();
        let (key, record) = &records[0];
        assert!(key.starts_with("reddit-analysis/year="));
        assert!(key.ends_with("/p1.parquet"));
        assert_eq!(record.fetched_comment_count, 4);
        assert_eq!(record.fetched_comments_text, "- first\n- second\n- third\n- fourth");
        assert_eq!(record.model_id, "test-model");
        assert_eq!(record.analysis.problem_summary, "Lambda times out");
        assert!(matches!(
            record.analysis.problem_explanation,
            ProblemExplanation::Structured(_)
        ));
        assert_eq!(record.analysis.suggested_categories, vec!["Lambda", "Serverless"]);

        let entries = ledger.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].processed_timestamp_utc, record.analysis_timestamp_utc);
        let date_part = record.analysis_timestamp_utc.format("year=%Y/month=%m/day=%d").to_string();
        assert!(key.contains(&date_part));
    }

    #[tokio::test]
    async fn test_duplicate_touches_nothing_downstream() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5)], &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&["p1"], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::FullSuccess);
        assert_eq!(summary.counts.skipped_duplicates, 1);
        assert_eq!(summary.counts.processed, 0);
        assert_eq!(summary.counts.failed, 0);
        assert_eq!(*events.lock().unwrap(), vec!["lookup:p1"]);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_ledger_entry() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5)], &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let mut writer = MockWriter::new(&events);
        writer.fail_for.insert("p1".to_string());
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let processor = PostProcessor::new(&config, &forum, &model, &writer, &ledger);
        let outcome = processor.process(&post("p1", 5)).await;

        match outcome {
            PostOutcome::Failed(failure) => {
                assert_eq!(failure.post_id, "p1");
                assert!(failure.reason.starts_with("STORAGE: "));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!events.lock().unwrap().iter().any(|e| e.starts_with("mark:")));
        assert!(!is_duplicate(&ledger, &post("p1", 5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_ledger_lookup_failure_is_per_post() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5), post("p2", 5)], &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let mut ledger = MockLedger::new(&[], &events);
        ledger.failing_lookups.insert("p1".to_string());
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::PartialSuccess);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.processed, 1);
        assert_eq!(summary.failures[0].post_id, "p1");
        assert!(summary.failures[0].reason.starts_with("DATABASE: "));
        assert!(!events.lock().unwrap().contains(&"comments:p1".to_string()));
    }

    #[tokio::test]
    async fn test_model_failure_continues_with_next_post() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5), post("p2", 5)], &events);
        let model = MockModel::failing(&events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::PartialSuccess);
        assert_eq!(summary.counts.failed, 2);
        assert_eq!(summary.failures.len(), 2);
        assert!(summary.failures.iter().all(|f| f.reason.starts_with("LLM: ")));
        assert!(writer.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_fetch_failure_is_recorded() {
        let events = events();
        let mut forum = MockForum::new(vec![post("p1", 5)], &events);
        forum.failing_comments.insert("p1".to_string());
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.counts.failed, 1);
        assert!(summary.failures[0].reason.starts_with("REDDIT_API: "));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_mark_failure_after_stored_record() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5)], &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let mut ledger = MockLedger::new(&[], &events);
        ledger.failing_marks.insert("p1".to_string());
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.counts.failed, 1);
        assert_eq!(writer.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_model_output_is_still_stored() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 5)], &events);
        let model = MockModel::replying("I cannot answer that.", &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::FullSuccess);
        assert_eq!(summary.counts.processed, 1);
        let records = writer.records.lock().unwrap();
        assert_eq!(
            records[0].1.analysis.suggested_categories,
            vec!["Error", "No JSON Found via Regex"]
        );
    }

    #[tokio::test]
    async fn test_filter_and_counts_in_full_run() {
        let events = events();
        let posts = vec![
            post("p1", 9),
            post("p2", 0),
            post("p3", 4),
            post("p4", 1),
            post("p5", 7),
        ];
        let forum = MockForum::new(posts, &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&["p3"], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::FullSuccess);
        assert_eq!(summary.counts.scanned, 3);
        assert_eq!(summary.counts.eligible, 2);
        assert_eq!(summary.counts.skipped_low_comments, 1);
        assert_eq!(summary.counts.processed, 1);
        assert_eq!(summary.counts.skipped_duplicates, 1);
        assert!(summary.message.contains("Checked 3 new posts"));
    }

    #[tokio::test]
    async fn test_listing_failure_before_any_eligible_is_fatal() {
        let events = events();
        let mut forum = MockForum::new(vec![post("p1", 0), post("p2", 9)], &events);
        forum.fail_at = Some(1);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert!(summary.is_fatal());
        assert_eq!(summary.counts.scanned, 1);
        assert!(summary.message.contains("REDDIT_API"));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_after_eligible_degrades() {
        let events = events();
        let mut forum = MockForum::new(vec![post("p1", 9), post("p2", 9)], &events);
        forum.fail_at = Some(1);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::FullSuccess);
        assert_eq!(summary.counts.eligible, 1);
        assert_eq!(summary.counts.processed, 1);
    }

    #[tokio::test]
    async fn test_no_eligible_posts_is_success() {
        let events = events();
        let forum = MockForum::new(vec![post("p1", 0), post("p2", 1)], &events);
        let model = MockModel::replying(GOOD_RESPONSE, &events);
        let writer = MockWriter::new(&events);
        let ledger = MockLedger::new(&[], &events);
        let config = config();

        let summary = run_with(&config, &forum, &model, &writer, &ledger).await;

        assert_eq!(summary.status, RunStatus::FullSuccess);
        assert!(summary.message.starts_with("No new posts found meeting criteria"));
        assert_eq!(summary.counts.skipped_low_comments, 2);
    }
}
