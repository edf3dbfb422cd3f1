#[cfg(test)]
mod tests {
    use crate::api::{self, RedditListing, RedditPostData};
    use crate::{paginate, PostPage, RedditClient, RedditClientConfig, RedditToken};
    use analyzer_core::{CoreError, ErrorExt, RedditApiError, RedditPost, DELETED_AUTHOR};
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn create_test_config() -> RedditClientConfig {
        RedditClientConfig::new(
            "test_client_id".to_string(),
            "test_client_secret".to_string(),
            crate::DEFAULT_USER_AGENT.to_string(),
        )
    }

    fn post(id: &str, num_comments: u32) -> RedditPost {
        let data: RedditPostData = serde_json::from_value(json!({
            "id": id,
            "title": format!("Post {id}"),
            "subreddit": "aws",
            "created_utc": 1_700_000_000.0,
            "num_comments": num_comments,
        }))
        .unwrap();
        data.into()
    }

    fn pages(ids: &[&[&str]]) -> Vec<PostPage> {
        let last = ids.len().saturating_sub(1);
        ids.iter()
            .enumerate()
            .map(|(i, page)| PostPage {
                posts: page.iter().map(|id| post(id, 0)).collect(),
                after: (i < last).then(|| format!("t3_{}", page.last().unwrap())),
            })
            .collect()
    }

    #[test]
    fn test_client_creation() {
        let client = RedditClient::new(create_test_config());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().config().user_agent, "AwsAnalysisBot/1.0.0");
    }

    #[test]
    fn test_client_requires_credentials() {
        let mut config = create_test_config();
        config.client_secret = "  ".to_string();
        assert!(matches!(
            RedditClient::new(config),
            Err(CoreError::RedditApi(
                RedditApiError::AuthenticationFailed { .. }
            ))
        ));
    }

    #[test]
    fn test_token_expiry() {
        let valid = RedditToken {
            access_token: "valid".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        let nearly_expired = RedditToken {
            access_token: "old".to_string(),
            expires_at: Instant::now() + Duration::from_secs(10),
        };
        assert!(!valid.is_expired());
        assert!(nearly_expired.is_expired());
    }

    #[test]
    fn test_listing_parsing() {
        let listing: RedditListing<RedditPostData> = serde_json::from_value(json!({
            "kind": "Listing",
            "data": {
                "after": "t3_b",
                "before": null,
                "dist": 2,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "a",
                        "title": "Lambda cold starts",
                        "selftext": "Why so slow?",
                        "author": "alice",
                        "subreddit": "aws",
                        "url": "https://www.reddit.com/r/aws/comments/a/lambda/",
                        "permalink": "/r/aws/comments/a/lambda/",
                        "created_utc": 1_700_000_000.0,
                        "score": 42,
                        "num_comments": 7,
                        "stickied": false,
                        "is_self": true
                    }},
                    {"kind": "t3", "data": {
                        "id": "b",
                        "title": "Removed author",
                        "author": "",
                        "subreddit": "aws",
                        "permalink": "/r/aws/comments/b/removed/",
                        "created_utc": 1_700_000_100.5
                    }}
                ]
            }
        }))
        .unwrap();

        let page = PostPage::from(listing);
        assert_eq!(page.after.as_deref(), Some("t3_b"));
        assert_eq!(page.posts.len(), 2);

        let first = &page.posts[0];
        assert_eq!(first.id, "a");
        assert_eq!(first.score, 42);
        assert_eq!(first.num_comments, 7);
        assert_eq!(first.created_utc.timestamp(), 1_700_000_000);
        assert_eq!(
            first.permalink,
            "https://www.reddit.com/r/aws/comments/a/lambda/"
        );

        let second = &page.posts[1];
        assert_eq!(second.author, DELETED_AUTHOR);
        assert!(second.selftext.is_empty());
        assert_eq!(second.num_comments, 0);
        assert_eq!(second.url, second.permalink);
    }

    #[test]
    fn test_comment_tree_flattened_breadth_first() {
        let body = json!([
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {"id": "p1"}}]}},
            {"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {
                    "author": "a",
                    "body": "top one",
                    "replies": {"kind": "Listing", "data": {"children": [
                        {"kind": "t1", "data": {"author": "c", "body": "reply to one", "replies": ""}},
                        {"kind": "more", "data": {"count": 4, "children": ["x", "y"]}}
                    ]}}
                }},
                {"kind": "t1", "data": {"author": "b", "body": "top two", "replies": ""}},
                {"kind": "more", "data": {"count": 12}}
            ]}}
        ]);

        let comments = api::flatten_comment_tree("p1", &body).unwrap();
        let bodies: Vec<&str> = comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["top one", "top two", "reply to one"]);
        assert!(comments.iter().all(|c| c.post_id == "p1"));
        assert_eq!(comments[1].author, "b");
    }

    #[test]
    fn test_comment_tree_requires_listing() {
        let result = api::flatten_comment_tree("p1", &json!({"error": 404}));
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::InvalidResponse { .. }))
        ));
    }

    #[test]
    fn test_not_found_is_classified_by_endpoint() {
        assert!(matches!(
            api::not_found_error("/r/awsnosuchsub/new"),
            RedditApiError::SubredditNotFound { ref subreddit } if subreddit == "awsnosuchsub"
        ));
        assert!(matches!(
            api::not_found_error("/comments/abc123"),
            RedditApiError::PostNotFound { ref post_id } if post_id == "abc123"
        ));
        assert!(matches!(
            api::not_found_error("/api/v1/me"),
            RedditApiError::InvalidResponse { .. }
        ));
        assert_eq!(
            api::not_found_error("/r/aws/new").error_code(),
            "REDDIT_SUBREDDIT_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_paginate_follows_cursor_until_limit() {
        let canned = pages(&[&["a", "b"], &["c", "d"], &["e"]]);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        let stream = paginate(3, move |size, after| {
            log.lock().unwrap().push((size, after.clone()));
            let index = log.lock().unwrap().len() - 1;
            let page = canned[index].clone();
            async move { Ok(page) }
        });

        let ids: Vec<String> = stream.map(|p| p.unwrap().id).collect().await;
        assert_eq!(ids, vec!["a", "b", "c"]);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], (3, None));
        assert_eq!(requests[1], (1, Some("t3_b".to_string())));
    }

    #[tokio::test]
    async fn test_paginate_stops_when_listing_exhausted() {
        let canned = pages(&[&["a", "b"], &["c"]]);
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();

        let stream = paginate(50, move |_, _| {
            let mut n = counter.lock().unwrap();
            let page = canned.get(*n).cloned().unwrap_or_default();
            *n += 1;
            async move { Ok(page) }
        });

        let ids: Vec<String> = stream.map(|p| p.unwrap().id).collect().await;
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_paginate_error_ends_stream() {
        let canned = pages(&[&["a", "b"], &["c"]]);
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();

        let stream = paginate(10, move |_, _| {
            let mut n = counter.lock().unwrap();
            let result = if *n == 0 {
                Ok(canned[0].clone())
            } else {
                Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: 503,
                }))
            };
            *n += 1;
            async move { result }
        });

        let items: Vec<Result<RedditPost, CoreError>> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(
            items[2],
            Err(CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 503
            }))
        ));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_paginate_zero_limit_fetches_nothing() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let stream = paginate(0, move |_, _| {
            *counter.lock().unwrap() += 1;
            async move { Ok(PostPage::default()) }
        });

        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
