use analyzer_core::{CoreError, RedditApiError, RedditComment, RedditPost, DELETED_AUTHOR};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// Largest page the listing endpoints return.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub is_self: bool,
}

/// One page of a listing, already converted.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<RedditPost>,
    pub after: Option<String>,
}

impl From<RedditListing<RedditPostData>> for PostPage {
    fn from(listing: RedditListing<RedditPostData>) -> Self {
        Self {
            posts: listing
                .data
                .children
                .into_iter()
                .map(|child| RedditPost::from(child.data))
                .collect(),
            after: listing.data.after,
        }
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    user_agent: String,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            user_agent,
            base_url: REDDIT_API_BASE.to_string(),
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => not_found_error(endpoint),
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("Unexpected status {code} for {endpoint}"),
            },
        };
        Err(CoreError::RedditApi(error))
    }

    /// One page of `/r/{subreddit}/new`, newest first.
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: usize,
        after: Option<&str>,
    ) -> Result<PostPage, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let limit_str = limit.min(MAX_PAGE_SIZE).to_string();
        let mut params = vec![("limit", limit_str.as_str()), ("raw_json", "1")];
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(&params))
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing.into())
    }

    /// The full comment tree of a post in `top` order, flattened.
    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<Vec<RedditComment>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let params = [("sort", "top"), ("raw_json", "1")];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(&params))
            .await?;

        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to parse comments: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {}", post_id),
            })
        })?;

        let comments = flatten_comment_tree(post_id, &body)?;
        debug!("Retrieved {} comments for post {}", comments.len(), post_id);
        Ok(comments)
    }
}

/// Classifies a 404 by the endpoint that returned it.
pub fn not_found_error(endpoint: &str) -> RedditApiError {
    let mut segments = endpoint.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("r"), Some(subreddit)) if !subreddit.is_empty() => RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        },
        (Some("comments"), Some(post_id)) if !post_id.is_empty() => RedditApiError::PostNotFound {
            post_id: post_id.to_string(),
        },
        _ => RedditApiError::InvalidResponse {
            details: format!("Resource not found: {endpoint}"),
        },
    }
}

/// Flattens the second listing of a `/comments/{id}` response breadth
/// first, the order in which a fully expanded tree is listed. "Load more"
/// stubs are dropped.
pub fn flatten_comment_tree(post_id: &str, body: &Value) -> Result<Vec<RedditComment>, CoreError> {
    let root = body
        .as_array()
        .and_then(|listings| listings.get(1))
        .and_then(|listing| listing.pointer("/data/children"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Comment listing missing for post {}", post_id),
            })
        })?;

    let mut queue: VecDeque<&Value> = root.iter().collect();
    let mut comments = Vec::new();

    while let Some(child) = queue.pop_front() {
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };

        comments.push(RedditComment {
            post_id: post_id.to_string(),
            author: data
                .get("author")
                .and_then(Value::as_str)
                .unwrap_or(DELETED_AUTHOR)
                .to_string(),
            body: data
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });

        if let Some(replies) = data.pointer("/replies/data/children").and_then(Value::as_array) {
            queue.extend(replies.iter());
        }
    }

    Ok(comments)
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.is_empty() {
        return String::new();
    }
    Url::parse(REDDIT_WEB_BASE)
        .and_then(|base| base.join(permalink))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("{}{}", REDDIT_WEB_BASE, permalink))
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        let created_utc = DateTime::<Utc>::from_timestamp(post_data.created_utc as i64, 0)
            .unwrap_or_default();
        let author = if post_data.author.is_empty() {
            DELETED_AUTHOR.to_string()
        } else {
            post_data.author
        };
        let permalink = absolute_permalink(&post_data.permalink);
        let url = if post_data.url.is_empty() {
            permalink.clone()
        } else {
            post_data.url
        };

        Self {
            id: post_data.id,
            title: post_data.title,
            selftext: post_data.selftext,
            author,
            score: post_data.score,
            num_comments: post_data.num_comments,
            created_utc,
            url,
            permalink,
            subreddit: post_data.subreddit,
        }
    }
}
