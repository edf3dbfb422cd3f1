pub mod api;
mod tests;

pub use api::{flatten_comment_tree, PostPage, RedditApiClient, MAX_PAGE_SIZE};

use analyzer_core::{CoreError, Credentials, RedditApiError, RedditComment, RedditPost};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_USER_AGENT: &str = "AwsAnalysisBot/1.0.0";
pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl RedditClientConfig {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self::new(
            credentials.reddit_client_id.clone(),
            credentials.reddit_client_secret.clone(),
            DEFAULT_USER_AGENT.to_string(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Read-only access to a forum community.
pub trait ForumClient {
    /// Posts of `subreddit`, newest first, ending after `limit` posts or when
    /// the listing runs out. The first error ends the stream.
    fn new_posts<'a>(
        &'a self,
        subreddit: &'a str,
        limit: usize,
    ) -> impl Stream<Item = Result<RedditPost, CoreError>> + 'a;

    /// Every comment of `post`, in the forum's `top` order.
    async fn fetch_comments(&self, post: &RedditPost) -> Result<Vec<RedditComment>, CoreError>;
}

/// Application-only Reddit client using the client-credentials grant.
pub struct RedditClient {
    config: RedditClientConfig,
    api_client: RedditApiClient,
    token: Mutex<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig) -> Result<Self, CoreError> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "client id and secret are required".to_string(),
            }));
        }

        let api_client = RedditApiClient::new(config.user_agent.clone())?;

        Ok(Self {
            config,
            api_client,
            token: Mutex::new(None),
        })
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &RedditClientConfig {
        &self.config
    }

    /// Returns a valid access token, exchanging client credentials for a new
    /// one when none is cached or the cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        let token = self.authenticate().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Requesting Reddit application token");

        let response = self
            .api_client
            .http_client()
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token request failed with status {}", status);
            return Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: format!("token endpoint returned {}", status),
            }));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: format!("unreadable token response: {}", e),
            })
        })?;

        debug!("Token valid for {} seconds", body.expires_in);
        Ok(RedditToken {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

impl ForumClient for RedditClient {
    fn new_posts<'a>(
        &'a self,
        subreddit: &'a str,
        limit: usize,
    ) -> impl Stream<Item = Result<RedditPost, CoreError>> + 'a {
        paginate(limit, move |page_size, after| async move {
            let token = self.access_token().await?;
            self.api_client
                .get_new_posts(&token, subreddit, page_size, after.as_deref())
                .await
        })
    }

    async fn fetch_comments(&self, post: &RedditPost) -> Result<Vec<RedditComment>, CoreError> {
        let token = self.access_token().await?;
        self.api_client.get_comments(&token, &post.id).await
    }
}

struct PageCursor {
    buffer: VecDeque<RedditPost>,
    after: Option<String>,
    remaining: usize,
    exhausted: bool,
}

/// Turns a page fetcher into a lazy post stream of at most `limit` items.
/// `fetch_page` receives the page size to ask for and the cursor of the
/// previous page.
pub fn paginate<F, Fut>(limit: usize, fetch_page: F) -> impl Stream<Item = Result<RedditPost, CoreError>>
where
    F: Fn(usize, Option<String>) -> Fut,
    Fut: Future<Output = Result<PostPage, CoreError>>,
{
    let cursor = PageCursor {
        buffer: VecDeque::new(),
        after: None,
        remaining: limit,
        exhausted: false,
    };

    stream::unfold((cursor, fetch_page), |(mut cursor, fetch_page)| async move {
        if cursor.remaining == 0 {
            return None;
        }

        if cursor.buffer.is_empty() {
            if cursor.exhausted {
                return None;
            }
            let page_size = cursor.remaining.min(MAX_PAGE_SIZE);
            match fetch_page(page_size, cursor.after.take()).await {
                Ok(page) => {
                    cursor.exhausted = page.after.is_none() || page.posts.is_empty();
                    cursor.after = page.after;
                    cursor.buffer.extend(page.posts);
                }
                Err(e) => {
                    cursor.remaining = 0;
                    return Some((Err(e), (cursor, fetch_page)));
                }
            }
        }

        let post = cursor.buffer.pop_front()?;
        cursor.remaining -= 1;
        Some((Ok(post), (cursor, fetch_page)))
    })
}
