pub mod api;
pub mod auth;
pub mod rate_limiter;
pub mod retry;


pub use api::{
    flatten_comment_tree, RawCommentData, RawPostData, RedditApiClient, RedditListing,
    RedditListingChild, RedditListingData,
};
pub use auth::{AppToken, RedditAuth};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{calculate_delay, retry_strategy, RetryConfig, RetryExecutor, RetryStrategy};

use futures::{Stream, TryStreamExt};
use redlake_core::{AppConfig, CoreError, FetchTarget};
use tokio::sync::RwLock;
use tracing::debug;

/// Feed client: authenticated, rate-limited, retrying access to subreddit
/// listings and comment trees.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    auth: RedditAuth,
    retry: RetryExecutor,
    token: RwLock<Option<AppToken>>,
}

struct PageState {
    after: Option<String>,
    fetched: u32,
    done: bool,
}

impl RedditClient {
    pub fn new(config: &AppConfig) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(
            &config.reddit.user_agent,
            RateLimitConfig::from_settings(&config.rate_limit),
        )?;
        let auth = RedditAuth::new(
            &config.reddit.client_id,
            &config.reddit.client_secret,
            api.http_client().clone(),
        )?;
        let retry = RetryExecutor::new(RetryConfig::from_settings(&config.retry));

        Ok(Self {
            api,
            auth,
            retry,
            token: RwLock::new(None),
        })
    }

    /// Returns a valid access token, requesting or refreshing the cached
    /// application token as needed.
    pub async fn authenticate(&self) -> Result<String, CoreError> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref() {
                if !token.is_expired() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("requesting fresh application token");
        let token = self.auth.request_token().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    /// Lazily pages through a subreddit listing, yielding raw post records
    /// up to the target's cap. Each page request passes through the rate
    /// limiter and the retry executor; a throttling signal suspends the
    /// stream instead of ending it.
    pub fn stream_posts(
        &self,
        target: FetchTarget,
    ) -> impl Stream<Item = Result<RawPostData, CoreError>> + '_ {
        let state = PageState {
            after: None,
            fetched: 0,
            done: false,
        };

        futures::stream::try_unfold(state, move |mut state| {
            let subreddit = target.subreddit.clone();
            let sort = target.sort;
            let cap = target.limit;

            async move {
                if state.done || state.fetched >= cap {
                    return Ok::<Option<(Vec<RawPostData>, PageState)>, CoreError>(None);
                }

                let page_size = cap - state.fetched;
                let token = self.authenticate().await?;
                let listing = self
                    .retry
                    .execute("subreddit listing", || {
                        self.api.get_subreddit_page(
                            &token,
                            &subreddit,
                            sort,
                            page_size,
                            state.after.as_deref(),
                        )
                    })
                    .await?;

                state.after = listing.data.after.clone();
                let posts: Vec<RawPostData> = listing
                    .data
                    .children
                    .into_iter()
                    .filter(|child| child.kind == api::KIND_POST)
                    .map(|child| child.data)
                    .take((cap - state.fetched) as usize)
                    .collect();

                state.fetched += posts.len() as u32;
                state.done = state.after.is_none() || posts.is_empty();
                debug!(
                    "page complete for r/{}: {} fetched of {} cap",
                    subreddit, state.fetched, cap
                );

                Ok(Some((posts, state)))
            }
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
    }

    /// Fetches and flattens the comment tree for one post. Records carry
    /// their nesting level, top-level comments at 0.
    pub async fn fetch_comments(
        &self,
        subreddit: &str,
        article: &str,
        max_depth: Option<u32>,
    ) -> Result<Vec<(RawCommentData, u32)>, CoreError> {
        let token = self.authenticate().await?;
        let listing = self
            .retry
            .execute("comment tree", || {
                self.api
                    .get_post_comments(&token, subreddit, article, max_depth)
            })
            .await?;

        Ok(flatten_comment_tree(listing, max_depth))
    }

    /// Throttle pauses taken so far: client-side bucket waits plus
    /// server-signalled rate-limit suspensions.
    pub fn rate_limit_waits(&self) -> u64 {
        self.api.rate_limiter_waits() + self.retry.rate_limit_waits()
    }
}
