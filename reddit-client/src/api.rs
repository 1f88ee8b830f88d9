use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use redlake_core::{CoreError, RedditApiError, SortMode};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Reddit caps listing pages at 100 entries regardless of the requested
/// limit.
pub(crate) const PAGE_SIZE_MAX: u32 = 100;

/// Thing-kind discriminators used in listing children.
pub(crate) const KIND_POST: &str = "t3";
pub(crate) const KIND_COMMENT: &str = "t1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Wire shape of one submission inside a subreddit listing. Every field
/// defaults so that a sparse record still parses; validation happens in
/// the transformer, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPostData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub is_self: bool,
}

/// Wire shape of one comment. `replies` is a nested listing, delivered as
/// an empty string when the comment is a leaf.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCommentData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub link_id: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default, deserialize_with = "replies_listing")]
    pub replies: Option<RedditListing<RawCommentData>>,
}

fn replies_listing<'de, D>(
    deserializer: D,
) -> Result<Option<RedditListing<RawCommentData>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Replies {
        Listing(RedditListing<RawCommentData>),
        Empty(String),
    }

    Ok(match Option::<Replies>::deserialize(deserializer)? {
        Some(Replies::Listing(listing)) => Some(listing),
        _ => None,
    })
}

/// Walks a comment listing depth-first, yielding each comment with its
/// nesting level. Unexpanded `more` stubs are skipped; `max_depth` prunes
/// subtrees below the given level.
pub fn flatten_comment_tree(
    listing: RedditListing<RawCommentData>,
    max_depth: Option<u32>,
) -> Vec<(RawCommentData, u32)> {
    let mut flat = Vec::new();
    flatten_level(listing, 0, max_depth, &mut flat);
    flat
}

fn flatten_level(
    listing: RedditListing<RawCommentData>,
    depth: u32,
    max_depth: Option<u32>,
    out: &mut Vec<(RawCommentData, u32)>,
) {
    if max_depth.is_some_and(|max| depth > max) {
        return;
    }

    for child in listing.data.children {
        if child.kind != KIND_COMMENT {
            continue;
        }
        let mut comment = child.data;
        let replies = comment.replies.take();
        out.push((comment, depth));
        if let Some(replies) = replies {
            flatten_level(replies, depth + 1, max_depth, out);
        }
    }
}

/// Low-level authenticated access to the Reddit data API, shared rate
/// limiter included. Higher-level pagination lives on `RedditClient`.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str, rate_config: RateLimitConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(rate_config)),
            user_agent: user_agent.to_string(),
        })
    }

    /// The underlying HTTP client, reused for token requests so every
    /// outbound call carries the same user agent.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn rate_limiter_waits(&self) -> u64 {
        self.rate_limiter.total_waits()
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{REDDIT_API_BASE}{endpoint}");

        self.rate_limiter.acquire().await;
        debug!("issuing Reddit API request: {} {}", method, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if !query_params.is_empty() {
            request_builder = request_builder.query(query_params);
        }

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("request failed with status {} for {}", status, endpoint);
        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("rate limited, retry after {} seconds", retry_after);
                Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                    retry_after,
                }))
            }
            401 => Err(CoreError::RedditApi(RedditApiError::InvalidToken)),
            403 => Err(CoreError::RedditApi(RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            })),
            404 => Err(CoreError::RedditApi(RedditApiError::NotFound {
                resource: endpoint.to_string(),
            })),
            code if status.is_server_error() => {
                Err(CoreError::RedditApi(RedditApiError::ServerError {
                    status_code: code,
                }))
            }
            _ => Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("unexpected status {status} for {endpoint}"),
            })),
        }
    }

    /// One page of a subreddit listing, at most `PAGE_SIZE_MAX` entries.
    pub async fn get_subreddit_page(
        &self,
        access_token: &str,
        subreddit: &str,
        sort: SortMode,
        limit: u32,
        after: Option<&str>,
    ) -> Result<RedditListing<RawPostData>, CoreError> {
        let endpoint = format!("/r/{}/{}", subreddit, sort.as_str());

        let mut params = vec![
            ("raw_json", "1".to_string()),
            ("limit", limit.min(PAGE_SIZE_MAX).to_string()),
        ];
        if sort == SortMode::Top {
            params.push(("t", "day".to_string()));
        }
        if let Some(after) = after {
            params.push(("after", after.to_string()));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        let listing: RedditListing<RawPostData> = response.json().await.map_err(|e| {
            error!("failed to parse subreddit listing: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("failed to parse listing for r/{subreddit}: {e}"),
            })
        })?;

        info!(
            "retrieved {} posts from r/{} ({})",
            listing.data.children.len(),
            subreddit,
            sort
        );
        Ok(listing)
    }

    /// The comment tree for one post. The endpoint answers with a pair of
    /// listings, the post itself first; only the comment listing is kept.
    pub async fn get_post_comments(
        &self,
        access_token: &str,
        subreddit: &str,
        article: &str,
        max_depth: Option<u32>,
    ) -> Result<RedditListing<RawCommentData>, CoreError> {
        let endpoint = format!("/r/{subreddit}/comments/{article}");

        let mut params = vec![("raw_json", "1".to_string())];
        if let Some(depth) = max_depth {
            // Server-side depth is 1-based, our levels are 0-based.
            params.push(("depth", (depth + 1).to_string()));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        let (_, comments): (RedditListing<RawPostData>, RedditListing<RawCommentData>) =
            response.json().await.map_err(|e| {
                error!("failed to parse comment tree: {}", e);
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("failed to parse comments for {article}: {e}"),
                })
            })?;

        debug!(
            "retrieved {} top-level comments for {}",
            comments.data.children.len(),
            article
        );
        Ok(comments)
    }
}
