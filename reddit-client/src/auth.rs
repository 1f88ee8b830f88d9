use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, TokenResponse, TokenUrl};
use redlake_core::{CoreError, RedditApiError};
use std::time::{Duration, SystemTime};
use tracing::info;

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are treated as expired this long before the server-side expiry
/// so that in-flight requests never race the cutoff.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Application-only bearer token from the client credentials grant.
#[derive(Debug, Clone)]
pub struct AppToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl AppToken {
    pub fn is_expired(&self) -> bool {
        match self.expires_at.duration_since(SystemTime::now()) {
            Ok(remaining) => remaining <= EXPIRY_SLACK,
            Err(_) => true,
        }
    }
}

/// Script-style authentication against Reddit's token endpoint. No user
/// authorization step: the client id/secret pair identifies the app.
#[derive(Debug)]
pub struct RedditAuth {
    oauth: BasicClient,
    http: reqwest::Client,
}

impl RedditAuth {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        http: reqwest::Client,
    ) -> Result<Self, CoreError> {
        let oauth = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| {
                RedditApiError::AuthenticationFailed {
                    reason: format!("invalid authorization URL: {e}"),
                }
            })?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| {
                RedditApiError::AuthenticationFailed {
                    reason: format!("invalid token URL: {e}"),
                }
            })?),
        );

        Ok(Self { oauth, http })
    }

    /// Requests a fresh application token via the client credentials grant.
    pub async fn request_token(&self) -> Result<AppToken, CoreError> {
        let http = self.http.clone();
        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(move |request| send_token_request(http, request))
            .await
            .map_err(|e| RedditApiError::AuthenticationFailed {
                reason: e.to_string(),
            })?;

        let ttl = response
            .expires_in()
            .unwrap_or(Duration::from_secs(3600));
        info!("obtained application token, valid for {}s", ttl.as_secs());

        Ok(AppToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + ttl,
        })
    }
}

/// Bridges the oauth2 crate onto the shared reqwest client so token
/// requests carry the configured user agent. Reddit rejects requests with
/// generic library user agents.
async fn send_token_request(
    http: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
