use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn error_code(&self) -> &'static str;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("{}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API",
            CoreError::Storage(_) => "STORAGE",
            CoreError::Transform(_) => "TRANSFORM",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}

impl RedditApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::ServerError { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::InvalidResponse { .. } => true,
            RedditApiError::AuthenticationFailed { .. } => false,
            RedditApiError::InvalidToken => false,
            RedditApiError::Forbidden { .. } => false,
            RedditApiError::NotFound { .. } => false,
        }
    }

    /// Authentication problems are never worth retrying and should stop
    /// the whole run instead of a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RedditApiError::AuthenticationFailed { .. } | RedditApiError::InvalidToken
        )
    }
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ConnectionFailed { .. } => true,
            StorageError::Sql(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable_with_delay() {
        let err = CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 30 });
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn auth_errors_are_fatal_and_not_retryable() {
        let err = RedditApiError::AuthenticationFailed {
            reason: "bad credentials".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert!(RedditApiError::InvalidToken.is_fatal());
    }

    #[test]
    fn transform_errors_are_not_retryable() {
        let err = CoreError::Transform(TransformError::MissingField {
            kind: "post",
            field: "title",
        });
        assert!(!err.is_retryable());
        assert_eq!(err.retry_after(), None);
        assert_eq!(err.error_code(), "TRANSFORM");
    }
}
