use crate::error::{ConfigError, CoreError};
use crate::types::FetchTarget;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "redlake.toml";

const DEFAULT_USER_AGENT: &str = "redlake/0.1 by /u/redlake";
const DEFAULT_DATABASE_URL: &str = "sqlite://redlake.db";
const DEFAULT_SUBREDDIT: &str = "computerscience";

/// Fully resolved runtime configuration, passed into each component at
/// construction. Credentials come from the environment, everything else
/// from an optional TOML file with built-in defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub storage: StorageConfig,
    pub targets: Vec<FetchTarget>,
    pub comments: CommentConfig,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub run: RunSettings,
}

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommentConfig {
    /// Fetch comments for each post. Disable to ingest posts only.
    pub fetch: bool,
    /// Maximum nesting depth to keep, `None` keeps the full tree.
    pub max_depth: Option<u32>,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            fetch: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Record processed post ids and skip them on the next run. Off by
    /// default: re-running with upserts is what refreshes mutable fields.
    pub checkpoint: bool,
    pub checkpoint_file: String,
    pub delay_between_targets_ms: u64,
    pub delay_between_posts_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            checkpoint: false,
            checkpoint_file: "checkpoint.json".to_string(),
            delay_between_targets_ms: 2000,
            delay_between_posts_ms: 1000,
        }
    }
}

/// On-disk shape of `redlake.toml`. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    user_agent: Option<String>,
    #[serde(default)]
    targets: Vec<FetchTarget>,
    #[serde(default)]
    comments: CommentConfig,
    #[serde(default)]
    rate_limit: RateLimitSettings,
    #[serde(default)]
    retry: RetrySettings,
    #[serde(default)]
    run: RunSettings,
    #[serde(default)]
    storage: StorageFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StorageFileConfig {
    database_url: Option<String>,
}

impl AppConfig {
    /// Loads configuration from `REDLAKE_CONFIG`, falling back to
    /// `redlake.toml` in the working directory, falling back to defaults.
    pub fn load() -> Result<Self, CoreError> {
        if let Ok(path) = std::env::var("REDLAKE_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            Self::load_from(default)
        } else {
            Self::resolve(FileConfig::default())
        }
    }

    /// Loads configuration from an explicit TOML file path.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&raw).map_err(ConfigError::Parse)?;
        Self::resolve(file)
    }

    fn resolve(file: FileConfig) -> Result<Self, CoreError> {
        let client_id = require_env("REDDIT_CLIENT_ID")?;
        let client_secret = require_env("REDDIT_CLIENT_SECRET")?;

        let user_agent = std::env::var("REDLAKE_USER_AGENT")
            .ok()
            .or(file.user_agent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .or(file.storage.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let targets = if file.targets.is_empty() {
            vec![FetchTarget {
                subreddit: DEFAULT_SUBREDDIT.to_string(),
                sort: Default::default(),
                limit: 100,
            }]
        } else {
            file.targets
        };

        let config = Self {
            reddit: RedditConfig {
                client_id,
                client_secret,
                user_agent,
            },
            storage: StorageConfig { database_url },
            targets,
            comments: file.comments,
            rate_limit: file.rate_limit,
            retry: file.retry,
            run: file.run,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for target in &self.targets {
            if target.subreddit.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "targets.subreddit".to_string(),
                    value: target.subreddit.clone(),
                });
            }
            if target.limit == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("targets.{}.limit", target.subreddit),
                    value: "0".to_string(),
                });
            }
        }

        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.requests_per_minute".to_string(),
                value: "0".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn require_env(var_name: &str) -> Result<String, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        }),
    }
}
