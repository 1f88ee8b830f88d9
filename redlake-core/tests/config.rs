use redlake_core::{AppConfig, ConfigError, CoreError, SortMode};
use std::io::Write;

fn set_credentials() {
    std::env::set_var("REDDIT_CLIENT_ID", "test-client-id");
    std::env::set_var("REDDIT_CLIENT_SECRET", "test-client-secret");
}

#[test]
fn load_from_parses_targets_and_sections() {
    set_credentials();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
user_agent = "redlake-tests/0.1"

[[targets]]
subreddit = "rust"
sort = "new"
limit = 25

[[targets]]
subreddit = "programming"

[comments]
fetch = false

[rate_limit]
requests_per_minute = 30
burst = 5

[run]
checkpoint = true
delay_between_posts_ms = 50
"#
    )
    .unwrap();

    let config = AppConfig::load_from(file.path()).unwrap();

    assert_eq!(config.reddit.client_id, "test-client-id");
    assert_eq!(config.reddit.user_agent, "redlake-tests/0.1");
    assert_eq!(config.targets.len(), 2);
    assert_eq!(config.targets[0].subreddit, "rust");
    assert_eq!(config.targets[0].sort, SortMode::New);
    assert_eq!(config.targets[0].limit, 25);
    // Unspecified fields come from serde defaults.
    assert_eq!(config.targets[1].sort, SortMode::Hot);
    assert_eq!(config.targets[1].limit, 100);
    assert!(!config.comments.fetch);
    assert_eq!(config.rate_limit.requests_per_minute, 30);
    assert!(config.run.checkpoint);
    assert_eq!(config.run.delay_between_posts_ms, 50);
    // Untouched sections keep their defaults.
    assert_eq!(config.retry.max_attempts, 3);
}

#[test]
fn missing_explicit_file_is_an_error() {
    set_credentials();

    let result = AppConfig::load_from(std::path::Path::new("/definitely/not/here.toml"));
    assert!(matches!(
        result,
        Err(CoreError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[test]
fn zero_limit_target_is_rejected() {
    set_credentials();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[[targets]]
subreddit = "rust"
limit = 0
"#
    )
    .unwrap();

    let result = AppConfig::load_from(file.path());
    assert!(matches!(
        result,
        Err(CoreError::Config(ConfigError::InvalidValue { .. }))
    ));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    set_credentials();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[[targets]\nsubreddit = ").unwrap();

    let result = AppConfig::load_from(file.path());
    assert!(matches!(
        result,
        Err(CoreError::Config(ConfigError::Parse(_)))
    ));
}
