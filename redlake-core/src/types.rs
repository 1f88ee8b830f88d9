use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing sort order understood by the feed endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    New,
    Top,
    Hot,
    Rising,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::New => "new",
            SortMode::Top => "top",
            SortMode::Hot => "hot",
            SortMode::Rising => "rising",
        }
    }
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Hot
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured subreddit plus its fetch parameters for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTarget {
    pub subreddit: String,
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default = "FetchTarget::default_limit")]
    pub limit: u32,
}

impl FetchTarget {
    fn default_limit() -> u32 {
        100
    }
}

/// Normalized post document keyed by its stable external identifier.
///
/// `score`, `num_comments`, `selftext` and `fetched_at` are the mutable
/// fields; everything else is fixed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub reddit_id: String,
    pub subreddit: String,
    pub author: String,
    pub title: String,
    pub selftext: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub num_comments: i64,
    pub over_18: bool,
    pub created_utc: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Normalized comment document. A comment belongs to exactly one post,
/// referenced by the post's external identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub reddit_id: String,
    pub post_id: String,
    pub parent_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub depth: i64,
    pub created_utc: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Counters for one execution, aggregated by the orchestrator and printed
/// at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub posts_fetched: u64,
    pub comments_fetched: u64,
    pub posts_inserted: u64,
    pub posts_updated: u64,
    pub comments_inserted: u64,
    pub comments_updated: u64,
    pub transform_failures: u64,
    pub storage_failures: u64,
    pub skipped_checkpointed: u64,
    pub rate_limit_waits: u64,
    pub failed_targets: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            posts_fetched: 0,
            comments_fetched: 0,
            posts_inserted: 0,
            posts_updated: 0,
            comments_inserted: 0,
            comments_updated: 0,
            transform_failures: 0,
            storage_failures: 0,
            skipped_checkpointed: 0,
            rate_limit_waits: 0,
            failed_targets: Vec::new(),
        }
    }

    pub fn records_fetched(&self) -> u64 {
        self.posts_fetched + self.comments_fetched
    }

    pub fn records_inserted(&self) -> u64 {
        self.posts_inserted + self.comments_inserted
    }

    pub fn records_updated(&self) -> u64 {
        self.posts_updated + self.comments_updated
    }

    pub fn records_failed(&self) -> u64 {
        self.transform_failures + self.storage_failures
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run {} ({:.2}s)", self.run_id, self.duration_seconds())?;
        writeln!(
            f,
            "  fetched:  {} posts, {} comments",
            self.posts_fetched, self.comments_fetched
        )?;
        writeln!(
            f,
            "  inserted: {} posts, {} comments",
            self.posts_inserted, self.comments_inserted
        )?;
        writeln!(
            f,
            "  updated:  {} posts, {} comments",
            self.posts_updated, self.comments_updated
        )?;
        writeln!(
            f,
            "  failed:   {} transform, {} storage",
            self.transform_failures, self.storage_failures
        )?;
        writeln!(
            f,
            "  skipped (checkpointed): {}",
            self.skipped_checkpointed
        )?;
        write!(f, "  rate limit waits: {}", self.rate_limit_waits)?;
        if !self.failed_targets.is_empty() {
            write!(f, "\n  failed targets: {}", self.failed_targets.join(", "))?;
        }
        Ok(())
    }
}
