use crate::checkpoint::CheckpointManager;
use crate::transform;
use chrono::Utc;
use database::{Storage, UpsertOutcome};
use futures::{pin_mut, TryStreamExt};
use reddit_client::RedditClient;
use redlake_core::{AppConfig, CoreError, FetchTarget, RunSummary};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Sequences one ingestion run: for each configured target, stream raw
/// posts, normalize, write, then fetch and write each post's comments.
/// A failing target is recorded and the run moves on to the next one.
pub struct Pipeline {
    config: AppConfig,
    client: RedditClient,
    storage: Storage,
    checkpoint: Option<CheckpointManager>,
}

impl Pipeline {
    pub async fn new(config: AppConfig) -> Result<Self, CoreError> {
        let client = RedditClient::new(&config)?;
        let storage = Storage::connect(&config.storage.database_url).await?;
        storage.run_migrations().await?;

        let checkpoint = config
            .run
            .checkpoint
            .then(|| CheckpointManager::load(Path::new(&config.run.checkpoint_file)));

        Ok(Self {
            config,
            client,
            storage,
            checkpoint,
        })
    }

    /// Runs the whole ingestion and returns the aggregated summary.
    /// Authentication failures before any fetch are the only fatal exit;
    /// everything later degrades to per-target or per-record failures.
    pub async fn run(mut self) -> Result<RunSummary, CoreError> {
        let mut summary = RunSummary::new();
        info!("starting ingestion run {}", summary.run_id);

        self.client.authenticate().await?;

        let targets = self.config.targets.clone();
        for (idx, target) in targets.iter().enumerate() {
            info!(
                "fetching up to {} '{}' posts from r/{}",
                target.limit, target.sort, target.subreddit
            );

            if let Err(e) = self.ingest_target(target, &mut summary).await {
                summary.failed_targets.push(target.subreddit.clone());
                match &e {
                    CoreError::RedditApi(api) if api.is_fatal() => {
                        error!(
                            "fatal error on r/{}: {}; skipping remaining targets",
                            target.subreddit, e
                        );
                        break;
                    }
                    _ => error!("target r/{} failed: {}", target.subreddit, e),
                }
            }

            if idx + 1 < targets.len() {
                sleep(Duration::from_millis(self.config.run.delay_between_targets_ms)).await;
            }
        }

        summary.rate_limit_waits = self.client.rate_limit_waits();
        summary.finished_at = Some(Utc::now());
        info!(
            "run {} complete: {} fetched, {} inserted, {} updated, {} failed",
            summary.run_id,
            summary.records_fetched(),
            summary.records_inserted(),
            summary.records_updated(),
            summary.records_failed()
        );

        self.storage.close().await;
        Ok(summary)
    }

    async fn ingest_target(
        &mut self,
        target: &FetchTarget,
        summary: &mut RunSummary,
    ) -> Result<(), CoreError> {
        let stream = self.client.stream_posts(target.clone());
        pin_mut!(stream);

        while let Some(raw) = stream.try_next().await? {
            summary.posts_fetched += 1;

            if let Some(checkpoint) = &self.checkpoint {
                if checkpoint.is_processed(&raw.id) {
                    summary.skipped_checkpointed += 1;
                    continue;
                }
            }

            let post = match transform::post_document(&raw, Utc::now()) {
                Ok(post) => post,
                Err(e) => {
                    warn!("skipping post record: {}", e);
                    summary.transform_failures += 1;
                    continue;
                }
            };

            match self.storage.upsert_post(&post).await {
                Ok(UpsertOutcome::Inserted) => summary.posts_inserted += 1,
                Ok(UpsertOutcome::Updated) => summary.posts_updated += 1,
                Err(e) => {
                    error!("failed to write post {}: {}", post.reddit_id, e);
                    summary.storage_failures += 1;
                    continue;
                }
            }

            // The post document exists now; its comments may follow.
            if self.config.comments.fetch {
                self.ingest_comments(target, &post.reddit_id, summary)
                    .await?;
                sleep(Duration::from_millis(self.config.run.delay_between_posts_ms)).await;
            }

            if let Some(checkpoint) = &mut self.checkpoint {
                if let Err(e) = checkpoint.mark_processed(&post.reddit_id) {
                    warn!("could not persist checkpoint: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn ingest_comments(
        &self,
        target: &FetchTarget,
        post_id: &str,
        summary: &mut RunSummary,
    ) -> Result<(), CoreError> {
        let comments = match self
            .client
            .fetch_comments(&target.subreddit, post_id, self.config.comments.max_depth)
            .await
        {
            Ok(comments) => comments,
            Err(e) => match &e {
                CoreError::RedditApi(api) if api.is_fatal() => return Err(e),
                _ => {
                    warn!("could not fetch comments for {}: {}", post_id, e);
                    return Ok(());
                }
            },
        };

        for (raw, depth) in comments {
            summary.comments_fetched += 1;

            let comment = match transform::comment_document(&raw, post_id, depth, Utc::now()) {
                Ok(comment) => comment,
                Err(e) => {
                    warn!("skipping comment record: {}", e);
                    summary.transform_failures += 1;
                    continue;
                }
            };

            match self.storage.upsert_comment(&comment).await {
                Ok(UpsertOutcome::Inserted) => summary.comments_inserted += 1,
                Ok(UpsertOutcome::Updated) => summary.comments_updated += 1,
                Err(e) => {
                    error!("failed to write comment {}: {}", comment.reddit_id, e);
                    summary.storage_failures += 1;
                }
            }
        }

        Ok(())
    }

}

/// Fetches and prints the first few posts per target without opening the
/// document store. Diagnostic mode for checking credentials and targets.
pub async fn preview(config: &AppConfig, posts_per_target: u32) -> Result<(), CoreError> {
    let client = RedditClient::new(config)?;
    client.authenticate().await?;

    for target in &config.targets {
        println!("r/{} ({}):", target.subreddit, target.sort);

        let limited = FetchTarget {
            limit: target.limit.min(posts_per_target),
            ..target.clone()
        };
        let stream = client.stream_posts(limited);
        pin_mut!(stream);

        while let Some(raw) = stream.try_next().await? {
            match transform::post_document(&raw, Utc::now()) {
                Ok(post) => println!(
                    "  [{}] {} (score {}, {} comments) by {}",
                    post.reddit_id,
                    truncated(&post.title, 70),
                    post.score,
                    post.num_comments,
                    post.author
                ),
                Err(e) => println!("  skipped record: {e}"),
            }
        }
    }

    Ok(())
}

fn truncated(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_keeps_short_titles() {
        assert_eq!(truncated("short", 70), "short");
    }

    #[test]
    fn truncated_cuts_on_char_boundaries() {
        let text = "échantillon de titre assez long pour être coupé";
        let cut = truncated(text, 10);
        assert_eq!(cut, "échantillo...");
    }
}
