use chrono::{DateTime, TimeZone, Utc};
use redlake_core::{Comment, CoreError, Post, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};


/// Whether an upsert created a new document or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        reddit_id    TEXT PRIMARY KEY,
        subreddit    TEXT NOT NULL,
        author       TEXT NOT NULL,
        title        TEXT NOT NULL,
        selftext     TEXT NOT NULL DEFAULT '',
        url          TEXT NOT NULL DEFAULT '',
        permalink    TEXT NOT NULL DEFAULT '',
        score        INTEGER NOT NULL DEFAULT 0,
        num_comments INTEGER NOT NULL DEFAULT 0,
        over_18      INTEGER NOT NULL DEFAULT 0,
        created_utc  INTEGER NOT NULL,
        fetched_at   INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_subreddit ON posts(subreddit)",
    "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(subreddit, created_utc DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        reddit_id   TEXT PRIMARY KEY,
        post_id     TEXT NOT NULL,
        parent_id   TEXT NOT NULL DEFAULT '',
        author      TEXT NOT NULL,
        body        TEXT NOT NULL DEFAULT '',
        score       INTEGER NOT NULL DEFAULT 0,
        depth       INTEGER NOT NULL DEFAULT 0,
        created_utc INTEGER NOT NULL,
        fetched_at  INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post_depth ON comments(post_id, depth)",
];

/// Document store over SQLite. Each collection is keyed by the record's
/// external identifier; writes go through the engine's native upsert so
/// repeating them is safe.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("connected to document store at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed {
                    reason: e.to_string(),
                })?;
        }
        debug!("schema created or verified");
        Ok(())
    }

    /// Inserts the post or, when a document with the same external id
    /// already exists, refreshes only its mutable fields.
    pub async fn upsert_post(&self, post: &Post) -> Result<UpsertOutcome, CoreError> {
        let existing = self.post_exists(&post.reddit_id).await?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                reddit_id, subreddit, author, title, selftext, url, permalink,
                score, num_comments, over_18, created_utc, fetched_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(reddit_id) DO UPDATE SET
                score = excluded.score,
                num_comments = excluded.num_comments,
                selftext = excluded.selftext,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&post.reddit_id)
        .bind(&post.subreddit)
        .bind(&post.author)
        .bind(&post.title)
        .bind(&post.selftext)
        .bind(&post.url)
        .bind(&post.permalink)
        .bind(post.score)
        .bind(post.num_comments)
        .bind(post.over_18)
        .bind(post.created_utc.timestamp())
        .bind(post.fetched_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sql)?;

        Ok(if existing {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Same contract as `upsert_post`, for the comments collection.
    pub async fn upsert_comment(&self, comment: &Comment) -> Result<UpsertOutcome, CoreError> {
        let existing = self.comment_exists(&comment.reddit_id).await?;

        sqlx::query(
            r#"
            INSERT INTO comments (
                reddit_id, post_id, parent_id, author, body,
                score, depth, created_utc, fetched_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(reddit_id) DO UPDATE SET
                score = excluded.score,
                body = excluded.body,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&comment.reddit_id)
        .bind(&comment.post_id)
        .bind(&comment.parent_id)
        .bind(&comment.author)
        .bind(&comment.body)
        .bind(comment.score)
        .bind(comment.depth)
        .bind(comment.created_utc.timestamp())
        .bind(comment.fetched_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sql)?;

        Ok(if existing {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    pub async fn post_exists(&self, reddit_id: &str) -> Result<bool, CoreError> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM posts WHERE reddit_id = ?")
                .bind(reddit_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Sql)?;
        Ok(exists.is_some())
    }

    pub async fn comment_exists(&self, reddit_id: &str) -> Result<bool, CoreError> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM comments WHERE reddit_id = ?")
                .bind(reddit_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Sql)?;
        Ok(exists.is_some())
    }

    pub async fn get_post(&self, reddit_id: &str) -> Result<Option<Post>, CoreError> {
        let row = sqlx::query("SELECT * FROM posts WHERE reddit_id = ?")
            .bind(reddit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sql)?;

        row.map(|row| {
            Ok(Post {
                reddit_id: row.try_get("reddit_id").map_err(StorageError::Sql)?,
                subreddit: row.try_get("subreddit").map_err(StorageError::Sql)?,
                author: row.try_get("author").map_err(StorageError::Sql)?,
                title: row.try_get("title").map_err(StorageError::Sql)?,
                selftext: row.try_get("selftext").map_err(StorageError::Sql)?,
                url: row.try_get("url").map_err(StorageError::Sql)?,
                permalink: row.try_get("permalink").map_err(StorageError::Sql)?,
                score: row.try_get("score").map_err(StorageError::Sql)?,
                num_comments: row.try_get("num_comments").map_err(StorageError::Sql)?,
                over_18: row.try_get("over_18").map_err(StorageError::Sql)?,
                created_utc: datetime_column(&row, "created_utc")?,
                fetched_at: datetime_column(&row, "fetched_at")?,
            })
        })
        .transpose()
    }

    pub async fn get_comment(&self, reddit_id: &str) -> Result<Option<Comment>, CoreError> {
        let row = sqlx::query("SELECT * FROM comments WHERE reddit_id = ?")
            .bind(reddit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sql)?;

        row.map(|row| {
            Ok(Comment {
                reddit_id: row.try_get("reddit_id").map_err(StorageError::Sql)?,
                post_id: row.try_get("post_id").map_err(StorageError::Sql)?,
                parent_id: row.try_get("parent_id").map_err(StorageError::Sql)?,
                author: row.try_get("author").map_err(StorageError::Sql)?,
                body: row.try_get("body").map_err(StorageError::Sql)?,
                score: row.try_get("score").map_err(StorageError::Sql)?,
                depth: row.try_get("depth").map_err(StorageError::Sql)?,
                created_utc: datetime_column(&row, "created_utc")?,
                fetched_at: datetime_column(&row, "fetched_at")?,
            })
        })
        .transpose()
    }

    pub async fn count_posts(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        Ok(count)
    }

    pub async fn count_comments(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sql)?;
        Ok(count)
    }

    pub async fn comment_count_for_post(&self, post_id: &str) -> Result<i64, CoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::Sql)?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("document store connection closed");
    }
}

fn datetime_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>, CoreError> {
    let secs: i64 = row.try_get(column).map_err(StorageError::Sql)?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| {
            StorageError::InvalidColumn {
                column: column.to_string(),
                details: format!("invalid epoch seconds: {secs}"),
            }
            .into()
        })
}
