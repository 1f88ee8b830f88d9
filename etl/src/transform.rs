use chrono::{DateTime, TimeZone, Utc};
use reddit_client::{RawCommentData, RawPostData};
use redlake_core::{Comment, Post, TransformError};

const DELETED_AUTHOR: &str = "[deleted]";

/// Maps one raw submission record to a normalized post document. Fails
/// only on missing required fields; the caller skips the record and
/// counts the failure.
pub fn post_document(raw: &RawPostData, fetched_at: DateTime<Utc>) -> Result<Post, TransformError> {
    if raw.id.trim().is_empty() {
        return Err(TransformError::MissingField {
            kind: "post",
            field: "id",
        });
    }
    if raw.title.trim().is_empty() {
        return Err(TransformError::MissingField {
            kind: "post",
            field: "title",
        });
    }

    Ok(Post {
        reddit_id: raw.id.clone(),
        subreddit: raw.subreddit.clone(),
        author: author_or_deleted(raw.author.as_deref()),
        title: raw.title.clone(),
        selftext: raw.selftext.clone(),
        url: raw.url.clone(),
        permalink: raw.permalink.clone(),
        score: raw.score,
        num_comments: raw.num_comments,
        over_18: raw.over_18,
        created_utc: epoch_to_datetime(raw.created_utc, "post")?,
        fetched_at,
    })
}

/// Maps one raw comment record to a normalized comment document owned by
/// `post_id`, carrying the nesting level computed during tree flattening.
pub fn comment_document(
    raw: &RawCommentData,
    post_id: &str,
    depth: u32,
    fetched_at: DateTime<Utc>,
) -> Result<Comment, TransformError> {
    if raw.id.trim().is_empty() {
        return Err(TransformError::MissingField {
            kind: "comment",
            field: "id",
        });
    }
    if post_id.trim().is_empty() {
        return Err(TransformError::MissingField {
            kind: "comment",
            field: "post_id",
        });
    }

    Ok(Comment {
        reddit_id: raw.id.clone(),
        post_id: post_id.to_string(),
        parent_id: raw.parent_id.clone(),
        author: author_or_deleted(raw.author.as_deref()),
        body: raw.body.clone(),
        score: raw.score,
        depth: depth as i64,
        created_utc: epoch_to_datetime(raw.created_utc, "comment")?,
        fetched_at,
    })
}

fn author_or_deleted(author: Option<&str>) -> String {
    match author {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => DELETED_AUTHOR.to_string(),
    }
}

fn epoch_to_datetime(epoch: f64, kind: &'static str) -> Result<DateTime<Utc>, TransformError> {
    let secs = epoch as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(TransformError::InvalidTimestamp { kind, value: secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_post() -> RawPostData {
        RawPostData {
            id: "abc123".to_string(),
            title: "A title".to_string(),
            selftext: "text".to_string(),
            author: Some("alice".to_string()),
            subreddit: "rust".to_string(),
            url: "https://example.com".to_string(),
            permalink: "/r/rust/comments/abc123/".to_string(),
            created_utc: 1_700_000_000.0,
            score: 5,
            num_comments: 2,
            ..Default::default()
        }
    }

    #[test]
    fn post_maps_all_fields() {
        let fetched_at = Utc::now();
        let post = post_document(&raw_post(), fetched_at).unwrap();

        assert_eq!(post.reddit_id, "abc123");
        assert_eq!(post.author, "alice");
        assert_eq!(post.score, 5);
        assert_eq!(post.created_utc.timestamp(), 1_700_000_000);
        assert_eq!(post.fetched_at, fetched_at);
    }

    #[test]
    fn post_without_id_is_rejected() {
        let mut raw = raw_post();
        raw.id = String::new();

        let err = post_document(&raw, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingField {
                kind: "post",
                field: "id"
            }
        );
    }

    #[test]
    fn post_without_title_is_rejected() {
        let mut raw = raw_post();
        raw.title = "   ".to_string();

        let err = post_document(&raw, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingField {
                kind: "post",
                field: "title"
            }
        );
    }

    #[test]
    fn absent_author_normalizes_to_deleted() {
        let mut raw = raw_post();
        raw.author = None;
        assert_eq!(post_document(&raw, Utc::now()).unwrap().author, "[deleted]");

        raw.author = Some(String::new());
        assert_eq!(post_document(&raw, Utc::now()).unwrap().author, "[deleted]");
    }

    #[test]
    fn comment_maps_ownership_and_depth() {
        let raw = RawCommentData {
            id: "c1".to_string(),
            author: Some("bob".to_string()),
            body: "reply".to_string(),
            score: 3,
            parent_id: "t1_c0".to_string(),
            link_id: "t3_abc123".to_string(),
            created_utc: 1_700_000_100.0,
            replies: None,
        };

        let comment = comment_document(&raw, "abc123", 2, Utc::now()).unwrap();
        assert_eq!(comment.post_id, "abc123");
        assert_eq!(comment.parent_id, "t1_c0");
        assert_eq!(comment.depth, 2);
    }

    #[test]
    fn comment_without_id_is_rejected() {
        let raw = RawCommentData::default();
        let err = comment_document(&raw, "abc123", 0, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingField {
                kind: "comment",
                field: "id"
            }
        );
    }

    #[test]
    fn unrepresentable_timestamp_is_rejected() {
        let mut raw = raw_post();
        raw.created_utc = f64::MAX;

        let err = post_document(&raw, Utc::now()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidTimestamp { .. }));
    }
}
