//! Transformer and writer working together, the way the pipeline drives
//! them: raw wire records in, deduplicated documents out.

use chrono::{TimeZone, Utc};
use database::{Storage, UpsertOutcome};
use etl::transform;
use reddit_client::{flatten_comment_tree, RawCommentData, RawPostData, RedditListing};
use redlake_core::TransformError;
use serde_json::json;

async fn setup_test_db() -> Storage {
    let db_path = std::env::temp_dir().join(format!("redlake_etl_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());

    let storage = Storage::connect(&db_url).await.unwrap();
    storage.run_migrations().await.unwrap();
    storage
}

fn raw_post(id: &str, score: i64) -> RawPostData {
    RawPostData {
        id: id.to_string(),
        title: "Stable identifiers considered useful".to_string(),
        selftext: "original body".to_string(),
        author: Some("alice".to_string()),
        subreddit: "test".to_string(),
        url: format!("https://example.com/{id}"),
        permalink: format!("/r/test/comments/{id}/"),
        created_utc: 1_700_000_000.0,
        score,
        num_comments: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn ingesting_the_same_records_twice_stores_them_once() {
    let storage = setup_test_db().await;
    let fetched_at = Utc.timestamp_opt(1_700_000_500, 0).unwrap();

    // Two runs over the same two-record feed.
    for _run in 0..2 {
        for raw in [raw_post("p1", 10), raw_post("p2", 20)] {
            let post = transform::post_document(&raw, fetched_at).unwrap();
            storage.upsert_post(&post).await.unwrap();
        }
    }

    assert_eq!(storage.count_posts().await.unwrap(), 2);
}

#[tokio::test]
async fn second_run_refreshes_mutable_fields_only() {
    let storage = setup_test_db().await;
    let fetched_at = Utc.timestamp_opt(1_700_000_500, 0).unwrap();

    let first = transform::post_document(&raw_post("p1", 10), fetched_at).unwrap();
    assert_eq!(
        storage.upsert_post(&first).await.unwrap(),
        UpsertOutcome::Inserted
    );

    // The score moved between runs; everything immutable stayed put.
    let later = Utc.timestamp_opt(1_700_001_000, 0).unwrap();
    let mut raw = raw_post("p1", 55);
    raw.selftext = "edited body".to_string();
    let second = transform::post_document(&raw, later).unwrap();
    assert_eq!(
        storage.upsert_post(&second).await.unwrap(),
        UpsertOutcome::Updated
    );

    let stored = storage.get_post("p1").await.unwrap().unwrap();
    assert_eq!(stored.score, 55);
    assert_eq!(stored.selftext, "edited body");
    assert_eq!(stored.fetched_at, later);
    assert_eq!(stored.title, first.title);
    assert_eq!(stored.created_utc, first.created_utc);
    assert_eq!(storage.count_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn malformed_record_is_skipped_and_never_stored() {
    let storage = setup_test_db().await;

    let mut raw = raw_post("p1", 10);
    raw.title = String::new();

    let err = transform::post_document(&raw, Utc::now()).unwrap_err();
    assert!(matches!(err, TransformError::MissingField { .. }));
    assert_eq!(storage.count_posts().await.unwrap(), 0);
}

#[tokio::test]
async fn comment_tree_lands_under_its_parent_post() {
    let storage = setup_test_db().await;
    let fetched_at = Utc.timestamp_opt(1_700_000_500, 0).unwrap();

    let post = transform::post_document(&raw_post("p1", 10), fetched_at).unwrap();
    storage.upsert_post(&post).await.unwrap();

    let listing: RedditListing<RawCommentData> = serde_json::from_value(json!({
        "kind": "Listing",
        "data": {
            "children": [
                {
                    "kind": "t1",
                    "data": {
                        "id": "c1",
                        "author": "bob",
                        "body": "top",
                        "score": 2,
                        "parent_id": "t3_p1",
                        "link_id": "t3_p1",
                        "created_utc": 1700000100.0,
                        "replies": {
                            "kind": "Listing",
                            "data": {
                                "children": [
                                    {
                                        "kind": "t1",
                                        "data": {
                                            "id": "c2",
                                            "author": "carol",
                                            "body": "nested",
                                            "score": 1,
                                            "parent_id": "t1_c1",
                                            "link_id": "t3_p1",
                                            "created_utc": 1700000200.0,
                                            "replies": ""
                                        }
                                    }
                                ]
                            }
                        }
                    }
                }
            ]
        }
    }))
    .unwrap();

    for (raw, depth) in flatten_comment_tree(listing, None) {
        let comment = transform::comment_document(&raw, "p1", depth, fetched_at).unwrap();
        storage.upsert_comment(&comment).await.unwrap();
    }

    assert_eq!(storage.comment_count_for_post("p1").await.unwrap(), 2);
    let nested = storage.get_comment("c2").await.unwrap().unwrap();
    assert_eq!(nested.post_id, "p1");
    assert_eq!(nested.depth, 1);
    assert_eq!(nested.parent_id, "t1_c1");
}
