//! Integration tests for the SQLite store through the `FeedStore` seam the
//! scheduler uses: selection order, claiming and post uniqueness.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use feedpoll::storage::{Database, Feed, FeedStore, NewPost, Post, StoreError};
use std::path::PathBuf;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn new_post(feed_id: i64, url: &str) -> NewPost {
    NewPost {
        feed_id,
        title: "Title".to_string(),
        url: url.to_string(),
        description: None,
        published_at: None,
    }
}

/// Selection and claiming only through the trait object.
async fn claim_next(store: &dyn FeedStore) -> Option<i64> {
    let feed = store.claim_next_feed(Utc::now()).await.unwrap()?;
    assert!(feed.last_fetched_at.is_some());
    Some(feed.id)
}

#[tokio::test]
async fn test_claims_rotate_through_all_feeds() {
    let db = test_db().await;
    let a = db.add_feed("A", "https://a.example.com/rss").await.unwrap();
    let b = db.add_feed("B", "https://b.example.com/rss").await.unwrap();
    let c = db.add_feed("C", "https://c.example.com/rss").await.unwrap();

    // Give A an old watermark; B and C have never been fetched
    db.mark_feed_fetched(a.id, Utc::now() - ChronoDuration::hours(1))
        .await
        .unwrap();

    assert_eq!(claim_next(&db).await, Some(b.id));
    assert_eq!(claim_next(&db).await, Some(c.id));
    assert_eq!(claim_next(&db).await, Some(a.id));
}

#[tokio::test]
async fn test_empty_store_selects_nothing() {
    let db = test_db().await;
    assert_eq!(claim_next(&db).await, None);
}

#[tokio::test]
async fn test_claiming_unknown_feed_fails() {
    let db = test_db().await;
    let err = FeedStore::mark_feed_fetched(&db, 404, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::FeedNotFound(404)));
}

#[tokio::test]
async fn test_duplicate_post_reported_through_trait() {
    let db = test_db().await;
    let feed = db.add_feed("A", "https://a.example.com/rss").await.unwrap();
    let store: &dyn FeedStore = &db;

    store
        .create_post(&new_post(feed.id, "https://a.example.com/1"))
        .await
        .unwrap();
    let err = store
        .create_post(&new_post(feed.id, "https://a.example.com/1"))
        .await
        .unwrap_err();

    assert!(err.is_duplicate());
    assert_eq!(db.count_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_feed_url_rejected() {
    let db = test_db().await;
    db.add_feed("A", "https://a.example.com/rss").await.unwrap();
    let err = db
        .add_feed("A again", "https://a.example.com/rss")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate));
}

#[tokio::test]
async fn test_post_for_missing_feed_is_not_a_duplicate() {
    let db = test_db().await;
    let err = db
        .create_post(&new_post(999, "https://nowhere.example.com/1"))
        .await
        .unwrap_err();
    assert!(!err.is_duplicate());
}

#[tokio::test]
async fn test_two_step_default_claim_matches_atomic_claim() {
    struct TwoStep(Database);

    #[async_trait::async_trait]
    impl FeedStore for TwoStep {
        async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
            self.0.next_feed_to_fetch().await
        }
        async fn mark_feed_fetched(
            &self,
            feed_id: i64,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.0.mark_feed_fetched(feed_id, at).await
        }
        async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
            self.0.create_post(post).await
        }
    }

    let store = TwoStep(test_db().await);
    let a = store.0.add_feed("A", "https://a.example.com/rss").await.unwrap();
    let b = store.0.add_feed("B", "https://b.example.com/rss").await.unwrap();

    assert_eq!(claim_next(&store).await, Some(a.id));
    assert_eq!(claim_next(&store).await, Some(b.id));
    assert_eq!(claim_next(&store).await, Some(a.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_across_handles_never_overlap() {
    let dir = std::env::temp_dir().join(format!("feedpoll_store_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path: PathBuf = dir.join("shared.db");
    std::fs::remove_file(&path).ok();
    let path_str = path.to_str().unwrap();

    let first = Database::open(path_str).await.unwrap();
    let second = Database::open(path_str).await.unwrap();

    let mut ids = Vec::new();
    for n in 0..4 {
        let url = format!("https://feed{n}.example.com/rss");
        ids.push(first.add_feed("F", &url).await.unwrap().id);
    }

    // Two claims in flight on each handle at once
    let at = Utc::now();
    let (c1, c2, c3, c4) = tokio::join!(
        first.claim_next_feed(at),
        second.claim_next_feed(at),
        first.claim_next_feed(at),
        second.claim_next_feed(at),
    );
    let mut claimed: Vec<i64> = [c1, c2, c3, c4]
        .into_iter()
        .map(|c| c.unwrap().unwrap().id)
        .collect();
    claimed.sort_unstable();

    assert_eq!(claimed, ids);
    for id in ids {
        let feed = second.get_feed(id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched_at, Some(at.timestamp()));
    }

    first.close().await;
    second.close().await;
    std::fs::remove_dir_all(&dir).ok();
}
