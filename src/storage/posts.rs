use chrono::Utc;

use super::schema::Database;
use super::types::{NewPost, Post, StoreError};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the feed already has a post with
    /// this URL. The existing row is left untouched.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let now = Utc::now().timestamp();
        let stored = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, url, description, published_at, created_at
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Most recent posts across all feeds, newest publish date first.
    /// Undated posts sort last.
    pub async fn recent_posts(&self, limit: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            ORDER BY published_at DESC NULLS LAST, id DESC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC NULLS LAST, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn count_posts(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewPost, StoreError};
    use pretty_assertions::assert_eq;

    async fn test_db_with_feed() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let feed = db
            .add_feed("Test Feed", "https://example.com/rss")
            .await
            .unwrap();
        (db, feed.id)
    }

    fn test_post(feed_id: i64, slug: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post {}", slug),
            url: format!("https://example.com/{}", slug),
            description: Some("Test description".to_string()),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_post_round_trip() {
        let (db, feed_id) = test_db_with_feed().await;
        let new = test_post(feed_id, "a", Some(1704067200));

        let stored = db.create_post(&new).await.unwrap();
        assert_eq!(stored.feed_id, feed_id);
        assert_eq!(stored.title, new.title);
        assert_eq!(stored.url, new.url);
        assert_eq!(stored.description, new.description);
        assert_eq!(stored.published_at, Some(1704067200));
        assert_eq!(stored.published().map(|t| t.timestamp()), Some(1704067200));
    }

    #[tokio::test]
    async fn test_duplicate_post_rejected() {
        let (db, feed_id) = test_db_with_feed().await;
        db.create_post(&test_post(feed_id, "a", None)).await.unwrap();

        let err = db
            .create_post(&test_post(feed_id, "a", Some(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_url_in_different_feeds_allowed() {
        let (db, feed_id) = test_db_with_feed().await;
        let other = db
            .add_feed("Other", "https://other.example.com/rss")
            .await
            .unwrap();

        db.create_post(&test_post(feed_id, "shared", None))
            .await
            .unwrap();
        db.create_post(&test_post(other.id, "shared", None))
            .await
            .unwrap();
        assert_eq!(db.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_post_for_unknown_feed_is_not_duplicate() {
        let (db, _) = test_db_with_feed().await;
        let err = db
            .create_post(&test_post(999, "orphan", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));
    }

    #[tokio::test]
    async fn test_recent_posts_ordering_and_limit() {
        let (db, feed_id) = test_db_with_feed().await;
        db.create_post(&test_post(feed_id, "undated", None))
            .await
            .unwrap();
        db.create_post(&test_post(feed_id, "old", Some(1_000)))
            .await
            .unwrap();
        db.create_post(&test_post(feed_id, "new", Some(2_000)))
            .await
            .unwrap();

        let urls: Vec<_> = db
            .recent_posts(10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/new",
                "https://example.com/old",
                "https://example.com/undated",
            ]
        );

        assert_eq!(db.recent_posts(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_posts_for_feed_filters() {
        let (db, feed_id) = test_db_with_feed().await;
        let other = db
            .add_feed("Other", "https://other.example.com/rss")
            .await
            .unwrap();
        db.create_post(&test_post(feed_id, "mine", None))
            .await
            .unwrap();
        db.create_post(&test_post(other.id, "theirs", None))
            .await
            .unwrap();

        let posts = db.posts_for_feed(feed_id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://example.com/mine");
    }
}
