use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{Feed, StoreError};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a new feed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if a feed with the same URL exists.
    pub async fn add_feed(&self, name: &str, url: &str) -> Result<Feed, StoreError> {
        let now = Utc::now().timestamp();
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (name, url, created_at)
            VALUES (?, ?, ?)
            RETURNING id, name, url, created_at, last_fetched_at
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(feed)
    }

    /// All feeds, ordered by name
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT id, name, url, created_at, last_fetched_at FROM feeds ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(
            "SELECT id, name, url, created_at, last_fetched_at FROM feeds WHERE id = ?",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// The feed that has gone longest without a fetch.
    ///
    /// Never-fetched feeds (NULL `last_fetched_at`) come first; ties are
    /// broken by id so selection is deterministic.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, name, url, created_at, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Select the feed [`next_feed_to_fetch`](Self::next_feed_to_fetch)
    /// would return and set its watermark to `at`, in one statement.
    ///
    /// SQLite serializes writers, so two handles on the same file (or two
    /// processes) never claim the same feed for the same slot. The returned
    /// feed carries the new watermark.
    pub async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?
            WHERE id = (
                SELECT id FROM feeds
                ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                LIMIT 1
            )
            RETURNING id, name, url, created_at, last_fetched_at
        "#,
        )
        .bind(at.timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Set the feed's last-fetched watermark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FeedNotFound`] if no feed has this id.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::FeedNotFound(feed_id));
        }
        Ok(())
    }
}
