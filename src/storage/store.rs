use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{Feed, NewPost, Post, StoreError};

/// The persistence operations the polling scheduler depends on.
///
/// Implementations must enforce post uniqueness themselves and report a
/// violation as [`StoreError::Duplicate`]; the scheduler does no client-side
/// locking and relies on this for safety across processes.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest `last_fetched_at` (never-fetched first), if any.
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError>;

    async fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError>;

    /// Select the next feed and set its watermark to `at` before anyone else
    /// can select it.
    ///
    /// The default runs the two steps back to back, which is only safe for a
    /// store with a single scheduler. Stores shared between processes
    /// override it with an atomic operation.
    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, StoreError> {
        let Some(mut feed) = self.next_feed_to_fetch().await? else {
            return Ok(None);
        };
        self.mark_feed_fetched(feed.id, at).await?;
        feed.last_fetched_at = Some(at.timestamp());
        Ok(Some(feed))
    }
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        Database::mark_feed_fetched(self, feed_id, at).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        Database::create_post(self, post).await
    }

    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, StoreError> {
        Database::claim_next_feed(self, at).await
    }
}

#[async_trait]
impl<T: FeedStore + ?Sized> FeedStore for std::sync::Arc<T> {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        (**self).next_feed_to_fetch().await
    }

    async fn mark_feed_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).mark_feed_fetched(feed_id, at).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        (**self).create_post(post).await
    }

    async fn claim_next_feed(&self, at: DateTime<Utc>) -> Result<Option<Feed>, StoreError> {
        (**self).claim_next_feed(at).await
    }
}
