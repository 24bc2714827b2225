use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors, classified the way the polling loop needs them.
///
/// A UNIQUE constraint violation always surfaces as [`StoreError::Duplicate`],
/// whichever query produced it, because the `From<sqlx::Error>` conversion
/// inspects the database error kind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists
    #[error("Record already exists")]
    Duplicate,

    /// The referenced feed does not exist
    #[error("Feed {0} not found")]
    FeedNotFound(i64),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Any other database failure, including an unreachable database
    #[error("Database error: {0}")]
    Other(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Other(err),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub created_at: i64,
    /// `None` until the scheduler claims the feed for the first time
    pub last_fetched_at: Option<i64>,
}

impl Feed {
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// A stored feed item. Unique per `(feed_id, url)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// `None` when the feed gave no date or an unparseable one
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl Post {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Insert payload for [`Post`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}
