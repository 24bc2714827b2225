use crate::feed::dates;
use crate::feed::fetcher::{DocumentFetcher, FetchError};
use crate::feed::parser::{parse_document, ParseError, ParsedItem};
use crate::shutdown::Shutdown;
use crate::storage::{Feed, FeedStore, NewPost, StoreError};
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const UNTITLED: &str = "Untitled";

/// Smallest accepted tick period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Where the scheduler is within a polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Selecting,
    Fetching,
    Parsing,
    Persisting,
    /// Terminal: the shutdown signal was observed
    Stopped,
}

/// Per-item tallies for one successfully fetched feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    /// Items in the parsed document
    pub items: usize,
    /// Posts newly stored
    pub saved: usize,
    /// Items already stored by an earlier cycle
    pub duplicates: usize,
    /// Items the store rejected for any other reason
    pub failed: usize,
    /// Items without a link, which cannot become posts
    pub skipped: usize,
    /// Stored items whose publish date was missing or unparseable
    pub undated: usize,
}

/// Result of one polling cycle. Every variant except `Cancelled` lets the
/// loop carry on at the next tick.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No feeds are registered
    NoFeeds,
    Completed(CycleReport),
    /// Selecting or claiming the next feed failed, so nothing was fetched;
    /// the store may be unreachable
    StoreUnavailable(StoreError),
    FetchFailed { feed_id: i64, error: FetchError },
    Malformed { feed_id: i64, error: ParseError },
    /// Shutdown fired while the fetch was in flight
    Cancelled { feed_id: i64 },
}

/// Polls feeds one at a time, least recently fetched first.
///
/// Each cycle claims a feed by advancing its `last_fetched_at` watermark
/// before fetching it, so a slow or failing feed is not picked again on the
/// next tick and concurrent schedulers sharing a store do not double-fetch.
pub struct Scheduler<S> {
    store: S,
    fetcher: DocumentFetcher,
    interval: Duration,
    state: SchedulerState,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: DocumentFetcher, interval: Duration) -> Self {
        Self {
            store,
            fetcher,
            interval: interval.max(MIN_INTERVAL),
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// The first cycle starts immediately; later ones start on each tick of
    /// a fixed-period timer. A tick that falls due while a cycle is still
    /// running is delayed rather than bursted. Shutdown interrupts the tick
    /// wait or an in-flight fetch, never a persist pass.
    ///
    /// Always returns [`SchedulerState::Stopped`].
    pub async fn run(&mut self, mut shutdown: Shutdown) -> SchedulerState {
        tracing::info!(interval = ?self.interval, "Starting feed scheduler");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                // The first tick completes immediately
                _ = ticker.tick() => {}
            }

            if let CycleOutcome::Cancelled { .. } = self.run_cycle(&mut shutdown).await {
                break;
            }
        }

        self.set_state(SchedulerState::Stopped);
        tracing::info!("Feed scheduler stopped");
        SchedulerState::Stopped
    }

    /// Select, claim, fetch, parse and persist one feed.
    pub async fn run_cycle(&mut self, shutdown: &mut Shutdown) -> CycleOutcome {
        let outcome = self.cycle(shutdown).await;
        if !matches!(outcome, CycleOutcome::Cancelled { .. }) {
            self.set_state(SchedulerState::Idle);
        }
        log_outcome(&outcome);
        outcome
    }

    async fn cycle(&mut self, shutdown: &mut Shutdown) -> CycleOutcome {
        self.set_state(SchedulerState::Selecting);
        let feed = match self.store.claim_next_feed(Utc::now()).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return CycleOutcome::NoFeeds,
            Err(error) => return CycleOutcome::StoreUnavailable(error),
        };

        self.set_state(SchedulerState::Fetching);
        tracing::debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");
        let bytes = match self.fetcher.fetch(&feed.url, shutdown).await {
            Ok(bytes) => bytes,
            Err(FetchError::Cancelled) => return CycleOutcome::Cancelled { feed_id: feed.id },
            Err(error) => {
                return CycleOutcome::FetchFailed {
                    feed_id: feed.id,
                    error,
                }
            }
        };

        self.set_state(SchedulerState::Parsing);
        let document = match parse_document(&bytes) {
            Ok(document) => document,
            Err(error) => {
                return CycleOutcome::Malformed {
                    feed_id: feed.id,
                    error,
                }
            }
        };

        self.set_state(SchedulerState::Persisting);
        CycleOutcome::Completed(self.persist(&feed, document.items).await)
    }

    async fn persist(&self, feed: &Feed, items: Vec<ParsedItem>) -> CycleReport {
        let mut report = CycleReport {
            feed_id: feed.id,
            items: items.len(),
            ..CycleReport::default()
        };

        for item in items {
            let Some(url) = item.link else {
                tracing::debug!(feed_id = feed.id, title = %item.title, "Skipping item without link");
                report.skipped += 1;
                continue;
            };

            let published_at = match item.pub_date.as_deref().map(dates::parse) {
                Some(Ok(published)) => Some(published.timestamp()),
                Some(Err(e)) => {
                    tracing::debug!(feed_id = feed.id, url = %url, error = %e, "Unparseable pubDate, storing undated");
                    None
                }
                None => None,
            };

            let title = if item.title.trim().is_empty() {
                UNTITLED.to_string()
            } else {
                item.title
            };

            let post = NewPost {
                feed_id: feed.id,
                title,
                url,
                description: item.description,
                published_at,
            };

            match self.store.create_post(&post).await {
                Ok(_) => {
                    report.saved += 1;
                    if published_at.is_none() {
                        report.undated += 1;
                    }
                }
                Err(StoreError::Duplicate) => {
                    tracing::trace!(feed_id = feed.id, url = %post.url, "Post already stored");
                    report.duplicates += 1;
                }
                Err(e) => {
                    tracing::warn!(feed_id = feed.id, url = %post.url, error = %e, "Failed to store post");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn set_state(&mut self, state: SchedulerState) {
        tracing::trace!(from = ?self.state, to = ?state, "Scheduler state change");
        self.state = state;
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::NoFeeds => tracing::debug!("No feeds registered, waiting for next tick"),
        CycleOutcome::Completed(report) => tracing::info!(
            feed_id = report.feed_id,
            items = report.items,
            saved = report.saved,
            duplicates = report.duplicates,
            failed = report.failed,
            skipped = report.skipped,
            "Feed refreshed"
        ),
        CycleOutcome::StoreUnavailable(error) => {
            tracing::error!(error = %error, "Could not claim next feed, store unavailable")
        }
        CycleOutcome::FetchFailed { feed_id, error } => {
            tracing::warn!(feed_id = feed_id, error = %error, "Feed fetch failed, will retry on its next turn")
        }
        CycleOutcome::Malformed { feed_id, error } => {
            tracing::warn!(feed_id = feed_id, error = %error, "Feed document is malformed")
        }
        CycleOutcome::Cancelled { feed_id } => {
            tracing::info!(feed_id = feed_id, "Fetch cancelled by shutdown")
        }
    }
}
