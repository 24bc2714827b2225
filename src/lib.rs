//! feedpoll: polls registered RSS feeds on a fixed cadence and stores new
//! posts in SQLite.
//!
//! The [`feed::Scheduler`] picks the least recently fetched feed each tick,
//! fetches it through a [`feed::DocumentFetcher`] (optionally backed by an
//! [`cache::ExpiringCache`]), parses the document and persists its items via
//! a [`storage::FeedStore`].

pub mod cache;
pub mod config;
pub mod feed;
pub mod shutdown;
pub mod storage;
pub mod util;
