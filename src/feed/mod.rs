//! Feed polling: fetching, parsing and the scheduler that drives them.
//!
//! - **Fetching**: HTTP retrieval with a per-request deadline, a body size
//!   cap and an optional short-lived response cache
//! - **Parsing**: RSS 2.0 documents into channel metadata and items
//! - **Dates**: best-effort `pubDate` resolution across the layouts seen in
//!   the wild
//! - **Scheduling**: one feed per tick, least recently fetched first
//!
//! # Example
//!
//! ```ignore
//! use feedpoll::feed::{DocumentFetcher, FetcherConfig, Scheduler};
//!
//! let fetcher = DocumentFetcher::new(&FetcherConfig::default())?;
//! let mut scheduler = Scheduler::new(db, fetcher, Duration::from_secs(60));
//! scheduler.run(shutdown).await;
//! ```

pub mod dates;
mod fetcher;
mod parser;
mod scheduler;

pub use fetcher::{DocumentFetcher, FetchError, FetcherConfig};
pub use parser::{parse_document, unescape_entities, ParseError, ParsedDocument, ParsedItem};
pub use scheduler::{CycleOutcome, CycleReport, Scheduler, SchedulerState};
