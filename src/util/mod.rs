//! Utility functions for common operations.
//!
//! - **Durations**: compact `"1h30m"`-style parsing for configuration and CLI
//! - **URL validation**: shape checks for feed URLs before they are stored

mod duration;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use url_validator::{validate_feed_url, UrlValidationError};
