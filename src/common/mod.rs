//! Common utilities shared by exchange venues
//!
//! - Rate limiter enforcing a minimum spacing between requests

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
