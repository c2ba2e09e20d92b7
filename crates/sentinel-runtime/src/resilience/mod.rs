//! Resilience patterns for sentinel-runtime.
//!
//! Provider calls retry transient failures with exponential backoff; rate
//! limits are surfaced immediately.

mod retry;

pub use retry::RetryPolicy;
