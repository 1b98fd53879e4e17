//! Background tasks owned by the application lifecycle

mod retry;

pub use retry::{RetryConfig, RetryScheduler, SweepSummary};
