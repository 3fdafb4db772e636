//! Failure isolation around provider calls.
//!
//! The two pieces compose rather than nest: the manager runs
//! `breaker.execute(|| retry::execute(policy, ..))`, so one exhausted retry
//! loop counts as one breaker failure.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, spawn_breaker_monitor};
pub use retry::{AttemptRecord, BackoffSchedule, RetryFailure, RetryPolicy, RetrySuccess};
