//! 弹性模块：指数退避与重试决策。
//!
//! # Resilience Module
//!
//! Retry and backoff decisions shared by the request dispatcher and the
//! realtime channel.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`backoff`] | Exponential delay with bounded jitter and a cap |
//! | [`retry`] | Which failures are retried, and for how long to wait |
//!
//! Both are pure with respect to their inputs (jitter aside, and jitter can be
//! passed explicitly), so they are tested without a runtime:
//!
//! ```rust
//! use boxoffice_client::resilience::backoff::Backoff;
//! use std::time::Duration;
//!
//! let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));
//! assert_eq!(backoff.delay_with_jitter(1, Duration::ZERO), Duration::from_millis(200));
//! assert_eq!(backoff.delay_with_jitter(2, Duration::ZERO), Duration::from_millis(400));
//! ```

pub mod backoff;
pub mod retry;

pub use backoff::Backoff;
pub use retry::{Decision, RetryPolicy};
