//! Request dispatcher.
//!
//! [`ApiClient`] orchestrates one logical call: pre-request interceptors, URL
//! resolution, dedup preemption through the in-flight registry, the transport
//! call raced against its timeout and cancellation, retry with backoff, and
//! finally the post-response or on-error chain.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod execution;
pub mod signals;

pub use builder::ApiClientBuilder;
pub use core::ApiClient;
pub use signals::SignalsSnapshot;
