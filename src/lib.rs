//! # boxoffice-client
//!
//! 票务商城的弹性请求层：去重、重试、取消、拦截器与凭证刷新。
//!
//! Resilient request layer for a ticketing storefront backend. Every call goes
//! through one dispatcher that deduplicates concurrent identical reads,
//! retries transient failures with backoff, races each attempt against a
//! timeout and cooperative cancellation, and runs an interceptor pipeline so
//! cross-cutting concerns (logging, bearer injection, 401 recovery) compose
//! without call sites knowing about them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boxoffice_client::{ApiClient, ClientConfig, CredentialStore, Envelope, RequestDescriptor};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> boxoffice_client::Result<()> {
//!     let client = ApiClient::builder()
//!         .config(ClientConfig::from_env()?)
//!         .credentials(Arc::new(CredentialStore::in_memory()))
//!         .logging(true)
//!         .build()?;
//!
//!     let events: Envelope<Vec<Value>> = client
//!         .send_envelope(RequestDescriptor::get("/events").query("page", 1))
//!         .await?;
//!     if let Some(meta) = events.meta {
//!         println!("page {} of {}", meta.page, meta.total_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | The dispatcher ([`ApiClient`]) and its builder |
//! | [`request`] | Request descriptors, methods and idempotency |
//! | [`response`] | Decoded bodies and the success envelope |
//! | [`error`] | Classified errors and field-error parsing |
//! | [`interceptors`] | Pre-request, post-response and on-error chains |
//! | [`registry`] | In-flight calls, dedup preemption, bulk cancellation |
//! | [`cancel`] | Cooperative cancellation handles |
//! | [`resilience`] | Backoff and retry decisions |
//! | [`credentials`] | Dual-backend credential store |
//! | [`auth`] | Single-flight credential refresh on 401 |
//! | [`transport`] | HTTP transport capability |
//! | [`realtime`] | Reconnecting push channel |
//! | [`config`] | Client configuration from env and YAML |

pub mod auth;
pub mod cancel;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod interceptors;
pub mod realtime;
pub mod registry;
pub mod request;
pub mod resilience;
pub mod response;
pub mod transport;

pub use auth::{AuthRefreshReactor, RefreshOutcome, RefreshState};
pub use cancel::{CancelHandle, CancelReason};
pub use client::{ApiClient, ApiClientBuilder, SignalsSnapshot};
pub use config::{ClientConfig, RealtimeConfig, RetryConfig};
pub use credentials::{CredentialPair, CredentialStore};
pub use error::{Error, ErrorContext, ErrorKind, FieldErrors};
pub use interceptors::{
    ErrorInterceptor, InterceptorHandle, InterceptorPipeline, RequestInterceptor,
    ResponseInterceptor,
};
pub use realtime::{ChannelState, RealtimeClient, RealtimeMessage};
pub use request::{Idempotency, Method, RequestDescriptor};
pub use response::{ApiResponse, Envelope, PageMeta, ResponseBody};

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;
