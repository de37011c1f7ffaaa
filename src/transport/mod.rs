//! HTTP transport capability.
//!
//! The dispatcher only needs "send this request, give me status, headers and
//! body bytes". [`HttpTransport`] does that over reqwest; tests and embedders
//! can supply their own [`Transport`].

mod http;

pub use http::HttpTransport;

use crate::request::Method;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request and read the full body.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
