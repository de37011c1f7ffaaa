//! Shared fixtures: a scripted in-process transport and client setup.

#![allow(dead_code)]

use async_trait::async_trait;
use boxoffice_client::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use boxoffice_client::{ApiClient, ClientConfig, CredentialStore};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const BASE_URL: &str = "http://api.boxoffice.test";

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Option<Value>,
    pub raw: Option<(&'static str, &'static str)>,
    pub delay: Duration,
    pub headers: Vec<(&'static str, String)>,
    pub network_error: bool,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
            raw: None,
            delay: Duration::ZERO,
            headers: Vec::new(),
            network_error: false,
        }
    }

    /// A body sent verbatim with the given content type.
    pub fn raw(status: u16, content_type: &'static str, body: &'static str) -> Self {
        Self {
            raw: Some((content_type, body)),
            body: None,
            ..Self::json(status, Value::Null)
        }
    }

    pub fn network() -> Self {
        Self {
            network_error: true,
            ..Self::json(0, Value::Null)
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Replies per `METHOD path`. Each call consumes the next reply; the last one
/// repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: &str, path: &str, replies: Vec<Reply>) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{} {}", method, path), replies.into());
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == method && r.url.path() == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let key = format!("{} {}", request.method, request.url.path());
        self.calls.lock().unwrap().push(request);

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            let queue = routes
                .get_mut(&key)
                .ok_or_else(|| TransportError::Other(format!("no route for {}", key)))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        }
        .ok_or_else(|| TransportError::Other(format!("no replies left for {}", key)))?;

        tokio::time::sleep(reply.delay).await;
        if reply.network_error {
            return Err(TransportError::Other("connection reset by peer".into()));
        }

        let mut headers = HeaderMap::new();
        let body = match (reply.raw, &reply.body) {
            (Some((content_type, raw)), _) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                Bytes::from_static(raw.as_bytes())
            }
            (None, Some(value)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Bytes::from(serde_json::to_vec(value).unwrap())
            }
            (None, None) => Bytes::new(),
        };
        for (name, value) in &reply.headers {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }

        Ok(TransportResponse {
            status: reply.status,
            headers,
            body,
        })
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new(BASE_URL)
        .with_max_retries(2)
        .with_retry_delays(Duration::from_millis(100), Duration::from_secs(5))
}

/// Route crate logs to the test writer; `RUST_LOG=boxoffice_client=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(transport: Arc<ScriptedTransport>) -> ApiClient {
    init_tracing();
    ApiClient::builder()
        .config(test_config())
        .transport(transport)
        .build()
        .unwrap()
}

pub fn client_with_store(
    transport: Arc<ScriptedTransport>,
    store: Arc<CredentialStore>,
    refresher: Arc<dyn boxoffice_client::auth::TokenRefresher>,
) -> ApiClient {
    init_tracing();
    ApiClient::builder()
        .config(test_config())
        .transport(transport)
        .credentials(store)
        .refresher(refresher)
        .build()
        .unwrap()
}
