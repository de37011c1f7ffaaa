use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::request::Method;
use async_trait::async_trait;
use reqwest::Proxy;
use std::env;
use std::time::Duration;

/// reqwest-backed transport.
///
/// Deliberately has no request timeout of its own: the dispatcher races every
/// attempt against its own deadline.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(
                env::var("BOXOFFICE_HTTP_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(10),
            ))
            .pool_max_idle_per_host(
                env::var("BOXOFFICE_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("BOXOFFICE_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client (shared pools, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut req = self.client.request(to_reqwest(request.method), request.url);

        if !request
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("accept"))
        {
            req = req.header("accept", "application/json");
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
