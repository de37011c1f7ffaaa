use crate::config::ClientConfig;
use crate::credentials::CredentialPair;
use crate::error::{Error, ErrorContext};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Exchanges a refresh token for a new credential pair.
///
/// Implementations must not go through the dispatcher: a refresh that itself
/// fails with 401 would otherwise re-enter the reactor.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair>;
}

/// Refresh over a bare reqwest client: `POST {base_url}{refresh_path}`
/// with `{"refreshToken": ...}`.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl HttpTokenRefresher {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::configuration(
                "failed to build refresh client",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("http_token_refresher"),
            )
        })?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.refresh_path.trim_start_matches('/')
        );
        Self {
            client,
            url,
            timeout: config.timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialPair> {
        debug!(url = %self.url, "refreshing credentials");
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        after: self.timeout,
                    }
                } else {
                    Error::network(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(Error::from_response(status, &headers, &body));
        }

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::validation(format!("malformed refresh response: {}", e)))?;
        let tokens = parse_tokens(value)?;
        Ok(CredentialPair::new(
            tokens.access_token,
            // Servers that do not rotate refresh tokens omit it.
            tokens.refresh_token.or_else(|| Some(refresh_token.to_string())),
        ))
    }
}

/// Accepts both the standard envelope (`{success, data: {...}}`) and a bare
/// token object.
fn parse_tokens(value: Value) -> Result<TokenData> {
    let inner = match value {
        Value::Object(mut map) if map.get("data").map_or(false, Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(inner)
        .map_err(|e| Error::validation(format!("refresh response has no tokens: {}", e)))
}
