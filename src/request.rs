//! Request descriptors.
//!
//! A [`RequestDescriptor`] is the full description of one logical call. It is
//! immutable once handed to the dispatcher; pre-request interceptors receive it
//! by value and return a (possibly modified) copy.

use crate::cancel::CancelHandle;
use crate::error::{Error, ErrorContext};
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether repeating the call is harmless.
///
/// Only idempotent calls take part in dedup preemption, and non-idempotent
/// calls are not retried automatically unless a retry count is set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    idempotency: Idempotency,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    skip_auth: bool,
    retries: Option<u32>,
    timeout: Option<Duration>,
    dedup: bool,
    dedup_key: Option<String>,
    cancel: Option<CancelHandle>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self {
            method,
            path: path.into(),
            idempotency,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            skip_auth: false,
            retries: None,
            timeout: None,
            dedup: true,
            dedup_key: None,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, Idempotency::Idempotent)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path, Idempotency::Idempotent)
    }

    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::Options, path, Idempotency::Idempotent)
    }

    pub fn post(path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self::new(Method::Post, path, idempotency)
    }

    pub fn put(path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self::new(Method::Put, path, idempotency)
    }

    pub fn patch(path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self::new(Method::Patch, path, idempotency)
    }

    pub fn delete(path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self::new(Method::Delete, path, idempotency)
    }

    /// Set a header, replacing any existing value (names compare case-insensitively).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// Add every non-null field of a JSON object as a query parameter.
    pub fn query_object(mut self, params: &Value) -> Self {
        if let Some(map) = params.as_object() {
            for (k, v) in map {
                match v {
                    Value::Null => {}
                    Value::String(s) => self.query.push((k.clone(), s.clone())),
                    other => self.query.push((k.clone(), other.to_string())),
                }
            }
        }
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            Error::configuration(
                "request body is not serializable",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("request_body"),
            )
        })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Do not attach the stored bearer credential.
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.retries = Some(n);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opt out of dedup preemption for this call.
    pub fn no_dedup(mut self) -> Self {
        self.dedup = false;
        self
    }

    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Cancel this call when `handle` fires.
    pub fn cancel_with(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn idempotency(&self) -> Idempotency {
        self.idempotency
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body_value(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn skips_auth(&self) -> bool {
        self.skip_auth
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retries_override(&self) -> Option<u32> {
        self.retries
    }

    /// Retry budget for this call given the configured default.
    pub fn effective_retries(&self, default: u32) -> u32 {
        match (self.retries, self.idempotency) {
            (Some(n), _) => n,
            (None, Idempotency::Idempotent) => default,
            (None, Idempotency::NonIdempotent) => 0,
        }
    }

    pub fn dedup_enabled(&self) -> bool {
        self.dedup && self.idempotency == Idempotency::Idempotent
    }

    /// `METHOD_path` unless overridden, e.g. `GET_/events`.
    pub fn key(&self) -> String {
        self.dedup_key
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.method.as_str(), self.path))
    }

    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel.as_ref()
    }

    /// Resolve against `base`. Absolute `http(s)://` paths are used as-is.
    pub fn resolve_url(&self, base: &Url) -> Result<Url> {
        let raw = if self.path.starts_with("http://") || self.path.starts_with("https://") {
            self.path.clone()
        } else {
            format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        };
        let mut url = Url::parse(&raw).map_err(|e| {
            Error::configuration(
                "invalid request URL",
                ErrorContext::new()
                    .with_field_path(self.path.clone())
                    .with_details(e.to_string())
                    .with_source("request_descriptor"),
            )
        })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}
