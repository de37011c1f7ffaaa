//! Decoded responses and the standard success envelope.

use crate::error::Error;
use crate::Result;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded response body: JSON when the response declares a JSON content
/// type, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn decode(headers: &HeaderMap, bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseBody::Empty);
        }
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_json_content_type)
            .unwrap_or(false);
        if is_json {
            serde_json::from_slice(bytes)
                .map(ResponseBody::Json)
                .map_err(|e| Error::validation(format!("malformed JSON body: {}", e)))
        } else {
            Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The body as a JSON value; text becomes a JSON string, empty becomes null.
    pub fn into_json(self) -> Value {
        match self {
            ResponseBody::Empty => Value::Null,
            ResponseBody::Json(v) => v,
            ResponseBody::Text(s) => Value::String(s),
        }
    }
}

fn is_json_content_type(ct: &str) -> bool {
    let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Transport attempts made for this call.
    pub attempts: u32,
    /// True when an error interceptor produced this response.
    pub recovered: bool,
}

impl ApiResponse {
    pub fn new(status: u16, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
            attempts: 0,
            recovered: false,
        }
    }

    /// A response synthesized by an error interceptor in place of a failure.
    pub fn recovered(body: ResponseBody) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body,
            attempts: 0,
            recovered: true,
        }
    }

    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.body.clone().into_json();
        serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("unexpected response shape: {}", e)))
    }

    pub fn envelope<T: DeserializeOwned>(&self) -> Result<Envelope<T>> {
        self.json()
    }
}

/// Standard success envelope: `{ success, data?, message?, errors?, meta? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Value>,
    pub meta: Option<PageMeta>,
}

impl<T> Envelope<T> {
    /// The payload, or a validation error when the server reported failure
    /// or sent no data.
    pub fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(Error::validation(
                self.message
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| Error::validation("envelope has no data"))
    }
}

/// Pagination metadata carried in `meta`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        h
    }

    #[test]
    fn test_decode_by_content_type() {
        let body = ResponseBody::decode(&json_headers(), br#"{"ok":true}"#).unwrap();
        assert_eq!(body.as_json(), Some(&json!({"ok": true})));

        let body = ResponseBody::decode(&HeaderMap::new(), br#"{"ok":true}"#).unwrap();
        assert_eq!(body.as_text(), Some(r#"{"ok":true}"#));

        let body = ResponseBody::decode(&json_headers(), b"").unwrap();
        assert_eq!(body, ResponseBody::Empty);
    }

    #[test]
    fn test_malformed_json_is_validation() {
        let err = ResponseBody::decode(&json_headers(), b"{not json").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_envelope_with_meta() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Event {
            id: String,
        }
        let resp = ApiResponse::new(
            200,
            json_headers(),
            ResponseBody::Json(json!({
                "success": true,
                "message": "Events retrieved",
                "data": [{"id": "e1"}, {"id": "e2"}],
                "meta": {"page": 1, "limit": 2, "total": 5, "totalPages": 3}
            })),
        );
        let env: Envelope<Vec<Event>> = resp.envelope().unwrap();
        let meta = env.meta.unwrap();
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next());
        assert_eq!(env.into_data().unwrap().len(), 2);
    }

    #[test]
    fn test_envelope_failure() {
        let env: Envelope<Value> =
            serde_json::from_value(json!({"success": false, "message": "Sold out"})).unwrap();
        let err = env.into_data().unwrap_err();
        assert!(err.to_string().contains("Sold out"));
    }
}
