//! HTTP adapter for the canvas service.
//!
//! Every operation returns the raw outcome (status, content type, body) and
//! leaves interpretation to the tool layer. Transport failures, timeouts
//! included, surface as [`CanvasError::Connection`].

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::util::{client, parse_response_body};

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("connection to {base_url} failed: {detail}")]
    Connection { base_url: String, detail: String },
    #[error("invalid canvas URL: {0}")]
    InvalidUrl(String),
    #[error("failed to read canvas response body: {0}")]
    Body(String),
    #[error("unexpected canvas payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ApiCallResult {
    pub status: u16,
    pub content_type: String,
    pub text: String,
    pub body: Value,
}

impl ApiCallResult {
    /// The canvas service signals success with exactly 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }

    /// `message` field of a JSON body, if any.
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

/// Current canvas contents as returned by `GET /canvas`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasSnapshot {
    pub elements: Vec<Value>,
    pub app_state: Map<String, Value>,
    pub files: Map<String, Value>,
    pub updated_at: Option<Value>,
}

#[derive(Deserialize)]
struct CanvasEnvelope {
    #[serde(default)]
    canvas: Option<RawCanvas>,
}

#[derive(Deserialize)]
struct RawCanvas {
    #[serde(default)]
    elements: Option<Vec<Value>>,
    #[serde(default, rename = "appState")]
    app_state: Option<Map<String, Value>>,
    #[serde(default)]
    files: Option<Map<String, Value>>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl CanvasSnapshot {
    /// Decode a `{"canvas": {...}}` body. Missing or `null` parts read as empty.
    pub fn from_body(body: &Value) -> Result<Self, CanvasError> {
        let envelope = CanvasEnvelope::deserialize(body)?;
        let Some(raw) = envelope.canvas else {
            return Ok(Self::default());
        };
        Ok(Self {
            elements: raw.elements.unwrap_or_default(),
            app_state: raw.app_state.unwrap_or_default(),
            files: raw.files.unwrap_or_default(),
            updated_at: raw.updated_at.filter(|v| !v.is_null()),
        })
    }

    pub fn find_element(&self, element_id: &str) -> Option<&Value> {
        self.elements
            .iter()
            .find(|element| element.get("id").and_then(Value::as_str) == Some(element_id))
    }

    /// Body for `PUT /canvas`.
    pub fn to_payload(&self) -> Value {
        json!({
            "elements": self.elements,
            "appState": self.app_state,
            "files": self.files,
        })
    }
}

/// One client per process. The connection pool is released when this value
/// is dropped.
#[derive(Debug)]
pub struct CanvasClient {
    base_url: Url,
    http: reqwest::Client,
}

impl CanvasClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CanvasError> {
        let base_url =
            Url::parse(base_url).map_err(|e| CanvasError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CanvasError::InvalidUrl(base_url.to_string()));
        }
        let http = client(timeout).map_err(|e| CanvasError::Connection {
            base_url: base_url.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub async fn health(&self) -> Result<ApiCallResult, CanvasError> {
        self.send(Method::GET, &["health"], &[], None).await
    }

    pub async fn get_canvas(&self) -> Result<ApiCallResult, CanvasError> {
        self.send(Method::GET, &["canvas"], &[], None).await
    }

    pub async fn put_canvas(&self, payload: &Value) -> Result<ApiCallResult, CanvasError> {
        self.send(Method::PUT, &["canvas"], &[], Some(payload)).await
    }

    pub async fn clear_canvas(&self) -> Result<ApiCallResult, CanvasError> {
        self.send(Method::POST, &["canvas", "clear"], &[], None).await
    }

    pub async fn export_canvas(
        &self,
        width: u64,
        height: u64,
    ) -> Result<ApiCallResult, CanvasError> {
        let query = [
            ("format", "toDataURL".to_string()),
            ("width", width.to_string()),
            ("height", height.to_string()),
        ];
        self.send(Method::GET, &["canvas", "export"], &query, None).await
    }

    pub async fn delete_element(&self, element_id: &str) -> Result<ApiCallResult, CanvasError> {
        self.send(Method::DELETE, &["canvas", "element", element_id], &[], None)
            .await
    }

    pub async fn update_element(
        &self,
        element_id: &str,
        element: &Value,
    ) -> Result<ApiCallResult, CanvasError> {
        let payload = json!({ "element": element });
        self.send(
            Method::PUT,
            &["canvas", "element", element_id],
            &[],
            Some(&payload),
        )
        .await
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, CanvasError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CanvasError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ApiCallResult, CanvasError> {
        let url = self.url(segments, query)?;
        debug!(method = %method, path = url.path(), "canvas request");

        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| CanvasError::Connection {
            base_url: self.base_url.to_string(),
            detail: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CanvasError::Body(e.to_string()))?;
        debug!(method = %method, status, "canvas response");

        Ok(ApiCallResult {
            status,
            content_type,
            text: String::from_utf8_lossy(&bytes).to_string(),
            body: parse_response_body(&bytes),
        })
    }
}

impl Drop for CanvasClient {
    fn drop(&mut self) {
        debug!(base_url = %self.base_url, "canvas client released");
    }
}
