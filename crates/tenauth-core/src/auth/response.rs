use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

/// Snapshot of a token-exchange response with the partial observability
/// classification works against. Reads never fail; information that is not
/// available comes back as `None`.
///
/// A redirect the HTTP client followed on its own behaves like a browser
/// opaque-redirect: the original status, headers, and body are gone, and
/// only the fact that a redirect happened remains.
#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    status: Option<StatusCode>,
    opaque_redirect: bool,
    headers: HeaderMap,
    body: String,
}

impl ExchangeResponse {
    /// Response with a readable status and, until set, no headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            opaque_redirect: false,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// Response whose redirect was consumed before we could observe it.
    pub fn opaque_redirect() -> Self {
        Self {
            status: None,
            opaque_redirect: true,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Capture a live response. `requested` is the URL the request was sent
    /// to; a response reporting a different URL means the client followed a
    /// redirect, which is recorded as opaque.
    pub async fn from_response(requested: &Url, response: reqwest::Response) -> Self {
        if response.url() != requested {
            return Self::opaque_redirect();
        }
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Self {
            status: Some(status),
            opaque_redirect: false,
            headers,
            body,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_opaque_redirect(&self) -> bool {
        self.opaque_redirect
    }

    pub fn is_success(&self) -> bool {
        self.status.map(|status| status.is_success()).unwrap_or(false)
    }

    /// Header value, if present and representable as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Body parsed as JSON, if there is one and it parses.
    pub fn json_body(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}
