use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = "tenauth/0.1.0";

/// Errors returned by the dashboard client.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unauthorized, please log in again")]
    Unauthorized,
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("dashboard request failed: {0}")]
    Transport(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;

/// Client for the protected dashboard endpoint. The payload is opaque
/// JSON; authentication rides on the session cookies minted during the
/// token exchange, so the client sharing those cookies is all that is
/// needed.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: Client,
    endpoint: Url,
}

impl DashboardClient {
    pub fn new(endpoint: Url) -> DashboardResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(Self { http, endpoint })
    }

    /// Build around an existing HTTP client, usually one sharing the
    /// cookie jar that received the session cookies.
    pub fn with_http_client(endpoint: Url, http: Client) -> Self {
        Self { http, endpoint }
    }

    /// Fetch the dashboard payload.
    pub async fn fetch(&self) -> DashboardResult<Value> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|err| {
                DashboardError::Transport(format!(
                    "could not load the dashboard from {}; check that the backend \
                     is running ({err})",
                    self.endpoint
                ))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DashboardError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DashboardError::HttpStatus { status, body });
        }

        Ok(response.json::<Value>().await?)
    }
}
