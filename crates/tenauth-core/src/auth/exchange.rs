use std::sync::Arc;
use std::time::Duration as StdDuration;

use reqwest::{redirect, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::config::{AuthConfig, BackendEndpoints, DASHBOARD_PATH, TENANT_MISMATCH_PATH};

use super::{AuthError, EphemeralStore, ExchangeResponse, NavigationSink, VERIFIER_KEY};

const DEFAULT_USER_AGENT: &str = "tenauth/0.1.0";

/// Result of one token exchange attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The backend accepted the code and set session cookies.
    Success,
    /// The backend reports the user holds a session with a different
    /// tenant. Either URL may be missing when the backend's redirect could
    /// not be read; recovery then degrades to returning home.
    TenantMismatch {
        logout_url: Option<String>,
        fresh_login_url: Option<String>,
    },
    /// The backend rejected the exchange outright.
    Failure { status: StatusCode, message: String },
}

/// Classify a token-exchange response. Total over every combination of
/// status, redirect opacity, headers, and body.
///
/// The JSON body probe runs before header extraction: an opaque-redirect
/// response exposes neither status nor headers, so a readable 401 body is
/// the most reliable mismatch signal and headers are consulted only after
/// it yields nothing.
pub fn classify(response: &ExchangeResponse) -> ExchangeOutcome {
    let status = response.status();
    let unauthorized = status == Some(StatusCode::UNAUTHORIZED);
    let mismatch_signalled =
        unauthorized || status == Some(StatusCode::FOUND) || response.is_opaque_redirect();

    if unauthorized {
        if let Some(body) = response.json_body() {
            if let Some(logout_url) = body
                .get("logoutUrl")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                return ExchangeOutcome::TenantMismatch {
                    logout_url: Some(logout_url.to_owned()),
                    fresh_login_url: None,
                };
            }
        }
    }

    if mismatch_signalled {
        if let Some(location) = response.header("location") {
            let (logout_url, fresh_login_url) = mismatch_urls_from_location(location);
            return ExchangeOutcome::TenantMismatch {
                logout_url,
                fresh_login_url,
            };
        }
        return ExchangeOutcome::TenantMismatch {
            logout_url: None,
            fresh_login_url: None,
        };
    }

    match status {
        Some(code) if !code.is_success() => ExchangeOutcome::Failure {
            status: code,
            message: code.canonical_reason().unwrap_or("unknown status").to_owned(),
        },
        _ => ExchangeOutcome::Success,
    }
}

/// Pull `logoutUrl` and `freshLoginUrl` out of a Location header value.
/// Location may be relative; when it does not parse as an absolute URL the
/// query string after `?` is split directly.
fn mismatch_urls_from_location(location: &str) -> (Option<String>, Option<String>) {
    let mut logout_url = None;
    let mut fresh_login_url = None;
    match Url::parse(location) {
        Ok(url) => {
            for (name, value) in url.query_pairs() {
                assign_mismatch_url(&name, &value, &mut logout_url, &mut fresh_login_url);
            }
        }
        Err(_) => {
            if let Some((_, query)) = location.split_once('?') {
                for (name, value) in form_urlencoded::parse(query.as_bytes()) {
                    assign_mismatch_url(&name, &value, &mut logout_url, &mut fresh_login_url);
                }
            }
        }
    }
    (logout_url, fresh_login_url)
}

fn assign_mismatch_url(
    name: &str,
    value: &str,
    logout_url: &mut Option<String>,
    fresh_login_url: &mut Option<String>,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    match name {
        "logoutUrl" => *logout_url = Some(value.to_owned()),
        "freshLoginUrl" => *fresh_login_url = Some(value.to_owned()),
        _ => {}
    }
}

/// Exchanges an authorization code for backend session cookies and routes
/// the user according to the outcome.
pub struct TokenExchangeResolver<S, N> {
    config: AuthConfig,
    endpoints: BackendEndpoints,
    http: Client,
    store: Arc<S>,
    navigator: Arc<N>,
}

impl<S, N> TokenExchangeResolver<S, N>
where
    S: EphemeralStore,
    N: NavigationSink,
{
    pub fn new(config: AuthConfig, store: Arc<S>, navigator: Arc<N>) -> Result<Self, AuthError> {
        let endpoints = BackendEndpoints::from_base(&config.backend_base)?;
        Self::with_endpoints(config, endpoints, store, navigator)
    }

    pub fn with_endpoints(
        config: AuthConfig,
        endpoints: BackendEndpoints,
        store: Arc<S>,
        navigator: Arc<N>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            config,
            endpoints,
            http: default_http()?,
            store,
            navigator,
        })
    }

    /// Replace the HTTP client, keeping everything else. The flow uses this
    /// to share one cookie jar between the exchange and the dashboard.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Submit an authorization code to the backend exchange endpoint and
    /// act on the outcome: success navigates to the dashboard, a tenant
    /// mismatch navigates to the recovery route with whatever URLs were
    /// extracted, and failures are returned for the caller to retry.
    ///
    /// Takes exclusive access for the duration of the round trip, so a
    /// second submission cannot start while one is in flight.
    pub async fn submit(&mut self, code: &str) -> Result<ExchangeOutcome, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::EmptyCode);
        }
        let verifier = self
            .store
            .get(VERIFIER_KEY)?
            .ok_or(AuthError::VerifierMissing)?;

        let response = self
            .http
            .post(self.endpoints.exchange_url.clone())
            .header("x-forwarded-host", self.config.forwarded_host())
            .timeout(StdDuration::from_secs(30))
            .json(&ExchangeRequest {
                code,
                code_verifier: &verifier,
            })
            .send()
            .await
            .map_err(|err| transport_error(&self.endpoints.exchange_url, err))?;

        let snapshot = ExchangeResponse::from_response(&self.endpoints.exchange_url, response).await;
        tracing::debug!(
            status = ?snapshot.status(),
            opaque = snapshot.is_opaque_redirect(),
            "token exchange responded"
        );

        let outcome = classify(&snapshot);
        match &outcome {
            ExchangeOutcome::Success => {
                self.store.remove(VERIFIER_KEY)?;
                let target = self.config.app_origin.join(DASHBOARD_PATH)?;
                self.navigator.navigate(&target)?;
            }
            ExchangeOutcome::TenantMismatch {
                logout_url,
                fresh_login_url,
            } => {
                if logout_url.is_none() && fresh_login_url.is_none() {
                    tracing::warn!("tenant mismatch detected but no recovery URLs could be read");
                }
                let target =
                    self.mismatch_route(logout_url.as_deref(), fresh_login_url.as_deref())?;
                self.navigator.navigate(&target)?;
            }
            ExchangeOutcome::Failure { status, message } => {
                tracing::debug!(%status, reason = %message, "token exchange rejected");
            }
        }
        Ok(outcome)
    }

    fn mismatch_route(
        &self,
        logout_url: Option<&str>,
        fresh_login_url: Option<&str>,
    ) -> Result<Url, AuthError> {
        let mut target = self.config.app_origin.join(TENANT_MISMATCH_PATH)?;
        {
            let mut pairs = target.query_pairs_mut();
            if let Some(value) = logout_url {
                pairs.append_pair("logoutUrl", value);
            }
            if let Some(value) = fresh_login_url {
                pairs.append_pair("freshLoginUrl", value);
            }
        }
        Ok(target)
    }
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    code_verifier: &'a str,
}

fn default_http() -> Result<Client, AuthError> {
    // Redirects stay unfollowed; the mismatch signal lives in the redirect
    // status and Location header of the original response.
    Ok(Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .redirect(redirect::Policy::none())
        .cookie_store(true)
        .build()?)
}

fn transport_error(endpoint: &Url, err: reqwest::Error) -> AuthError {
    let hint = if err.is_timeout() {
        "the request timed out"
    } else if err.is_connect() {
        "could not reach the backend"
    } else {
        "the request could not be completed"
    };
    AuthError::Transport(format!(
        "{hint} while contacting {endpoint}; check that the backend is running \
         and accepts requests from this origin ({err})"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigation::RecordingSink;
    use crate::auth::MemoryStore;
    use httpmock::prelude::*;
    use tokio::runtime::Runtime;

    fn runtime() -> Runtime {
        Runtime::new().unwrap()
    }

    fn test_config(backend: &str) -> AuthConfig {
        let mut config = AuthConfig::new(
            "auth.tenants.example",
            "client-123",
            Url::parse("http://localhost:3000").unwrap(),
        );
        config.backend_base = Url::parse(backend).unwrap();
        config
    }

    fn exchange_resolver(
        backend: &str,
    ) -> (
        TokenExchangeResolver<MemoryStore, RecordingSink>,
        Arc<MemoryStore>,
        Arc<RecordingSink>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let resolver = TokenExchangeResolver::new(
            test_config(backend),
            Arc::clone(&store),
            Arc::clone(&sink),
        )
        .unwrap();
        (resolver, store, sink)
    }

    #[test]
    fn classify_401_with_logout_body() {
        let response = ExchangeResponse::new(StatusCode::UNAUTHORIZED)
            .with_body(r#"{"logoutUrl":"https://idp.example/logout"}"#);
        assert_eq!(
            classify(&response),
            ExchangeOutcome::TenantMismatch {
                logout_url: Some("https://idp.example/logout".into()),
                fresh_login_url: None,
            }
        );
    }

    #[test]
    fn classify_302_with_location_header() {
        let response = ExchangeResponse::new(StatusCode::FOUND).with_header(
            "location",
            "https://app.example/recover?logoutUrl=https%3A%2F%2Fidp.example%2Flogout&freshLoginUrl=https%3A%2F%2Fidp.example%2Flogin",
        );
        assert_eq!(
            classify(&response),
            ExchangeOutcome::TenantMismatch {
                logout_url: Some("https://idp.example/logout".into()),
                fresh_login_url: Some("https://idp.example/login".into()),
            }
        );
    }

    #[test]
    fn classify_relative_location_splits_query_directly() {
        let response = ExchangeResponse::new(StatusCode::FOUND).with_header(
            "location",
            "/auth/tenant-mismatch?freshLoginUrl=https%3A%2F%2Fidp.example%2Flogin",
        );
        assert_eq!(
            classify(&response),
            ExchangeOutcome::TenantMismatch {
                logout_url: None,
                fresh_login_url: Some("https://idp.example/login".into()),
            }
        );
    }

    #[test]
    fn classify_blank_location_values_are_dropped() {
        let response = ExchangeResponse::new(StatusCode::FOUND).with_header(
            "location",
            "https://app.example/recover?logoutUrl=&freshLoginUrl=https%3A%2F%2Fidp.example%2Flogin",
        );
        assert_eq!(
            classify(&response),
            ExchangeOutcome::TenantMismatch {
                logout_url: None,
                fresh_login_url: Some("https://idp.example/login".into()),
            }
        );
    }

    #[test]
    fn classify_opaque_redirect_degrades_to_bare_mismatch() {
        assert_eq!(
            classify(&ExchangeResponse::opaque_redirect()),
            ExchangeOutcome::TenantMismatch {
                logout_url: None,
                fresh_login_url: None,
            }
        );
    }

    #[test]
    fn classify_plain_401_degrades_to_bare_mismatch() {
        assert_eq!(
            classify(&ExchangeResponse::new(StatusCode::UNAUTHORIZED)),
            ExchangeOutcome::TenantMismatch {
                logout_url: None,
                fresh_login_url: None,
            }
        );
    }

    #[test]
    fn classify_ok_is_success() {
        assert_eq!(
            classify(&ExchangeResponse::new(StatusCode::OK)),
            ExchangeOutcome::Success
        );
    }

    #[test]
    fn classify_server_error_is_failure() {
        assert_eq!(
            classify(&ExchangeResponse::new(StatusCode::INTERNAL_SERVER_ERROR)),
            ExchangeOutcome::Failure {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal Server Error".into(),
            }
        );
    }

    #[test]
    fn successful_exchange_navigates_to_dashboard() {
        let rt = runtime();
        rt.block_on(async {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/auth/v1/exchange-token")
                    .header("x-forwarded-host", "localhost:3000")
                    .json_body_obj(&serde_json::json!({
                        "code": "auth-code-1",
                        "code_verifier": "stored-verifier",
                    }));
                then.status(200);
            });

            let (mut resolver, store, sink) = exchange_resolver(&server.base_url());
            store.put(VERIFIER_KEY, "stored-verifier").unwrap();
            let outcome = resolver.submit("auth-code-1").await.unwrap();
            mock.assert();
            assert_eq!(outcome, ExchangeOutcome::Success);
            assert_eq!(store.get(VERIFIER_KEY).unwrap(), None);
            assert_eq!(
                sink.last().unwrap().as_str(),
                "http://localhost:3000/dashboard"
            );
        });
    }

    #[test]
    fn mismatch_navigates_to_recovery_route_with_encoded_urls() {
        let rt = runtime();
        rt.block_on(async {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/auth/v1/exchange-token");
                then.status(302).header(
                    "location",
                    "https://app.example/cb?logoutUrl=https%3A%2F%2Fidp.example%2Flogout",
                );
            });

            let (mut resolver, store, sink) = exchange_resolver(&server.base_url());
            store.put(VERIFIER_KEY, "stored-verifier").unwrap();
            let outcome = resolver.submit("auth-code-2").await.unwrap();
            mock.assert();
            assert_eq!(
                outcome,
                ExchangeOutcome::TenantMismatch {
                    logout_url: Some("https://idp.example/logout".into()),
                    fresh_login_url: None,
                }
            );
            // Verifier survives a mismatch; the recovery path decides
            // whether to mint a fresh one.
            assert!(store.get(VERIFIER_KEY).unwrap().is_some());
            let visited = sink.last().unwrap();
            assert_eq!(visited.path(), "/auth/tenant-mismatch");
            assert_eq!(
                visited.query(),
                Some("logoutUrl=https%3A%2F%2Fidp.example%2Flogout")
            );
        });
    }

    #[test]
    fn missing_verifier_makes_no_network_call() {
        let rt = runtime();
        rt.block_on(async {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/auth/v1/exchange-token");
                then.status(200);
            });

            let (mut resolver, _store, sink) = exchange_resolver(&server.base_url());
            let err = resolver.submit("auth-code-3").await.unwrap_err();
            assert!(matches!(err, AuthError::VerifierMissing));
            mock.assert_hits(0);
            assert!(sink.visited().is_empty());
        });
    }

    #[test]
    fn empty_code_is_rejected_before_anything_else() {
        let rt = runtime();
        rt.block_on(async {
            let (mut resolver, store, sink) = exchange_resolver("http://127.0.0.1:9");
            store.put(VERIFIER_KEY, "stored-verifier").unwrap();
            let err = resolver.submit("   ").await.unwrap_err();
            assert!(matches!(err, AuthError::EmptyCode));
            assert!(sink.visited().is_empty());
        });
    }

    #[test]
    fn failure_keeps_verifier_for_retry() {
        let rt = runtime();
        rt.block_on(async {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/auth/v1/exchange-token");
                then.status(500);
            });

            let (mut resolver, store, sink) = exchange_resolver(&server.base_url());
            store.put(VERIFIER_KEY, "stored-verifier").unwrap();
            let outcome = resolver.submit("auth-code-4").await.unwrap();
            assert_eq!(
                outcome,
                ExchangeOutcome::Failure {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal Server Error".into(),
                }
            );
            assert_eq!(
                store.get(VERIFIER_KEY).unwrap().as_deref(),
                Some("stored-verifier")
            );
            assert!(sink.visited().is_empty());
        });
    }

    #[test]
    fn unreachable_backend_reports_explanatory_transport_error() {
        let rt = runtime();
        rt.block_on(async {
            let (mut resolver, store, _sink) = exchange_resolver("http://127.0.0.1:1");
            store.put(VERIFIER_KEY, "stored-verifier").unwrap();
            let err = resolver.submit("auth-code-5").await.unwrap_err();
            match err {
                AuthError::Transport(message) => {
                    assert!(message.contains("check that the backend is running"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        });
    }
}
