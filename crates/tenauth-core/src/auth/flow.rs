use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{redirect, Client};
use serde_json::Value;

use crate::config::{AuthConfig, BackendEndpoints};
use crate::dashboard::{DashboardClient, DashboardError};

use super::exchange::{ExchangeOutcome, TokenExchangeResolver};
use super::initiator::AuthorizationInitiator;
use super::mismatch::{RecoveryAction, TenantMismatchResolver};
use super::{AuthError, EphemeralStore, NavigationSink};

const USER_AGENT: &str = "tenauth/0.1.0";

/// One login attempt from authorization redirect to dashboard, wiring the
/// initiator, exchange, and mismatch recovery around a shared verifier
/// store and navigation sink.
///
/// All backend traffic goes through a single HTTP client with one cookie
/// jar, so the session cookies minted by the exchange are presented on the
/// dashboard request, the way a browser would carry them between pages.
pub struct LoginFlow<S, N> {
    initiator: AuthorizationInitiator<S, N>,
    exchange: TokenExchangeResolver<S, N>,
    mismatch: TenantMismatchResolver<S, N>,
    dashboard: DashboardClient,
}

impl<S, N> LoginFlow<S, N>
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
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        let initiator = AuthorizationInitiator::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&navigator),
        );
        let exchange = TokenExchangeResolver::with_endpoints(
            config.clone(),
            endpoints.clone(),
            Arc::clone(&store),
            Arc::clone(&navigator),
        )?
        .with_http_client(http.clone());
        let mismatch = TenantMismatchResolver::new(config, store, navigator);
        let dashboard = DashboardClient::with_http_client(endpoints.dashboard_url.clone(), http);

        Ok(Self {
            initiator,
            exchange,
            mismatch,
            dashboard,
        })
    }

    /// Start a fresh authorization attempt.
    pub fn begin(&self) -> Result<(), AuthError> {
        self.initiator.begin()
    }

    /// Exchange an authorization code; see
    /// [`TokenExchangeResolver::submit`].
    pub async fn submit(&mut self, code: &str) -> Result<ExchangeOutcome, AuthError> {
        self.exchange.submit(code).await
    }

    /// Run tenant-mismatch recovery with the URLs the exchange extracted.
    pub fn recover(
        &self,
        logout_url: Option<&str>,
        fresh_login_url: Option<&str>,
    ) -> Result<RecoveryAction, AuthError> {
        self.mismatch.resolve(logout_url, fresh_login_url)
    }

    /// Fetch the protected dashboard payload using the session cookies
    /// from the last successful exchange.
    pub async fn dashboard(&self) -> Result<Value, DashboardError> {
        self.dashboard.fetch().await
    }
}
