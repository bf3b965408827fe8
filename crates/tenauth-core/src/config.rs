use std::env;

use thiserror::Error;
use url::Url;

/// Path on the identity provider that starts the authorization code flow.
pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";
/// Route on the application that receives the authorization redirect.
pub const CALLBACK_PATH: &str = "/auth/callback";
/// Route on the application that hosts the tenant-mismatch recovery screen.
pub const TENANT_MISMATCH_PATH: &str = "/auth/tenant-mismatch";
/// Backend endpoint that exchanges an authorization code for token cookies.
pub const EXCHANGE_PATH: &str = "/auth/v1/exchange-token";
/// Backend endpoint serving the protected dashboard payload.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Scopes requested on every authorization attempt.
pub const OAUTH_SCOPE: &str = "openid email profile";

const DEFAULT_APP_ORIGIN: &str = "http://localhost:3000";

/// Errors raised while assembling or validating configuration. All of them
/// block the flow before any navigation happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("identity provider domain is not configured (set TENAUTH_IDP_DOMAIN)")]
    MissingIdpDomain,
    #[error("OAuth client id is not configured (set TENAUTH_CLIENT_ID)")]
    MissingClientId,
    #[error("invalid URL in configuration: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Client configuration for the login flow.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Host name of the multi-tenant identity provider, e.g.
    /// `auth.example-tenants.com`.
    pub identity_provider_domain: String,
    /// Public OAuth client id registered with the identity provider.
    pub client_id: String,
    /// Origin the application is served from. The redirect URI and the
    /// application's own routes are resolved against it.
    pub app_origin: Url,
    /// Base URL of the backend that performs the token exchange. Defaults
    /// to the app origin; the backend is same-site with the application.
    pub backend_base: Url,
}

impl AuthConfig {
    pub fn new<D, C>(identity_provider_domain: D, client_id: C, app_origin: Url) -> Self
    where
        D: Into<String>,
        C: Into<String>,
    {
        Self {
            identity_provider_domain: identity_provider_domain.into(),
            client_id: client_id.into(),
            backend_base: app_origin.clone(),
            app_origin,
        }
    }

    /// Collect configuration from `TENAUTH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Collect configuration from an arbitrary lookup. Identity provider
    /// values may be absent here; [`AuthConfig::validate`] rejects them at
    /// the point a login is actually started, so commands that only talk to
    /// the backend work without them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
        };

        let app_origin = match non_empty(lookup("TENAUTH_APP_ORIGIN")) {
            Some(raw) => Url::parse(&raw)?,
            None => Url::parse(DEFAULT_APP_ORIGIN).expect("default origin is a valid URL"),
        };
        let backend_base = match non_empty(lookup("TENAUTH_BACKEND_URL")) {
            Some(raw) => Url::parse(&raw)?,
            None => app_origin.clone(),
        };

        Ok(Self {
            identity_provider_domain: non_empty(lookup("TENAUTH_IDP_DOMAIN")).unwrap_or_default(),
            client_id: non_empty(lookup("TENAUTH_CLIENT_ID")).unwrap_or_default(),
            app_origin,
            backend_base,
        })
    }

    /// Check the values the authorization redirect cannot be built without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_provider_domain.trim().is_empty() {
            return Err(ConfigError::MissingIdpDomain);
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        Ok(())
    }

    /// The identity provider's authorization endpoint.
    pub fn authorization_endpoint(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&format!(
            "https://{}{AUTHORIZE_PATH}",
            self.identity_provider_domain
        ))?)
    }

    /// Redirect URI the identity provider sends the browser back to.
    pub fn redirect_uri(&self) -> Result<Url, ConfigError> {
        Ok(self.app_origin.join(CALLBACK_PATH)?)
    }

    /// Host (with any non-default port) the application is reached under,
    /// as a browser would report it.
    pub fn forwarded_host(&self) -> String {
        let host = self.app_origin.host_str().unwrap_or_default();
        match self.app_origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }
}

/// Backend endpoints the flow talks to. Kept separate from [`AuthConfig`]
/// so tests can point the flow at a mock server.
#[derive(Debug, Clone)]
pub struct BackendEndpoints {
    pub exchange_url: Url,
    pub dashboard_url: Url,
}

impl BackendEndpoints {
    /// Resolve the endpoints against a backend base URL.
    pub fn from_base(base: &Url) -> Result<Self, ConfigError> {
        Ok(Self {
            exchange_url: base.join(EXCHANGE_PATH)?,
            dashboard_url: base.join(DASHBOARD_PATH)?,
        })
    }
}
