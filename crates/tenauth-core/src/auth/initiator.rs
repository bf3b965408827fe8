use std::sync::Arc;

use url::Url;

use crate::config::{AuthConfig, OAUTH_SCOPE};

use super::{AuthError, EphemeralStore, NavigationSink, PkcePair, VERIFIER_KEY};

/// Starts an authorization attempt: generates a PKCE pair, persists the
/// verifier, builds the authorization URL, and hands control to the
/// navigation sink.
pub struct AuthorizationInitiator<S, N> {
    config: AuthConfig,
    store: Arc<S>,
    navigator: Arc<N>,
}

impl<S, N> AuthorizationInitiator<S, N>
where
    S: EphemeralStore,
    N: NavigationSink,
{
    pub fn new(config: AuthConfig, store: Arc<S>, navigator: Arc<N>) -> Self {
        Self {
            config,
            store,
            navigator,
        }
    }

    /// Begin a login attempt. Configuration is validated before anything
    /// else happens; a misconfigured client never navigates and never
    /// writes a verifier. On success, control conceptually leaves the
    /// application until the identity provider redirects back.
    pub fn begin(&self) -> Result<(), AuthError> {
        self.config.validate()?;
        let pair = PkcePair::generate();
        self.store.put(VERIFIER_KEY, pair.verifier())?;
        let url = self.authorization_url(&pair)?;
        tracing::debug!(
            provider = %self.config.identity_provider_domain,
            "redirecting to identity provider"
        );
        self.navigator.navigate(&url)
    }

    fn authorization_url(&self, pair: &PkcePair) -> Result<Url, AuthError> {
        let mut url = self.config.authorization_endpoint()?;
        let redirect_uri = self.config.redirect_uri()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("code_challenge", pair.challenge())
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }
}
