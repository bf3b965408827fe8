use std::sync::Arc;

use url::Url;

use crate::config::AuthConfig;

use super::{AuthError, EphemeralStore, NavigationSink, PkcePair, VERIFIER_KEY};

/// Corrective action taken for a reported tenant mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Ended the conflicting identity provider session.
    Logout(Url),
    /// Started a fresh authorization attempt with a new PKCE pair.
    FreshLogin(Url),
    /// No recovery URL was available; returned to the application root.
    Home(Url),
}

impl RecoveryAction {
    pub fn url(&self) -> &Url {
        match self {
            RecoveryAction::Logout(url)
            | RecoveryAction::FreshLogin(url)
            | RecoveryAction::Home(url) => url,
        }
    }
}

/// Performs the second corrective redirect after the exchange reported a
/// tenant mismatch.
pub struct TenantMismatchResolver<S, N> {
    config: AuthConfig,
    store: Arc<S>,
    navigator: Arc<N>,
}

impl<S, N> TenantMismatchResolver<S, N>
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

    /// Pick the recovery path and navigate there. A logout URL wins over a
    /// fresh-login URL; a fresh login gets a brand-new PKCE pair whose
    /// challenge is appended to the URL; with neither, the user goes back
    /// to the application root.
    pub fn resolve(
        &self,
        logout_url: Option<&str>,
        fresh_login_url: Option<&str>,
    ) -> Result<RecoveryAction, AuthError> {
        if let Some(raw) = non_empty(logout_url) {
            let url = Url::parse(raw)?;
            self.navigator.navigate(&url)?;
            return Ok(RecoveryAction::Logout(url));
        }
        if let Some(raw) = non_empty(fresh_login_url) {
            let url = self.fresh_login_target(raw)?;
            self.navigator.navigate(&url)?;
            return Ok(RecoveryAction::FreshLogin(url));
        }
        tracing::warn!("tenant mismatch without recovery URLs, returning home");
        let home = self.config.app_origin.clone();
        self.navigator.navigate(&home)?;
        Ok(RecoveryAction::Home(home))
    }

    fn fresh_login_target(&self, raw: &str) -> Result<Url, AuthError> {
        let pair = PkcePair::generate();
        self.store.put(VERIFIER_KEY, pair.verifier())?;
        let mut url = Url::parse(raw)?;
        url.query_pairs_mut()
            .append_pair("code_challenge", pair.challenge())
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }
}

/// Read the recovery URLs back out of a mismatch-route URL, the inverse
/// of the query the exchange resolver writes when it routes here. Blank
/// values read back as absent.
pub fn recovery_urls_from_route(url: &Url) -> (Option<String>, Option<String>) {
    let mut logout_url = None;
    let mut fresh_login_url = None;
    for (name, value) in url.query_pairs() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.as_ref() {
            "logoutUrl" => logout_url = Some(value.to_owned()),
            "freshLoginUrl" => fresh_login_url = Some(value.to_owned()),
            _ => {}
        }
    }
    (logout_url, fresh_login_url)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
