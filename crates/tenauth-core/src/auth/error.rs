use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the login flow components.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("ephemeral store error: {0}")]
    Storage(String),
    #[error("authorization code is empty")]
    EmptyCode,
    #[error("no code verifier stored for this login attempt; restart the login")]
    VerifierMissing,
    #[error("token exchange request failed: {0}")]
    Transport(String),
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("authorization response missing code parameter")]
    MissingAuthorizationCode,
}
