use url::Url;

use super::AuthError;

/// Full-page navigation boundary. Flow components hand control here
/// instead of touching a location object directly; front ends decide what
/// leaving the page means for them.
pub trait NavigationSink: Send + Sync {
    fn navigate(&self, url: &Url) -> Result<(), AuthError>;
}

/// Sink that records every navigation instead of performing one.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    visited: std::sync::Mutex<Vec<Url>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn visited(&self) -> Vec<Url> {
        self.visited.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<Url> {
        self.visited.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
impl NavigationSink for RecordingSink {
    fn navigate(&self, url: &Url) -> Result<(), AuthError> {
        self.visited.lock().unwrap().push(url.clone());
        Ok(())
    }
}
