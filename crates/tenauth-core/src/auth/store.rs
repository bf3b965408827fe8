use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::AuthError;

/// Storage key under which the PKCE verifier survives the round trip
/// through the identity provider.
pub const VERIFIER_KEY: &str = "pkce_code_verifier";

/// Ephemeral key-value storage scoped to one login attempt, the analog of
/// a browser tab's session storage. Starting a second attempt overwrites
/// the stored verifier and invalidates any exchange still in flight for
/// the first; that is accepted behavior, not a bug.
pub trait EphemeralStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), AuthError>;
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// In-process store backing a single interactive login.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, AuthError> {
        self.inner
            .lock()
            .map_err(|_| AuthError::Storage("verifier store lock poisoned".to_owned()))
    }
}

impl EphemeralStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
