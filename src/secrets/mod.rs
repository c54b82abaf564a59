//! Remembered passwords for the password grant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use keyring::Entry;
use tracing::debug;

use crate::error::{TokenError, TokenResult};
use crate::utils::constants::KEYRING_SERVICE;

pub trait SecretStore: Send + Sync {
    fn get_password(&self, user: &str) -> TokenResult<Option<String>>;
    fn set_password(&self, user: &str, password: &str) -> TokenResult<()>;
}

/// OS secret store through the `keyring` crate.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, user: &str) -> TokenResult<Entry> {
        Entry::new(&self.service, user).map_err(|e| TokenError::SecretStore(e.to_string()))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get_password(&self, user: &str) -> TokenResult<Option<String>> {
        match self.entry(user)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                debug!("no remembered password for '{}'", user);
                Ok(None)
            }
            Err(e) => Err(TokenError::SecretStore(e.to_string())),
        }
    }

    fn set_password(&self, user: &str, password: &str) -> TokenResult<()> {
        self.entry(user)?
            .set_password(password)
            .map_err(|e| TokenError::SecretStore(e.to_string()))
    }
}

/// Process-local store, for tests and `--no-keyring` runs.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_password(&self, user: &str) -> TokenResult<Option<String>> {
        self.inner
            .read()
            .map(|map| map.get(user).cloned())
            .map_err(|e| TokenError::SecretStore(e.to_string()))
    }

    fn set_password(&self, user: &str, password: &str) -> TokenResult<()> {
        self.inner
            .write()
            .map(|mut map| {
                map.insert(user.to_owned(), password.to_owned());
            })
            .map_err(|e| TokenError::SecretStore(e.to_string()))
    }
}
