use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{TokenError, TokenResult};
use crate::utils::constants::{ENV_ACCESS_TOKENS, ENV_CREDENTIALS_DIR};

/// Result of asking the ambient credentials provider for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAccountOutcome {
    Token(String),
    /// No ambient credentials exist for the name. Callers move on silently.
    NotConfigured,
}

/// Boundary to the platform's service-account token provider.
pub trait ServiceAccountSource: Send + Sync {
    fn get(&self, name: &str) -> TokenResult<ServiceAccountOutcome>;
}

/// Tokens handed to the process by its environment: an inline
/// `name=token,…` list and/or a mounted credentials directory holding
/// `<name>-token-secret` files.
#[derive(Debug, Clone, Default)]
pub struct AmbientCredentials {
    inline: HashMap<String, String>,
    credentials_dir: Option<PathBuf>,
}

impl AmbientCredentials {
    pub fn new(inline: HashMap<String, String>, credentials_dir: Option<PathBuf>) -> Self {
        Self {
            inline,
            credentials_dir,
        }
    }

    pub fn from_env() -> Self {
        let inline = std::env::var(ENV_ACCESS_TOKENS)
            .map(|raw| parse_inline_tokens(&raw))
            .unwrap_or_default();
        let credentials_dir = std::env::var_os(ENV_CREDENTIALS_DIR)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        Self::new(inline, credentials_dir)
    }
}

impl ServiceAccountSource for AmbientCredentials {
    fn get(&self, name: &str) -> TokenResult<ServiceAccountOutcome> {
        if let Some(token) = self.inline.get(name) {
            debug!("service token '{}' found in {}", name, ENV_ACCESS_TOKENS);
            return Ok(ServiceAccountOutcome::Token(token.to_owned()));
        }

        let Some(dir) = &self.credentials_dir else {
            return Ok(ServiceAccountOutcome::NotConfigured);
        };
        let path = dir.join(format!("{}-token-secret", name));
        match std::fs::read_to_string(&path) {
            Ok(secret) if !secret.trim().is_empty() => {
                debug!("service token '{}' read from {}", name, path.display());
                Ok(ServiceAccountOutcome::Token(secret.trim().to_owned()))
            }
            Ok(_) => Ok(ServiceAccountOutcome::NotConfigured),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ServiceAccountOutcome::NotConfigured),
            Err(err) => Err(TokenError::ServiceAccount(format!(
                "failed to read {}: {}",
                path.display(),
                err
            ))),
        }
    }
}

/// `name=token[,name=token…]`; malformed entries are skipped.
pub fn parse_inline_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(name, token)| (name.trim(), token.trim()))
        .filter(|(name, token)| !name.is_empty() && !token.is_empty())
        .map(|(name, token)| (name.to_owned(), token.to_owned()))
        .collect()
}

/// Source that never has ambient credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServiceAccount;

impl ServiceAccountSource for NoServiceAccount {
    fn get(&self, _name: &str) -> TokenResult<ServiceAccountOutcome> {
        Ok(ServiceAccountOutcome::NotConfigured)
    }
}
