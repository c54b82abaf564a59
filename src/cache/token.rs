use serde::{Deserialize, Serialize};

use crate::helpers::time::now_u64;

/// A stored bearer token and the metadata needed to judge its freshness.
///
/// Records are never mutated after creation: a refresh produces a new record
/// that replaces the old one under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    /// unix seconds, set when the record is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<u64>,
    /// lifetime in seconds counted from `creation_time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenRecord {
    /// Bare record carrying only the token value, with no lifetime information.
    pub fn bare(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            creation_time: None,
            expires_in: None,
            scope: None,
            refresh_token: None,
            token_type: None,
        }
    }

    /// Record created now with the given lifetime.
    pub fn issued_now(access_token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            creation_time: Some(now_u64()),
            expires_in,
            ..Self::bare(access_token)
        }
    }

    pub fn with_scope(self, scope: Option<Vec<String>>) -> Self {
        Self { scope, ..self }
    }

    pub fn with_refresh_token(self, refresh_token: Option<String>) -> Self {
        Self {
            refresh_token,
            ..self
        }
    }

    pub fn with_token_type(self, token_type: Option<String>) -> Self {
        Self { token_type, ..self }
    }

    /// Unix timestamp at which the token stops being accepted, if known.
    pub fn expires_at(&self) -> Option<u64> {
        match (self.creation_time, self.expires_in) {
            (Some(created), Some(ttl)) => Some(created.saturating_add(ttl)),
            _ => None,
        }
    }
}
