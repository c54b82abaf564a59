use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::settings::RetryConfig;

/// ================================
/// Connection to the authorization server
/// ================================
///
/// Every field is optional: values come from the per-user configuration file
/// and whatever the caller collected interactively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// password grant endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,
    /// refresh-token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_partner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// transport retry for Token Service calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionField {
    Url,
    AuthorizeUrl,
    TokenUrl,
    ClientId,
    BusinessPartnerId,
    User,
}

pub const PASSWORD_GRANT_FIELDS: &[ConnectionField] = &[ConnectionField::Url, ConnectionField::User];

pub const IMPLICIT_FLOW_FIELDS: &[ConnectionField] = &[
    ConnectionField::AuthorizeUrl,
    ConnectionField::TokenUrl,
    ConnectionField::ClientId,
    ConnectionField::BusinessPartnerId,
];

impl ConnectionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionField::Url => "url",
            ConnectionField::AuthorizeUrl => "authorize_url",
            ConnectionField::TokenUrl => "token_url",
            ConnectionField::ClientId => "client_id",
            ConnectionField::BusinessPartnerId => "business_partner_id",
            ConnectionField::User => "user",
        }
    }

    /// Human prompt label.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionField::Url => "Token Service URL",
            ConnectionField::AuthorizeUrl => "OAuth 2 Authorize URL",
            ConnectionField::TokenUrl => "OAuth 2 Token URL",
            ConnectionField::ClientId => "OAuth 2 Client ID",
            ConnectionField::BusinessPartnerId => "Business Partner ID",
            ConnectionField::User => "Username",
        }
    }

    pub fn join(fields: &[ConnectionField]) -> String {
        fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ConnectionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectionConfig {
    pub fn get(&self, field: ConnectionField) -> Option<&str> {
        let value = match field {
            ConnectionField::Url => &self.url,
            ConnectionField::AuthorizeUrl => &self.authorize_url,
            ConnectionField::TokenUrl => &self.token_url,
            ConnectionField::ClientId => &self.client_id,
            ConnectionField::BusinessPartnerId => &self.business_partner_id,
            ConnectionField::User => &self.user,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: ConnectionField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            ConnectionField::Url => self.url = value,
            ConnectionField::AuthorizeUrl => self.authorize_url = value,
            ConnectionField::TokenUrl => self.token_url = value,
            ConnectionField::ClientId => self.client_id = value,
            ConnectionField::BusinessPartnerId => self.business_partner_id = value,
            ConnectionField::User => self.user = value,
        }
    }

    /// Fields from `required` that are absent or blank.
    pub fn missing_fields(&self, required: &[ConnectionField]) -> Vec<ConnectionField> {
        required
            .iter()
            .copied()
            .filter(|field| self.get(*field).is_none())
            .collect()
    }

    /// Values present in `other` win over the ones in `self`.
    pub fn overlay(&self, other: &ConnectionConfig) -> ConnectionConfig {
        ConnectionConfig {
            url: other.url.clone().or_else(|| self.url.clone()),
            authorize_url: other.authorize_url.clone().or_else(|| self.authorize_url.clone()),
            token_url: other.token_url.clone().or_else(|| self.token_url.clone()),
            client_id: other.client_id.clone().or_else(|| self.client_id.clone()),
            business_partner_id: other
                .business_partner_id
                .clone()
                .or_else(|| self.business_partner_id.clone()),
            user: other.user.clone().or_else(|| self.user.clone()),
            retry: other.retry.clone().or_else(|| self.retry.clone()),
        }
    }

    pub fn implicit_flow(&self) -> Result<ImplicitFlowConnection, Vec<ConnectionField>> {
        let missing = self.missing_fields(IMPLICIT_FLOW_FIELDS);
        if !missing.is_empty() {
            return Err(missing);
        }
        let field = |f| self.get(f).unwrap_or_default().to_owned();
        Ok(ImplicitFlowConnection {
            authorize_url: field(ConnectionField::AuthorizeUrl),
            token_url: field(ConnectionField::TokenUrl),
            client_id: field(ConnectionField::ClientId),
            business_partner_id: field(ConnectionField::BusinessPartnerId),
        })
    }
}

/// Fully resolved settings for the browser flow and refresh grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitFlowConnection {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub business_partner_id: String,
}
