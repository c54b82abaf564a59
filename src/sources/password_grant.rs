use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::cache::token::TokenRecord;
use crate::error::TokenResult;
use crate::resilience::retry::RetrySettings;
use crate::sources::response::classify_token_response;
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;

/// Resource-owner password credentials for one request.
#[derive(Clone)]
pub struct PasswordGrant<'a> {
    pub url: &'a str,
    pub realm: Option<&'a str>,
    pub scope: &'a [String],
    pub user: &'a str,
    pub password: &'a str,
}

/// Refresh-token grant against the OAuth 2 token endpoint.
#[derive(Debug, Clone)]
pub struct RefreshGrant<'a> {
    pub token_url: &'a str,
    pub client_id: &'a str,
    pub business_partner_id: &'a str,
    pub refresh_token: &'a str,
}

/// HTTP client for the Token Service.
#[derive(Debug, Clone)]
pub struct AuthServerClient {
    client: Client,
    retry: RetrySettings,
}

impl AuthServerClient {
    pub fn new(client: Client, retry: RetrySettings) -> Self {
        Self { client, retry }
    }

    /// Client with the default request timeout.
    pub fn with_retry(retry: RetrySettings) -> TokenResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS))
            .build()?;
        Ok(Self::new(client, retry))
    }

    /// Password grant: GET with basic auth, `realm` and space-joined `scope`
    /// as query parameters.
    pub async fn request_token(&self, grant: &PasswordGrant<'_>) -> TokenResult<TokenRecord> {
        let query = password_grant_query(grant.realm, grant.scope);
        debug!(url = %grant.url, user = %grant.user, "requesting token with password grant");

        let record = self
            .retry
            .run_with_retry(
                || {
                    let request = self
                        .client
                        .get(grant.url)
                        .basic_auth(grant.user, Some(grant.password))
                        .query(&query);
                    async move {
                        let response = request.send().await?;
                        let status = response.status();
                        let body = response.text().await?;
                        classify_token_response(status, &body)
                    }
                },
                |err| err.is_transient(),
            )
            .await?;

        info!("token issued for user '{}'", grant.user);
        let scope = requested_scope(grant.scope).or_else(|| record.scope.clone());
        Ok(record.with_scope(scope))
    }

    /// Exchange a refresh token. The previous refresh token is kept when the
    /// response does not rotate it.
    pub async fn refresh_token(&self, grant: &RefreshGrant<'_>) -> TokenResult<TokenRecord> {
        debug!(url = %grant.token_url, "refreshing token");
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", grant.client_id),
            ("business_partner_id", grant.business_partner_id),
            ("refresh_token", grant.refresh_token),
        ];
        let response = self.client.post(grant.token_url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let record = classify_token_response(status, &body)?;

        let refresh_token = record
            .refresh_token
            .clone()
            .or_else(|| Some(grant.refresh_token.to_owned()));
        info!("token refreshed");
        Ok(record.with_refresh_token(refresh_token))
    }
}

pub fn password_grant_query(realm: Option<&str>, scope: &[String]) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("json", "true".to_owned()),
        ("grant_type", "password".to_owned()),
    ];
    if let Some(realm) = realm.filter(|r| !r.is_empty()) {
        query.push(("realm", realm.to_owned()));
    }
    let scope = join_scope(scope);
    if !scope.is_empty() {
        query.push(("scope", scope));
    }
    query
}

pub fn join_scope(scope: &[String]) -> String {
    scope
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn requested_scope(scope: &[String]) -> Option<Vec<String>> {
    let scope: Vec<String> = scope
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    (!scope.is_empty()).then_some(scope)
}
