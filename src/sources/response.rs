use http::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::token::TokenRecord;
use crate::error::{TokenError, TokenResult};

/// Classify a Token Service response and build a record from a success body.
///
/// 401 is an authentication failure, any other non-2xx is a server error
/// carrying the status, and a 2xx body must be JSON with an `access_token`.
pub fn classify_token_response(status: StatusCode, body: &str) -> TokenResult<TokenRecord> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(TokenError::AuthenticationFailed(describe_status(status, body)));
    }
    if !status.is_success() {
        return Err(TokenError::server(
            Some(status.as_u16()),
            format!("Token Service returned HTTP status {}", status.as_u16()),
        ));
    }
    parse_token_body(status, body)
}

fn parse_token_body(status: StatusCode, body: &str) -> TokenResult<TokenRecord> {
    let json: Value = serde_json::from_str(body).map_err(|e| {
        warn!("Token Service body is not valid JSON: {}", e);
        TokenError::server(
            Some(status.as_u16()),
            format!("Token Service returned invalid JSON ({})", e),
        )
    })?;

    let access_token = json["access_token"]
        .as_str()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            TokenError::server(
                Some(status.as_u16()),
                "Token Service response is missing access_token",
            )
        })?;

    let record = TokenRecord::issued_now(access_token, expires_in(&json["expires_in"]))
        .with_scope(scope(&json["scope"]))
        .with_refresh_token(json["refresh_token"].as_str().map(str::to_owned))
        .with_token_type(json["token_type"].as_str().map(str::to_owned));

    debug!(expires_in = ?record.expires_in, "token response parsed");
    Ok(record)
}

/// Number of seconds, or a numeric string.
pub fn expires_in(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Space-separated string or a list of strings.
pub fn scope(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(split_scope(s)),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str())
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        ),
        _ => None,
    }
}

pub fn split_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_owned).collect()
}

fn describe_status(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP status {}", status.as_u16())
    } else {
        format!("HTTP status {}: {}", status.as_u16(), body)
    }
}
