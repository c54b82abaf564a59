//! Shared constants and invariants

/// Directory under the user config dir holding the token store and config.
pub const APP_DIR_NAME: &str = "token-broker";
pub const TOKENS_FILE_NAME: &str = "tokens.yaml";

/// Component id used for the connection configuration file.
pub const CONFIG_COMPONENT_ID: &str = "token-broker";

/// Secret store service name for remembered passwords.
pub const KEYRING_SERVICE: &str = "token-broker";

/// Lifetime assumed for service-account tokens, which carry none.
pub const SERVICE_TOKEN_NOMINAL_TTL_SECONDS: u64 = 600;

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_REDIRECT_TIMEOUT_SECS: u64 = 300;

// Ambient service-account credentials
pub const ENV_ACCESS_TOKENS: &str = "OAUTH2_ACCESS_TOKENS";
pub const ENV_CREDENTIALS_DIR: &str = "CREDENTIALS_DIR";
