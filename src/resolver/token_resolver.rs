use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::token::TokenRecord;
use crate::cache::token_store::{TokenStore, YamlTokenStore};
use crate::cache::validity::is_valid;
use crate::config::connection::{ConnectionConfig, ConnectionField, PASSWORD_GRANT_FIELDS};
use crate::error::{TokenError, TokenResult};
use crate::resilience::retry::RetrySettings;
use crate::secrets::{InMemorySecretStore, KeyringSecretStore, SecretStore};
use crate::sources::implicit_flow::{ImplicitFlowAcquirer, ImplicitFlowSettings, SystemBrowser};
use crate::sources::password_grant::{AuthServerClient, PasswordGrant, RefreshGrant};
use crate::sources::service_account::{
    AmbientCredentials, NoServiceAccount, ServiceAccountOutcome, ServiceAccountSource,
};
use crate::utils::constants::SERVICE_TOKEN_NOMINAL_TTL_SECONDS;

/// What the caller wants: a token for `scope`, optionally cached under `name`.
#[derive(Clone, Default)]
pub struct NamedTokenRequest {
    /// cache key; unnamed tokens are neither looked up nor stored
    pub name: Option<String>,
    pub scope: Vec<String>,
    pub realm: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// overrides the configured Token Service URL
    pub url: Option<String>,
    /// skip cache and service account, always acquire a new token
    pub refresh: bool,
}

impl NamedTokenRequest {
    pub fn named(name: impl Into<String>, scope: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            scope,
            ..Self::default()
        }
    }

    pub fn unnamed(scope: Vec<String>) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn realm(mut self, realm: Option<String>) -> Self {
        self.realm = realm;
        self
    }

    pub fn user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

struct Credentials {
    url: String,
    user: String,
    password: String,
    /// supplied by the caller rather than recalled from the secret store
    supplied: bool,
}

/// Resolves a usable bearer token through the fallback chain:
/// cache -> service account -> password grant, with the browser implicit flow
/// as a separately selected mode.
pub struct TokenResolver {
    store: Arc<dyn TokenStore>,
    service_accounts: Arc<dyn ServiceAccountSource>,
    secrets: Arc<dyn SecretStore>,
    auth_client: AuthServerClient,
    implicit_flow: ImplicitFlowAcquirer,
    connection: ConnectionConfig,
    service_token_ttl: u64,
    remember_password: bool,
}

impl TokenResolver {
    /// Resolver over `store` with no ambient credentials, a process-local
    /// secret store and the system browser.
    pub fn new(store: Arc<dyn TokenStore>, connection: ConnectionConfig) -> TokenResult<Self> {
        Ok(Self {
            store,
            service_accounts: Arc::new(NoServiceAccount),
            secrets: Arc::new(InMemorySecretStore::new()),
            auth_client: AuthServerClient::with_retry(
                connection.retry.as_ref().map(RetrySettings::from).unwrap_or_default(),
            )?,
            implicit_flow: ImplicitFlowAcquirer::new(Arc::new(SystemBrowser), ImplicitFlowSettings::default()),
            connection,
            service_token_ttl: SERVICE_TOKEN_NOMINAL_TTL_SECONDS,
            remember_password: true,
        })
    }

    /// Token store in the user profile, environment credentials, OS keyring.
    pub fn for_current_user(connection: ConnectionConfig) -> TokenResult<Self> {
        Ok(Self::new(Arc::new(YamlTokenStore::for_current_user()?), connection)?
            .with_service_accounts(Arc::new(AmbientCredentials::from_env()))
            .with_secret_store(Arc::new(KeyringSecretStore::default())))
    }

    pub fn with_service_accounts(mut self, source: Arc<dyn ServiceAccountSource>) -> Self {
        self.service_accounts = source;
        self
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_auth_client(mut self, auth_client: AuthServerClient) -> Self {
        self.auth_client = auth_client;
        self
    }

    pub fn with_implicit_flow(mut self, implicit_flow: ImplicitFlowAcquirer) -> Self {
        self.implicit_flow = implicit_flow;
        self
    }

    pub fn with_service_token_ttl(mut self, seconds: u64) -> Self {
        self.service_token_ttl = seconds;
        self
    }

    pub fn with_remember_password(mut self, remember: bool) -> Self {
        self.remember_password = remember;
        self
    }

    pub fn set_connection(&mut self, connection: ConnectionConfig) {
        self.connection = connection;
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Cached token if still valid, else service account, else password grant.
    pub async fn get_named_token(&self, request: &NamedTokenRequest) -> TokenResult<TokenRecord> {
        if !request.refresh {
            if let Some(record) = self.cached_or_service_token(request.name.as_deref()).await? {
                return Ok(record);
            }
        }
        let credentials = self.password_credentials(request)?;
        self.acquire_with_password(request, credentials).await
    }

    /// Access token for `name`, falling back to the browser flow when the
    /// password grant cannot be used.
    pub async fn get_token(&self, name: &str, scope: &[String]) -> TokenResult<String> {
        if let Some(record) = self.cached_or_service_token(Some(name)).await? {
            return Ok(record.access_token);
        }

        let request = NamedTokenRequest::named(name, scope.to_vec());
        let record = match self.password_credentials(&request) {
            Ok(credentials) => self.acquire_with_password(&request, credentials).await?,
            Err(TokenError::MissingConfiguration(_)) | Err(TokenError::MissingPassword(_)) => {
                debug!("password grant not applicable for '{}', using implicit flow", name);
                self.acquire_implicit(Some(name)).await?
            }
            Err(err) => return Err(err),
        };
        Ok(record.access_token)
    }

    /// Browser implicit flow, reusing a stored refresh token when possible.
    pub async fn get_token_implicit_flow(&self, name: Option<&str>, refresh: bool) -> TokenResult<TokenRecord> {
        if let (Some(name), false) = (name, refresh) {
            if let Some(record) = self.store.get(name).await?.filter(is_valid) {
                debug!("token '{}' served from cache", name);
                return Ok(record);
            }
        }
        self.acquire_implicit(name).await
    }

    async fn cached_or_service_token(&self, name: Option<&str>) -> TokenResult<Option<TokenRecord>> {
        let Some(name) = name else {
            return Ok(None);
        };

        match self.store.get(name).await? {
            Some(record) if is_valid(&record) => {
                debug!("token '{}' served from cache", name);
                return Ok(Some(record));
            }
            Some(_) => debug!("cached token '{}' expires too soon", name),
            None => debug!("no cached token '{}'", name),
        }

        match self.service_accounts.get(name)? {
            ServiceAccountOutcome::Token(access_token) => {
                let record = TokenRecord::issued_now(access_token, Some(self.service_token_ttl));
                self.store.put(name, record.clone()).await?;
                info!("token '{}' taken from service account credentials", name);
                Ok(Some(record))
            }
            ServiceAccountOutcome::NotConfigured => {
                debug!("no service account credentials for '{}'", name);
                Ok(None)
            }
        }
    }

    fn password_credentials(&self, request: &NamedTokenRequest) -> TokenResult<Credentials> {
        let overrides = ConnectionConfig {
            url: request.url.clone(),
            user: request.user.clone(),
            ..ConnectionConfig::default()
        };
        let connection = self.connection.overlay(&overrides);
        let missing = connection.missing_fields(PASSWORD_GRANT_FIELDS);
        if !missing.is_empty() {
            return Err(TokenError::MissingConfiguration(missing));
        }
        let url = connection.get(ConnectionField::Url).unwrap_or_default().to_owned();
        let user = connection.get(ConnectionField::User).unwrap_or_default().to_owned();

        if let Some(password) = request.password.clone().filter(|p| !p.is_empty()) {
            return Ok(Credentials {
                url,
                user,
                password,
                supplied: true,
            });
        }
        let recalled = self.secrets.get_password(&user).unwrap_or_else(|err| {
            warn!("could not read remembered password: {}", err);
            None
        });
        match recalled {
            Some(password) => Ok(Credentials {
                url,
                user,
                password,
                supplied: false,
            }),
            None => Err(TokenError::MissingPassword(user)),
        }
    }

    async fn acquire_with_password(
        &self,
        request: &NamedTokenRequest,
        credentials: Credentials,
    ) -> TokenResult<TokenRecord> {
        let record = self
            .auth_client
            .request_token(&PasswordGrant {
                url: &credentials.url,
                realm: request.realm.as_deref(),
                scope: &request.scope,
                user: &credentials.user,
                password: &credentials.password,
            })
            .await?;

        self.store_named(request.name.as_deref(), &record).await?;

        if credentials.supplied && self.remember_password {
            if let Err(err) = self.secrets.set_password(&credentials.user, &credentials.password) {
                warn!("could not remember password for '{}': {}", credentials.user, err);
            }
        }
        Ok(record)
    }

    async fn acquire_implicit(&self, name: Option<&str>) -> TokenResult<TokenRecord> {
        let connection = self
            .connection
            .implicit_flow()
            .map_err(TokenError::MissingConfiguration)?;

        let existing = match name {
            Some(name) => self.store.get(name).await?,
            None => None,
        };
        if let Some(refresh_token) = existing.and_then(|record| record.refresh_token) {
            let refreshed = self
                .auth_client
                .refresh_token(&RefreshGrant {
                    token_url: &connection.token_url,
                    client_id: &connection.client_id,
                    business_partner_id: &connection.business_partner_id,
                    refresh_token: &refresh_token,
                })
                .await;
            match refreshed {
                Ok(record) => {
                    self.store_named(name, &record).await?;
                    return Ok(record);
                }
                Err(err @ TokenError::AuthenticationFailed(_)) | Err(err @ TokenError::ServerError { .. }) => {
                    warn!("refresh token rejected, signing in again: {}", err);
                }
                Err(err) => return Err(err),
            }
        }

        let record = self.implicit_flow.acquire(&connection).await?;
        self.store_named(name, &record).await?;
        Ok(record)
    }

    async fn store_named(&self, name: Option<&str>, record: &TokenRecord) -> TokenResult<()> {
        match name {
            Some(name) => self.store.put(name, record.clone()).await,
            None => Ok(()),
        }
    }
}
