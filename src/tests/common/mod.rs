// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::cache::token::TokenRecord;
use crate::cache::token_store::{TokenMap, TokenStore};
use crate::error::{TokenError, TokenResult};
use crate::helpers::time::now_u64;
use crate::resilience::retry::RetrySettings;
use crate::sources::implicit_flow::BrowserLauncher;
use crate::sources::password_grant::AuthServerClient;
use crate::sources::service_account::{ServiceAccountOutcome, ServiceAccountSource};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Auth client without transport retries so failing tests stay fast.
pub fn auth_client() -> AuthServerClient {
    AuthServerClient::new(build_reqwest_client(), RetrySettings::no_retry())
}

/// Record created `age` seconds ago, living `ttl` seconds.
pub fn record_aged(token: &str, age: u64, ttl: u64) -> TokenRecord {
    TokenRecord {
        creation_time: Some(now_u64() - age),
        expires_in: Some(ttl),
        ..TokenRecord::bare(token)
    }
}

pub fn scope(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// ================================
/// Token store doubles
/// ================================

/// Empty store whose writes always fail.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyStore;

#[async_trait]
impl TokenStore for ReadOnlyStore {
    async fn get_all(&self) -> TokenResult<TokenMap> {
        Ok(TokenMap::new())
    }

    async fn put(&self, _name: &str, _record: TokenRecord) -> TokenResult<()> {
        Err(TokenError::Storage("failed to replace tokens.yaml: read-only file system".to_owned()))
    }

    async fn delete(&self, _name: &str) -> TokenResult<()> {
        Ok(())
    }
}

/// ================================
/// Service account doubles
/// ================================
#[derive(Debug, Clone)]
pub enum ServiceBehaviour {
    Token(&'static str),
    NotConfigured,
    Broken,
}

#[derive(Debug, Clone)]
pub struct FakeServiceAccount {
    behaviour: ServiceBehaviour,
    pub calls: Arc<AtomicUsize>,
}

impl FakeServiceAccount {
    pub fn new(behaviour: ServiceBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ServiceAccountSource for FakeServiceAccount {
    fn get(&self, _name: &str) -> TokenResult<ServiceAccountOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            ServiceBehaviour::Token(token) => Ok(ServiceAccountOutcome::Token(token.to_string())),
            ServiceBehaviour::NotConfigured => Ok(ServiceAccountOutcome::NotConfigured),
            ServiceBehaviour::Broken => Err(TokenError::ServiceAccount("credentials unreadable".to_owned())),
        }
    }
}

/// ================================
/// Browser doubles
/// ================================

/// Records the opened URL and does nothing else.
#[derive(Debug, Clone, Default)]
pub struct IdleBrowser {
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl BrowserLauncher for IdleBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        self.opened.lock().unwrap().push(url.to_owned());
        Ok(())
    }
}

/// Plays the authorization server: follows `redirect_uri` with the given
/// query parameters, the way the landing page script does.
#[derive(Debug, Clone, Default)]
pub struct RedirectingBrowser {
    pub params: Vec<(String, String)>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl RedirectingBrowser {
    pub fn with_params(params: &[(&str, &str)]) -> Self {
        Self {
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            opened: Arc::default(),
        }
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        self.opened.lock().unwrap().push(url.to_owned());
        let authorize = Url::parse(url).map_err(|e| e.to_string())?;
        let query: HashMap<String, String> = authorize.query_pairs().into_owned().collect();
        let redirect = Url::parse(query.get("redirect_uri").ok_or("no redirect_uri")?).map_err(|e| e.to_string())?;
        let port = redirect.port().ok_or("no port in redirect_uri")?;

        let mut target = Url::parse(&format!("http://127.0.0.1:{}/", port)).map_err(|e| e.to_string())?;
        target.query_pairs_mut().extend_pairs(self.params.iter());
        tokio::spawn(async move {
            let _ = build_reqwest_client().get(target).send().await;
        });
        Ok(())
    }
}

/// Browser that cannot be launched.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingBrowser;

impl BrowserLauncher for MissingBrowser {
    fn open(&self, _url: &str) -> Result<(), String> {
        Err("no browser available".to_owned())
    }
}
