use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::token::TokenRecord;
use crate::config::connection::ImplicitFlowConnection;
use crate::error::{TokenError, TokenResult};
use crate::sources::response::split_scope;
use crate::utils::constants::DEFAULT_REDIRECT_TIMEOUT_SECS;

type RedirectParams = HashMap<String, String>;

/// Grace period for in-flight responses before the listener task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Authentication</title></head>
<body>
<p id="status">Completing sign-in...</p>
<script>
if (window.location.hash.length > 1) {
    window.location.replace(window.location.pathname + '?' + window.location.hash.substring(1));
} else {
    document.getElementById('status').innerText = 'No token was received. Please retry from your terminal.';
}
</script>
</body></html>"#;

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Authentication</title></head>
<body><p>Sign-in complete. You can close this window and return to your terminal.</p></body></html>"#;

/// Launches the user's browser. Fire-and-forget: a failure is only reported.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        open::that_detached(url).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Listening,
    Captured,
    TimedOut,
}

#[derive(Clone)]
struct RedirectState {
    // single slot, fulfilled at most once
    slot: Arc<Mutex<Option<oneshot::Sender<RedirectParams>>>>,
}

/// Loopback HTTP listener that captures exactly one redirect.
///
/// The server task is torn down on every exit path: after `wait` returns and,
/// as a last resort, on drop.
pub struct RedirectListener {
    addr: SocketAddr,
    state: FlowState,
    captured: oneshot::Receiver<RedirectParams>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl RedirectListener {
    /// Bind on 127.0.0.1; port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> TokenResult<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| TokenError::Listener(format!("failed to bind 127.0.0.1:{}: {}", port, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| TokenError::Listener(e.to_string()))?;

        let (captured_tx, captured) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = RedirectState {
            slot: Arc::new(Mutex::new(Some(captured_tx))),
        };
        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(state);

        let server = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                warn!("redirect listener stopped with error: {}", err);
            }
        });

        debug!("redirect listener on {}", addr);
        Ok(Self {
            addr,
            state: FlowState::Listening,
            captured,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.addr.port())
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Block until the redirect arrives or `timeout` elapses; the listener is
    /// shut down before returning either way.
    pub async fn wait(&mut self, timeout: Duration) -> TokenResult<RedirectParams> {
        let outcome = tokio::time::timeout(timeout, &mut self.captured).await;
        self.shutdown().await;

        match outcome {
            Ok(Ok(params)) => {
                self.state = FlowState::Captured;
                info!("authorization redirect captured");
                Ok(params)
            }
            Ok(Err(_)) => {
                self.state = FlowState::TimedOut;
                Err(TokenError::Listener("redirect listener stopped before capturing a redirect".to_owned()))
            }
            Err(_) => {
                self.state = FlowState::TimedOut;
                warn!("no authorization redirect within {}s", timeout.as_secs());
                Err(TokenError::Timeout(timeout))
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                server.abort();
                let _ = server.await;
            }
        }
        debug!("redirect listener on {} shut down", self.addr);
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn handle_redirect(State(state): State<RedirectState>, Query(params): Query<RedirectParams>) -> Response {
    if !params.contains_key("access_token") && !params.contains_key("error") {
        return Html(LANDING_PAGE).into_response();
    }
    let sender = state.slot.lock().ok().and_then(|mut slot| slot.take());
    match sender {
        Some(tx) => {
            let _ = tx.send(params);
            Html(SUCCESS_PAGE).into_response()
        }
        None => (StatusCode::GONE, "redirect already captured").into_response(),
    }
}

#[derive(Debug, Clone)]
pub struct ImplicitFlowSettings {
    /// 0 binds an ephemeral port
    pub port: u16,
    pub timeout: Duration,
}

impl Default for ImplicitFlowSettings {
    fn default() -> Self {
        Self {
            port: 0,
            timeout: Duration::from_secs(DEFAULT_REDIRECT_TIMEOUT_SECS),
        }
    }
}

/// Browser-based implicit grant: open the authorize URL, capture the redirect.
#[derive(Clone)]
pub struct ImplicitFlowAcquirer {
    browser: Arc<dyn BrowserLauncher>,
    settings: ImplicitFlowSettings,
}

impl ImplicitFlowAcquirer {
    pub fn new(browser: Arc<dyn BrowserLauncher>, settings: ImplicitFlowSettings) -> Self {
        Self { browser, settings }
    }

    pub async fn acquire(&self, connection: &ImplicitFlowConnection) -> TokenResult<TokenRecord> {
        let mut listener = RedirectListener::bind(self.settings.port).await?;
        let url = authorize_url(connection, &listener.redirect_uri())?;

        info!("opening browser for sign-in: {}", url);
        if let Err(err) = self.browser.open(url.as_str()) {
            warn!("could not open a browser ({}), please visit {}", err, url);
        }

        let params = listener.wait(self.settings.timeout).await?;
        record_from_redirect(&params)
    }
}

pub fn authorize_url(connection: &ImplicitFlowConnection, redirect_uri: &str) -> TokenResult<Url> {
    Url::parse_with_params(
        &connection.authorize_url,
        &[
            ("response_type", "token"),
            ("business_partner_id", connection.business_partner_id.as_str()),
            ("client_id", connection.client_id.as_str()),
            ("redirect_uri", redirect_uri),
        ],
    )
    .map_err(|e| {
        TokenError::InvalidConfiguration(format!(
            "authorize_url '{}' is not a valid URL: {}",
            connection.authorize_url, e
        ))
    })
}

pub fn record_from_redirect(params: &RedirectParams) -> TokenResult<TokenRecord> {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        return Err(TokenError::AuthenticationFailed(format!(
            "authorization error {}{}",
            error, description
        )));
    }
    let access_token = params
        .get("access_token")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TokenError::server(None, "authorization redirect is missing access_token"))?;

    Ok(
        TokenRecord::issued_now(
            access_token.to_owned(),
            params.get("expires_in").and_then(|v| v.trim().parse().ok()),
        )
        .with_refresh_token(params.get("refresh_token").cloned())
        .with_token_type(params.get("token_type").cloned())
        .with_scope(params.get("scope").map(|s| split_scope(s))),
    )
}
