use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::token::TokenRecord;
use crate::error::{TokenError, TokenResult};
use crate::utils::constants::{APP_DIR_NAME, TOKENS_FILE_NAME};

/// Named token records, keyed by the caller-chosen token name.
pub type TokenMap = BTreeMap<String, TokenRecord>;

/// Persisted mapping from token name to its record.
///
/// Implementations load the whole set on every call; there is no cross-process
/// locking, so two concurrent writers may lose an update.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Full persisted set, empty when nothing was stored yet.
    async fn get_all(&self) -> TokenResult<TokenMap>;

    async fn get(&self, name: &str) -> TokenResult<Option<TokenRecord>> {
        Ok(self.get_all().await?.remove(name))
    }

    /// Upsert and persist immediately.
    async fn put(&self, name: &str, record: TokenRecord) -> TokenResult<()>;

    /// Remove `name` if present. Absent names are not an error.
    async fn delete(&self, name: &str) -> TokenResult<()>;
}

/// ================================
/// YAML file in the user profile
/// ================================
#[derive(Debug, Clone)]
pub struct YamlTokenStore {
    path: PathBuf,
}

impl YamlTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/token-broker/tokens.yaml` for the current user.
    pub fn for_current_user() -> TokenResult<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR_NAME).join(TOKENS_FILE_NAME)))
            .ok_or_else(|| TokenError::Storage("cannot determine user config directory".to_owned()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, tokens: &TokenMap) -> TokenResult<()> {
        let content = serde_yaml::to_string(tokens)
            .map_err(|err| storage_err("serialize token store", &self.path, err))?;
        write_atomically(&self.path, content.as_bytes()).await
    }
}

#[async_trait]
impl TokenStore for YamlTokenStore {
    async fn get_all(&self) -> TokenResult<TokenMap> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("token store {} does not exist yet", self.path.display());
                return Ok(TokenMap::new());
            }
            Err(err) => return Err(storage_err("read", &self.path, err)),
        };
        if content.trim().is_empty() {
            return Ok(TokenMap::new());
        }
        serde_yaml::from_str::<Option<TokenMap>>(&content)
            .map(Option::unwrap_or_default)
            .map_err(|err| storage_err("parse", &self.path, err))
    }

    async fn put(&self, name: &str, record: TokenRecord) -> TokenResult<()> {
        let mut tokens = self.get_all().await?;
        tokens.insert(name.to_owned(), record);
        self.save(&tokens).await?;
        info!("token '{}' stored in {}", name, self.path.display());
        Ok(())
    }

    async fn delete(&self, name: &str) -> TokenResult<()> {
        let mut tokens = self.get_all().await?;
        if tokens.remove(name).is_none() {
            debug!("token '{}' not present, nothing to delete", name);
            return Ok(());
        }
        self.save(&tokens).await?;
        info!("token '{}' deleted", name);
        Ok(())
    }
}

/// tmp file created 0600 -> fsync -> rename. The tmp file is removed when
/// any step after its creation fails.
pub(crate) async fn write_atomically(path: &Path, content: &[u8]) -> TokenResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| storage_err("create directory for", path, err))?;
    }
    let tmp = path.with_extension("tmp");
    // leftover from an interrupted write
    if fs::remove_file(&tmp).await.is_ok() {
        debug!("removed stale {}", tmp.display());
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(&tmp)
        .await
        .map_err(|err| storage_err("create", &tmp, err))?;

    let written = async {
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!("failed to remove {}: {}", tmp.display(), cleanup);
        }
        return Err(storage_err("replace", path, err));
    }
    Ok(())
}

fn storage_err(action: &str, path: &Path, err: impl std::fmt::Display) -> TokenError {
    TokenError::Storage(format!("failed to {} {}: {}", action, path.display(), err))
}

/// ================================
/// In-memory store
/// ================================
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    inner: Arc<RwLock<TokenMap>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_all(&self) -> TokenResult<TokenMap> {
        Ok(self.inner.read().await.clone())
    }

    async fn get(&self, name: &str) -> TokenResult<Option<TokenRecord>> {
        Ok(self.inner.read().await.get(name).cloned())
    }

    async fn put(&self, name: &str, record: TokenRecord) -> TokenResult<()> {
        self.inner.write().await.insert(name.to_owned(), record);
        Ok(())
    }

    async fn delete(&self, name: &str) -> TokenResult<()> {
        self.inner.write().await.remove(name);
        Ok(())
    }
}
