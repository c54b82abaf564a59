use std::io::ErrorKind;
use std::path::PathBuf;

use regex::Regex;
use tracing::{debug, error, info};

use crate::config::connection::ConnectionConfig;
use crate::error::{TokenError, TokenResult};

/// Layered per-user configuration, addressed by component id.
pub trait ConfigProvider: Send + Sync {
    fn load(&self, component_id: &str) -> TokenResult<ConnectionConfig>;
    fn store(&self, component_id: &str, config: &ConnectionConfig) -> TokenResult<()>;
}

/// `<base>/<component>/<component>.yaml`
#[derive(Debug, Clone)]
pub struct YamlConfigProvider {
    base_dir: PathBuf,
}

impl YamlConfigProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn for_current_user() -> TokenResult<Self> {
        dirs::config_dir()
            .map(Self::new)
            .ok_or_else(|| TokenError::Storage("cannot determine user config directory".to_owned()))
    }

    pub fn path_for(&self, component_id: &str) -> PathBuf {
        self.base_dir
            .join(component_id)
            .join(format!("{}.yaml", component_id))
    }
}

impl ConfigProvider for YamlConfigProvider {
    fn load(&self, component_id: &str) -> TokenResult<ConnectionConfig> {
        let path = self.path_for(component_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {}, starting empty", path.display());
                return Ok(ConnectionConfig::default());
            }
            Err(err) => {
                return Err(TokenError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        parse_config(&expand_env_vars(&content))
    }

    fn store(&self, component_id: &str, config: &ConnectionConfig) -> TokenResult<()> {
        let path = self.path_for(component_id);
        let content = serde_yaml::to_string(config)
            .map_err(|err| TokenError::Storage(format!("failed to serialize config: {}", err)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                TokenError::Storage(format!("failed to create {}: {}", parent.display(), err))
            })?;
        }
        std::fs::write(&path, content)
            .map_err(|err| TokenError::Storage(format!("failed to write {}: {}", path.display(), err)))?;
        info!("configuration stored in {}", path.display());
        Ok(())
    }
}

pub fn parse_config(content: &str) -> TokenResult<ConnectionConfig> {
    if content.trim().is_empty() {
        return Ok(ConnectionConfig::default());
    }
    serde_yaml::from_str::<Option<ConnectionConfig>>(content)
        .map(Option::unwrap_or_default)
        .inspect_err(|e| error!("parse config error: {}", e))
        .map_err(|err| TokenError::Storage(format!("invalid config format: {}", err)))
}

/// `${VAR}` / `${VAR:default}` from the process environment.
pub fn expand_env_vars(input: &str) -> String {
    let re = match Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}") {
        Ok(re) => re,
        Err(_) => return input.to_owned(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
