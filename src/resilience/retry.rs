use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::settings::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 1000,
        }
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(cfg: &RetryConfig) -> Self {
        let defaults = RetrySettings::default();
        Self {
            attempts: cfg.attempts.unwrap_or(defaults.attempts).max(1),
            base_delay_ms: cfg.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: cfg.max_delay_ms.unwrap_or(defaults.max_delay_ms),
        }
    }
}

impl RetrySettings {
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails with an error `should_retry`
    /// rejects, or attempts are exhausted.
    pub async fn run_with_retry<F, Fut, T, E, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms.min(self.max_delay_ms);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && should_retry(&e) => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = delay.saturating_mul(2).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        error!("all {attempt} attempts failed: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}
