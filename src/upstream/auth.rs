use crate::config::TIMEOUT_AUTH;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Pluggable source of upstream bearer tokens. Deployments with OAuth plug
/// their refresh flow in here; the default is the configured static key.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(GatewayError::MissingCredentials(
                "bearer token not configured".to_string(),
            ));
        }
        Ok(self.token.clone())
    }
}

/// Cached bearer token shared by all in-flight requests.
///
/// The mutex is held across the refresh call, so concurrent cache misses
/// (e.g. several requests hitting 401 at once) coalesce onto a single
/// fetch; the rest wake up and read the refreshed token.
pub struct BearerAuth {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<String>>,
}

impl BearerAuth {
    pub fn new(source: Box<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = tokio::time::timeout(TIMEOUT_AUTH, self.source.fetch())
            .await
            .map_err(|_| GatewayError::Timeout("token refresh".to_string()))??;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token; the next `token()` call refreshes.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}
