//! Bearer token cache for the gateway's client-credentials flow.
//!
//! Reads share a read lock. A refresh is serialized by an async mutex and
//! re-checks the cache after acquiring it, so callers that queued behind an
//! in-flight refresh reuse its token instead of fetching their own.

use std::future::Future;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock};

use crate::domain::foundation::Timestamp;
use crate::domain::payment::GatewayError;

/// Default safety margin: refresh when fewer than 5 minutes remain.
pub const DEFAULT_TOKEN_MARGIN_SECS: i64 = 300;

/// Token as issued by the token endpoint.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: SecretString,
    pub expires_in_secs: i64,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: Timestamp,
}

impl CachedToken {
    fn is_usable_at(&self, now: &Timestamp, margin: Duration) -> bool {
        now.plus(margin).is_before(&self.expires_at)
    }
}

/// Cached bearer token with expiry tracking.
pub struct TokenCache {
    margin: Duration,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TOKEN_MARGIN_SECS))
    }
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            margin,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Returns the cached token, or obtains a new one with `fetch`.
    ///
    /// At most one `fetch` runs at a time. A failed fetch leaves the cache
    /// as it was.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, GatewayError>>,
    {
        if let Some(token) = self.usable().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.usable().await {
            return Ok(token);
        }

        let issued = fetch().await?;
        let expires_at = Timestamp::now().plus(Duration::seconds(issued.expires_in_secs));
        tracing::debug!(
            expires_in_secs = issued.expires_in_secs,
            "gateway auth token refreshed"
        );
        let token = issued.access_token.expose_secret().clone();
        *self.cached.write().await = Some(CachedToken {
            access_token: issued.access_token,
            expires_at,
        });
        Ok(token)
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        if self.cached.write().await.take().is_some() {
            tracing::debug!("gateway auth token invalidated");
        }
    }

    async fn usable(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| t.is_usable_at(&Timestamp::now(), self.margin))
            .map(|t| t.access_token.expose_secret().clone())
    }
}
