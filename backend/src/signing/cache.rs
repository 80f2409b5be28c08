use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{CredentialDelegator, DelegationError, SigningIdentity};

/// Identities must outlive the caller's window by this many minutes to be reused
pub const DEFAULT_REFRESH_MARGIN_MINUTES: i64 = 5;

/// Reuses a delegated identity while it can still back the caller's window
///
/// A cached identity is handed out only if it stays valid for the requested lifetime
/// plus `refresh_margin`; otherwise a new one is exchanged for that lifetime.
/// Concurrent callers that find the cache stale wait on a single refresh instead of
/// each performing their own credential exchange.
pub struct CachedDelegator {
    inner: Arc<dyn CredentialDelegator>,
    cached: RwLock<Option<SigningIdentity>>,
    refresh_lock: Mutex<()>,
    refresh_margin: Duration,
}

impl CachedDelegator {
    /// Wraps `inner`, refreshing identities within `refresh_margin` of expiry
    #[must_use]
    pub fn new(inner: Arc<dyn CredentialDelegator>, refresh_margin: Duration) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_margin,
        }
    }

    /// Drops the cached identity; the next call performs a fresh exchange
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    async fn fresh_cached(&self, required: Duration) -> Option<SigningIdentity> {
        let cached = self.cached.read().await.clone();
        cached.filter(|identity| identity.is_fresh_at(Utc::now(), required))
    }
}

#[async_trait]
impl CredentialDelegator for CachedDelegator {
    async fn acquire_signing_identity_for(
        &self,
        min_lifetime: Duration,
    ) -> Result<SigningIdentity, DelegationError> {
        let required = min_lifetime.max(Duration::zero()) + self.refresh_margin;

        if let Some(identity) = self.fresh_cached(required).await {
            return Ok(identity);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we were waiting
        if let Some(identity) = self.fresh_cached(required).await {
            return Ok(identity);
        }

        let identity = self.inner.acquire_signing_identity_for(required).await?;
        tracing::info!(
            principal = identity.principal(),
            expires_at = %identity.expires_at(),
            "Refreshed delegated signing identity"
        );

        *self.cached.write().await = Some(identity.clone());
        Ok(identity)
    }
}
