use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use common::{BackendApi, Credential, Credentials, Result};

/// In-memory holder of the backend bearer token.
///
/// The mutex is held across the login call, so concurrent callers that find
/// the cache empty wait for one login instead of each starting their own.
/// Tokens are never written anywhere but this struct.
pub struct CredentialCache {
    backend: Arc<dyn BackendApi>,
    credentials: Credentials,
    current: Mutex<Option<Arc<Credential>>>,
}

impl CredentialCache {
    pub fn new(backend: Arc<dyn BackendApi>, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials,
            current: Mutex::new(None),
        }
    }

    /// Return the cached credential, logging in first if there is none.
    pub async fn ensure_token(&self) -> Result<Arc<Credential>> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            return Ok(credential.clone());
        }
        let fresh = self.login().await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Replace `stale` after the backend refused it.
    ///
    /// If another caller already swapped in a newer credential, that one is
    /// returned and no login happens.
    pub async fn reauthenticate(&self, stale: &Arc<Credential>) -> Result<Arc<Credential>> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref() {
            if !Arc::ptr_eq(credential, stale) {
                debug!("Credential already refreshed by another caller");
                return Ok(credential.clone());
            }
        }
        *current = None;
        let fresh = self.login().await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// Forget the cached credential; the next `ensure_token` logs in again.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    pub async fn cached(&self) -> Option<Arc<Credential>> {
        self.current.lock().await.clone()
    }

    async fn login(&self) -> Result<Arc<Credential>> {
        info!(username = %self.credentials.username, "Logging in to backend");
        let credential = self.backend.login(&self.credentials).await?;
        Ok(Arc::new(credential))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use common::{BackendOrderId, Error, OrderRecord, StatusUpdate};

    use super::*;

    /// Issues `token-1`, `token-2`, ... and counts logins.
    #[derive(Default)]
    struct CountingBackend {
        logins: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl BackendApi for CountingBackend {
        async fn login(&self, _credentials: &Credentials) -> Result<Credential> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.reject {
                return Err(Error::Auth {
                    url: "fake".into(),
                    status: 401,
                    body: "invalid credentials".into(),
                });
            }
            Ok(Credential::new(format!("token-{n}")))
        }

        async fn create_order(&self, _: &OrderRecord, _: &str) -> Result<BackendOrderId> {
            unreachable!("not used by the cache")
        }

        async fn update_order_status(
            &self,
            _: &BackendOrderId,
            _: &StatusUpdate,
            _: &str,
        ) -> Result<()> {
            unreachable!("not used by the cache")
        }
    }

    fn cache(backend: Arc<CountingBackend>) -> CredentialCache {
        CredentialCache::new(backend, Credentials::new("ops", "pw"))
    }

    #[tokio::test]
    async fn token_is_reused_across_calls() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(backend.clone());

        let first = cache.ensure_token().await.unwrap();
        let second = cache.ensure_token().await.unwrap();

        assert_eq!(first.token(), "token-1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let backend = Arc::new(CountingBackend::default());
        let cache = Arc::new(cache(backend.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.ensure_token().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().token(), "token-1");
        }
        assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reauthenticate_replaces_stale_token() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(backend.clone());

        let stale = cache.ensure_token().await.unwrap();
        let fresh = cache.reauthenticate(&stale).await.unwrap();

        assert_eq!(fresh.token(), "token-2");
        assert_eq!(cache.cached().await.unwrap().token(), "token-2");
        assert_eq!(backend.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reauthenticate_skips_login_when_already_refreshed() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(backend.clone());

        let stale = cache.ensure_token().await.unwrap();
        let first = cache.reauthenticate(&stale).await.unwrap();
        let second = cache.reauthenticate(&stale).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_login_leaves_cache_empty() {
        let backend = Arc::new(CountingBackend {
            reject: true,
            ..Default::default()
        });
        let cache = cache(backend.clone());

        assert!(cache.ensure_token().await.unwrap_err().is_auth());
        assert!(cache.cached().await.is_none());

        // The next demand tries again rather than caching the failure.
        let _ = cache.ensure_token().await;
        assert_eq!(backend.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_next_login() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(backend.clone());

        cache.ensure_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.ensure_token().await.unwrap().token(), "token-2");
    }
}
