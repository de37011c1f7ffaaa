//! 凭证存储：访问令牌与刷新令牌在两个后端间冗余保存。
//!
//! # Credential Store
//!
//! Persists the access/refresh pair in two backends so a restart does not lose
//! the session. Reads prefer the primary backend (the short-lived cookie-like
//! store) and fall back to the secondary (durable) one; when the fallback is
//! used, the value is written back to the primary on a best-effort basis.
//!
//! Writes and clears hold the store's lock for their whole duration, and a
//! failed write restores both backends to what they held before, so no caller
//! ever observes a half-written pair.
//!
//! The store is loaded on first read and torn down explicitly with
//! [`CredentialStore::clear`] (logout, unrecoverable refresh failure).
//!
//! ```rust
//! use boxoffice_client::credentials::{CredentialPair, CredentialStore};
//!
//! # tokio_test::block_on(async {
//! let store = CredentialStore::in_memory();
//! store.write(&CredentialPair::new("access", Some("refresh".into()))).await?;
//! assert_eq!(store.access_token().await?.as_deref(), Some("access"));
//! store.clear().await?;
//! assert!(store.read().await?.is_none());
//! # Ok::<(), boxoffice_client::Error>(())
//! # }).unwrap();
//! ```

mod backend;

pub use backend::{CredentialBackend, KeyringBackend, MemoryBackend};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub struct CredentialStore {
    primary: Arc<dyn CredentialBackend>,
    secondary: Arc<dyn CredentialBackend>,
    /// `None` until first read.
    cached: Mutex<Option<Option<CredentialPair>>>,
}

impl CredentialStore {
    pub fn new(primary: Arc<dyn CredentialBackend>, secondary: Arc<dyn CredentialBackend>) -> Self {
        Self {
            primary,
            secondary,
            cached: Mutex::new(None),
        }
    }

    /// Two independent in-memory backends.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new()))
    }

    pub async fn read(&self) -> Result<Option<CredentialPair>> {
        let mut cached = self.cached.lock().await;
        if let Some(pair) = cached.as_ref() {
            return Ok(pair.clone());
        }
        let pair = self.load().await?;
        *cached = Some(pair.clone());
        Ok(pair)
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.read().await?.map(|p| p.access_token))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.read().await?.and_then(|p| p.refresh_token))
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.read().await, Ok(Some(_)))
    }

    /// Persist to both backends, or to neither.
    pub async fn write(&self, pair: &CredentialPair) -> Result<()> {
        let mut cached = self.cached.lock().await;

        let before_primary = read_backend(self.primary.as_ref()).await.ok().flatten();
        let before_secondary = read_backend(self.secondary.as_ref()).await.ok().flatten();

        let written = async {
            write_backend(self.primary.as_ref(), pair).await?;
            write_backend(self.secondary.as_ref(), pair).await
        }
        .await;

        if let Err(e) = written {
            warn!("credential write failed, restoring previous state: {}", e);
            restore_backend(self.primary.as_ref(), before_primary.as_ref()).await;
            restore_backend(self.secondary.as_ref(), before_secondary.as_ref()).await;
            // Force a reload so the cache reflects whatever actually survived.
            *cached = None;
            return Err(e);
        }

        *cached = Some(Some(pair.clone()));
        debug!("credentials written");
        Ok(())
    }

    /// Remove from both backends. The cached pair is dropped even if a backend fails.
    pub async fn clear(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        *cached = Some(None);
        let primary = clear_backend(self.primary.as_ref()).await;
        let secondary = clear_backend(self.secondary.as_ref()).await;
        debug!("credentials cleared");
        primary.and(secondary)
    }

    async fn load(&self) -> Result<Option<CredentialPair>> {
        match read_backend(self.primary.as_ref()).await {
            Ok(Some(pair)) => return Ok(Some(pair)),
            Ok(None) => {}
            Err(e) => warn!(
                backend = self.primary.name(),
                "primary credential read failed, falling back: {}", e
            ),
        }

        let pair = read_backend(self.secondary.as_ref()).await?;
        if let Some(ref pair) = pair {
            if let Err(e) = write_backend(self.primary.as_ref(), pair).await {
                warn!(backend = self.primary.name(), "credential read-repair failed: {}", e);
            }
        }
        Ok(pair)
    }
}

async fn read_backend(b: &dyn CredentialBackend) -> Result<Option<CredentialPair>> {
    let Some(access_token) = b.get(ACCESS_TOKEN_KEY).await? else {
        return Ok(None);
    };
    let refresh_token = b.get(REFRESH_TOKEN_KEY).await?;
    Ok(Some(CredentialPair {
        access_token,
        refresh_token,
    }))
}

async fn write_backend(b: &dyn CredentialBackend, pair: &CredentialPair) -> Result<()> {
    b.set(ACCESS_TOKEN_KEY, &pair.access_token).await?;
    match &pair.refresh_token {
        Some(t) => b.set(REFRESH_TOKEN_KEY, t).await,
        None => b.remove(REFRESH_TOKEN_KEY).await,
    }
}

async fn clear_backend(b: &dyn CredentialBackend) -> Result<()> {
    let access = b.remove(ACCESS_TOKEN_KEY).await;
    let refresh = b.remove(REFRESH_TOKEN_KEY).await;
    access.and(refresh)
}

async fn restore_backend(b: &dyn CredentialBackend, previous: Option<&CredentialPair>) {
    let restored = match previous {
        Some(pair) => write_backend(b, pair).await,
        None => clear_backend(b).await,
    };
    if let Err(e) = restored {
        warn!(backend = b.name(), "credential rollback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pair(a: &str, r: &str) -> CredentialPair {
        CredentialPair::new(a, Some(r.to_string()))
    }

    #[tokio::test]
    async fn test_roundtrip_and_clear() {
        let primary = Arc::new(MemoryBackend::new());
        let secondary = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(primary.clone(), secondary.clone());

        store.write(&pair("a1", "r1")).await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(pair("a1", "r1")));
        assert_eq!(primary.len(), 2);
        assert_eq!(secondary.len(), 2);

        store.clear().await.unwrap();
        assert!(store.read().await.unwrap().is_none());
        assert!(primary.is_empty());
        assert!(secondary.is_empty());
    }

    #[tokio::test]
    async fn test_read_falls_back_and_repairs_primary() {
        let primary = Arc::new(MemoryBackend::new());
        let secondary = Arc::new(MemoryBackend::new());
        secondary.set(ACCESS_TOKEN_KEY, "a2").await.unwrap();
        secondary.set(REFRESH_TOKEN_KEY, "r2").await.unwrap();

        let store = CredentialStore::new(primary.clone(), secondary);
        assert_eq!(store.read().await.unwrap(), Some(pair("a2", "r2")));
        assert_eq!(primary.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn test_primary_preferred() {
        let primary = Arc::new(MemoryBackend::new());
        let secondary = Arc::new(MemoryBackend::new());
        primary.set(ACCESS_TOKEN_KEY, "fresh").await.unwrap();
        secondary.set(ACCESS_TOKEN_KEY, "stale").await.unwrap();
        let store = CredentialStore::new(primary, secondary);
        assert_eq!(store.access_token().await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(store.refresh_token().await.unwrap(), None);
    }

    struct Flaky {
        inner: MemoryBackend,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl CredentialBackend for Flaky {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::storage("flaky", "disk full"));
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_both() {
        let primary = Arc::new(MemoryBackend::new());
        let secondary = Arc::new(Flaky {
            inner: MemoryBackend::new(),
            fail_writes: AtomicBool::new(false),
        });
        let store = CredentialStore::new(primary.clone(), secondary.clone());
        store.write(&pair("old", "old-r")).await.unwrap();

        secondary.fail_writes.store(true, Ordering::SeqCst);
        let err = store.write(&pair("new", "new-r")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Storage);

        assert_eq!(store.read().await.unwrap(), Some(pair("old", "old-r")));
        assert_eq!(primary.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let s = format!("{:?}", pair("secret-access", "secret-refresh"));
        assert!(!s.contains("secret"));
    }
}
