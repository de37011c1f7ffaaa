//! Key-value backends for credential persistence.

use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// In-process backend. With a TTL it behaves like a short-lived cookie jar:
/// values silently disappear once they age out.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| !e.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let live = entries
            .get(key)
            .map(|e| (!e.is_expired()).then(|| e.value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Durable backend over the OS keyring.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| Error::storage("keyring", e.to_string()))
    }
}

#[async_trait]
impl CredentialBackend for KeyringBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(v) => Ok(Some(v)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::storage("keyring", e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| Error::storage("keyring", e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::storage("keyring", e.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let b = MemoryBackend::new();
        assert_eq!(b.get("k").await.unwrap(), None);
        b.set("k", "v").await.unwrap();
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v"));
        b.remove("k").await.unwrap();
        assert!(b.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let b = MemoryBackend::with_ttl(Duration::from_secs(60));
        b.set("accessToken", "a").await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(b.get("accessToken").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(b.get("accessToken").await.unwrap().is_none());
    }
}
