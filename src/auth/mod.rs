//! 认证刷新：401 时单飞刷新凭证，不重放原请求。
//!
//! # Auth Refresh
//!
//! [`AuthRefreshReactor`] is an on-error interceptor. When a call fails with
//! 401 it exchanges the stored refresh token for a new pair and writes it to
//! the [`CredentialStore`]. It never replays the failed call: the original 401
//! still reaches the caller, which decides whether to retry once or log out.
//!
//! Concurrent 401s share one refresh. The first failure starts it; every
//! failure that arrives while it is running awaits the same outcome instead
//! of issuing a second refresh call. The refresh runs on its own task, so it
//! completes (and the reactor returns to idle) even if every caller awaiting
//! it is dropped.
//!
//! A refresh that fails (or has no refresh token to work with) clears the
//! store; the session is unrecoverable at that point.

mod refresh;

pub use refresh::{HttpTokenRefresher, TokenRefresher};

use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::interceptors::ErrorInterceptor;
use crate::request::RequestDescriptor;
use crate::response::ApiResponse;
use crate::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// New pair written to the store.
    Refreshed,
    /// Nothing to refresh with; the store was cleared.
    NoRefreshToken,
    /// The refresh call failed; the store was cleared.
    Failed(Error),
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type InflightSlot = Arc<Mutex<Option<(u64, SharedRefresh)>>>;

pub struct AuthRefreshReactor {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    inflight: InflightSlot,
    next_id: AtomicU64,
    refreshes: Arc<AtomicU64>,
}

impl AuthRefreshReactor {
    pub fn new(store: Arc<CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            inflight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> RefreshState {
        match *self.inflight.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(_) => RefreshState::Refreshing,
            None => RefreshState::Idle,
        }
    }

    /// Refresh calls actually issued since construction.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Start a refresh, or join the one already running.
    pub async fn refresh(&self) -> RefreshOutcome {
        let fut = {
            let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((_, fut)) => fut.clone(),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    // The slot lock is held until the entry is in place, so
                    // the task cannot clear it before it exists.
                    let task = tokio::spawn(drive_refresh(
                        id,
                        self.inflight.clone(),
                        self.store.clone(),
                        self.refresher.clone(),
                        self.refreshes.clone(),
                    ));
                    let fut = task
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                RefreshOutcome::Failed(Error::network(format!(
                                    "credential refresh task failed: {}",
                                    e
                                )))
                            })
                        })
                        .boxed()
                        .shared();
                    *slot = Some((id, fut.clone()));
                    fut
                }
            }
        };
        fut.await
    }
}

/// Runs one refresh to completion and releases the in-flight slot it owns.
async fn drive_refresh(
    id: u64,
    inflight: InflightSlot,
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    counter: Arc<AtomicU64>,
) -> RefreshOutcome {
    let outcome = run_refresh(store, refresher, counter).await;
    let mut slot = inflight.lock().unwrap_or_else(|e| e.into_inner());
    if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
        *slot = None;
    }
    outcome
}

async fn run_refresh(
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    counter: Arc<AtomicU64>,
) -> RefreshOutcome {
    let token = match store.refresh_token().await {
        Ok(Some(t)) => t,
        Ok(None) => {
            info!("no refresh token available, clearing session");
            clear_quietly(&store).await;
            return RefreshOutcome::NoRefreshToken;
        }
        Err(e) => {
            warn!("could not read refresh token: {}", e);
            clear_quietly(&store).await;
            return RefreshOutcome::Failed(e);
        }
    };

    counter.fetch_add(1, Ordering::SeqCst);
    let result = match refresher.refresh(&token).await {
        Ok(pair) => store.write(&pair).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            info!("credentials refreshed");
            RefreshOutcome::Refreshed
        }
        Err(e) => {
            warn!(kind = e.kind().as_str(), "credential refresh failed: {}", e);
            clear_quietly(&store).await;
            RefreshOutcome::Failed(e)
        }
    }
}

async fn clear_quietly(store: &CredentialStore) {
    if let Err(e) = store.clear().await {
        warn!("failed to clear credentials: {}", e);
    }
}

#[async_trait]
impl ErrorInterceptor for AuthRefreshReactor {
    async fn on_error(
        &self,
        request: &RequestDescriptor,
        error: &Error,
    ) -> Result<Option<ApiResponse>> {
        if error.is_unauthorized() && !request.skips_auth() {
            self.refresh().await;
        }
        // The original 401 always propagates; replay is the caller's call.
        Ok(None)
    }
}
