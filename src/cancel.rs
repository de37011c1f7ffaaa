//! Cooperative cancellation handles.
//!
//! A [`CancelHandle`] can be fired by the caller, by the in-flight registry
//! (dedup preemption, bulk shutdown) or by a parent handle. The first reason
//! recorded is final; later `cancel_with` calls only re-fire the token.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Why a call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The caller (or a parent handle) fired the signal.
    External,
    /// A newer call with the same dedup key replaced this one.
    Superseded,
    /// Bulk cancellation, e.g. logout or client shutdown.
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("cancelled by caller"),
            Self::Superseded => f.write_str("superseded by a newer request"),
            Self::Shutdown => f.write_str("client shut down"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire with [`CancelReason::External`].
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::External);
    }

    /// Fire with a reason. Returns `true` if this call settled the reason.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The settled reason, if cancelled. A handle cancelled through its
    /// parent reports [`CancelReason::External`].
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.reason.get().copied().unwrap_or(CancelReason::External))
    }

    /// Resolves once the handle fires.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(CancelReason::External)
    }

    /// A handle that fires when this one does, but can also be fired on its own
    /// without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
        }
    }
}
