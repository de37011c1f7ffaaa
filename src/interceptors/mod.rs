//! 拦截器管线：请求前、响应后、出错时三条有序链。
//!
//! Interceptor pipeline for cross-cutting concerns.
//!
//! Three ordered chains run around every dispatched call:
//!
//! | Chain | Runs | May |
//! |-------|------|-----|
//! | pre-request | before dedup and transport | rewrite the descriptor, or fail to abort the call |
//! | post-response | after a successful call | transform the response |
//! | on-error | after a terminal failure | recover with a response, pass, or replace the error |
//!
//! Interceptors run strictly in registration order. Registration returns an
//! [`InterceptorHandle`] that removes exactly that registration; chains are
//! snapshotted when a call reaches them, so registering or removing while a
//! call is in progress never reorders that call's chain.

mod auth;
mod logging;

pub use auth::BearerAuthInterceptor;
pub use logging::LoggingInterceptor;

use crate::error::Error;
use crate::request::RequestDescriptor;
use crate::response::ApiResponse;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(
        &self,
        request: &RequestDescriptor,
        response: ApiResponse,
    ) -> Result<ApiResponse>;
}

#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    /// - `Ok(Some(resp))`: recover; `resp` becomes the call's result and the chain stops.
    /// - `Ok(None)`: pass the current error to the next interceptor.
    /// - `Err(e)`: rethrow; `e` is what the next interceptor (or the caller) sees.
    async fn on_error(
        &self,
        request: &RequestDescriptor,
        error: &Error,
    ) -> Result<Option<ApiResponse>>;
}

struct Chain<T: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Arc<T>)>>,
}

impl<T: ?Sized> Chain<T> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, item: Arc<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, item));
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(i, _)| *i != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, item)| item.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

enum ChainRef {
    Request(Weak<Chain<dyn RequestInterceptor>>),
    Response(Weak<Chain<dyn ResponseInterceptor>>),
    Error(Weak<Chain<dyn ErrorInterceptor>>),
}

/// Removes one registration. Dropping the handle leaves the interceptor installed.
pub struct InterceptorHandle {
    chain: ChainRef,
    id: u64,
}

impl InterceptorHandle {
    /// Returns `false` if it was already removed or the pipeline is gone.
    pub fn unregister(self) -> bool {
        match &self.chain {
            ChainRef::Request(w) => w.upgrade().map(|c| c.remove(self.id)),
            ChainRef::Response(w) => w.upgrade().map(|c| c.remove(self.id)),
            ChainRef::Error(w) => w.upgrade().map(|c| c.remove(self.id)),
        }
        .unwrap_or(false)
    }
}

/// The three interceptor chains. Clones share the same chains.
#[derive(Clone)]
pub struct InterceptorPipeline {
    request: Arc<Chain<dyn RequestInterceptor>>,
    response: Arc<Chain<dyn ResponseInterceptor>>,
    error: Arc<Chain<dyn ErrorInterceptor>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            request: Arc::new(Chain::new()),
            response: Arc::new(Chain::new()),
            error: Arc::new(Chain::new()),
        }
    }

    pub fn add_request(&self, interceptor: Arc<dyn RequestInterceptor>) -> InterceptorHandle {
        let id = self.request.push(interceptor);
        InterceptorHandle {
            chain: ChainRef::Request(Arc::downgrade(&self.request)),
            id,
        }
    }

    pub fn add_response(&self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorHandle {
        let id = self.response.push(interceptor);
        InterceptorHandle {
            chain: ChainRef::Response(Arc::downgrade(&self.response)),
            id,
        }
    }

    pub fn add_error(&self, interceptor: Arc<dyn ErrorInterceptor>) -> InterceptorHandle {
        let id = self.error.push(interceptor);
        InterceptorHandle {
            chain: ChainRef::Error(Arc::downgrade(&self.error)),
            id,
        }
    }

    /// (pre-request, post-response, on-error) counts.
    pub fn len(&self) -> (usize, usize, usize) {
        (self.request.len(), self.response.len(), self.error.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0, 0)
    }

    pub async fn run_request(&self, mut request: RequestDescriptor) -> Result<RequestDescriptor> {
        for ic in self.request.snapshot() {
            request = ic.on_request(request).await?;
        }
        Ok(request)
    }

    pub async fn run_response(
        &self,
        request: &RequestDescriptor,
        mut response: ApiResponse,
    ) -> Result<ApiResponse> {
        for ic in self.response.snapshot() {
            response = ic.on_response(request, response).await?;
        }
        Ok(response)
    }

    /// Run the on-error chain. `Ok` only if an interceptor recovered.
    pub async fn run_error(&self, request: &RequestDescriptor, error: Error) -> Result<ApiResponse> {
        let mut current = error;
        for ic in self.error.snapshot() {
            match ic.on_error(request, &current).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {}
                Err(replaced) => current = replaced,
            }
        }
        Err(current)
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}
