use crate::auth::AuthRefreshReactor;
use crate::cancel::CancelReason;
use crate::client::signals::SignalsSnapshot;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::interceptors::InterceptorPipeline;
use crate::registry::InFlightRegistry;
use crate::request::{Idempotency, RequestDescriptor};
use crate::resilience::RetryPolicy;
use crate::response::{ApiResponse, Envelope};
use crate::transport::Transport;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// The request dispatcher. Build one with [`ApiClient::builder`] and share it
/// (it is cheap to clone behind an `Arc`, and all state is shared anyway).
pub struct ApiClient {
    pub(crate) config: ClientConfig,
    pub(crate) base_url: Url,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) interceptors: InterceptorPipeline,
    pub(crate) registry: InFlightRegistry,
    pub(crate) retry: RetryPolicy,
    pub(crate) credentials: Option<Arc<CredentialStore>>,
    pub(crate) reactor: Option<Arc<AuthRefreshReactor>>,
}

impl ApiClient {
    pub fn builder() -> crate::client::ApiClientBuilder {
        crate::client::ApiClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The interceptor chains. Register and unregister at any time.
    pub fn interceptors(&self) -> &InterceptorPipeline {
        &self.interceptors
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> Option<&Arc<CredentialStore>> {
        self.credentials.as_ref()
    }

    pub fn auth_reactor(&self) -> Option<&Arc<AuthRefreshReactor>> {
        self.reactor.as_ref()
    }

    /// Dispatch and deserialize the whole body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Dispatch and decode the standard `{success, data, message, errors, meta}` envelope.
    pub async fn send_envelope<T: DeserializeOwned>(
        &self,
        request: RequestDescriptor,
    ) -> Result<Envelope<T>> {
        self.send(request).await?.envelope()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(RequestDescriptor::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        idempotency: Idempotency,
    ) -> Result<T> {
        self.send_json(RequestDescriptor::post(path, idempotency).json(body)?)
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        idempotency: Idempotency,
    ) -> Result<T> {
        self.send_json(RequestDescriptor::put(path, idempotency).json(body)?)
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        idempotency: Idempotency,
    ) -> Result<T> {
        self.send_json(RequestDescriptor::patch(path, idempotency).json(body)?)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        idempotency: Idempotency,
    ) -> Result<T> {
        self.send_json(RequestDescriptor::delete(path, idempotency))
            .await
    }

    /// Cancel every live call registered under `key`.
    pub fn cancel(&self, key: &str) -> usize {
        self.registry.cancel(key, CancelReason::External)
    }

    /// Cancel every live call.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all(CancelReason::Shutdown)
    }

    /// Cancel everything in flight and clear stored credentials.
    pub async fn logout(&self) -> Result<()> {
        let cancelled = self.cancel_all();
        info!(cancelled, "logging out");
        match &self.credentials {
            Some(store) => store.clear().await,
            None => Ok(()),
        }
    }

    /// Snapshot current runtime signals (facts only).
    pub async fn signals(&self) -> SignalsSnapshot {
        let has_credentials = match &self.credentials {
            Some(store) => store.is_authenticated().await,
            None => false,
        };
        SignalsSnapshot {
            in_flight: self.registry.len(),
            in_flight_keys: self.registry.keys(),
            has_credentials,
            refresh_state: self.reactor.as_ref().map(|r| r.state()),
        }
    }

    /// Dispatch a call and return the raw response (after interceptors).
    pub async fn send(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        self.dispatch(request).await
    }

    pub(crate) fn max_retries_for(&self, request: &RequestDescriptor) -> u32 {
        request.effective_retries(self.config.retry.max_retries)
    }
}
