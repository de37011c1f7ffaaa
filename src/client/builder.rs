use crate::auth::{AuthRefreshReactor, HttpTokenRefresher, TokenRefresher};
use crate::client::core::ApiClient;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, ErrorContext};
use crate::interceptors::{BearerAuthInterceptor, InterceptorPipeline, LoggingInterceptor};
use crate::registry::InFlightRegistry;
use crate::resilience::RetryPolicy;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;
use url::Url;

/// Builder for [`ApiClient`].
///
/// Built-in interceptors are installed in a fixed order: bearer auth (when a
/// credential store is given), logging (when enabled), then the auth-refresh
/// reactor (when enabled). Application interceptors registered afterwards run
/// after these.
pub struct ApiClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    auth_refresh: bool,
    logging: bool,
    registry: Option<InFlightRegistry>,
    /// Override base URL (primarily for testing with mock servers)
    base_url_override: Option<String>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            transport: None,
            credentials: None,
            refresher: None,
            auth_refresh: true,
            logging: false,
            registry: None,
            base_url_override: None,
        }
    }

    /// Use this config instead of [`ClientConfig::from_env`].
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Inject a transport. Default is [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach a credential store; enables bearer injection and 401 refresh.
    pub fn credentials(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Inject the refresh call. Default is [`HttpTokenRefresher`].
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Enable or disable the auth-refresh reactor (on by default when
    /// credentials are attached).
    pub fn auth_refresh(mut self, enable: bool) -> Self {
        self.auth_refresh = enable;
        self
    }

    /// Install [`LoggingInterceptor`] on all three chains.
    pub fn logging(mut self, enable: bool) -> Self {
        self.logging = enable;
        self
    }

    /// Share an in-flight registry with other clients.
    pub fn registry(mut self, registry: InFlightRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the configured base URL.
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let mut config = match self.config {
            Some(c) => c,
            None => ClientConfig::from_env()?,
        };
        if let Some(url) = self.base_url_override {
            config.base_url = url;
        }

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::configuration(
                "invalid base URL",
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(e.to_string())
                    .with_source("client_builder"),
            )
        })?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new().map_err(|e| {
                Error::configuration(
                    "failed to build HTTP transport",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("client_builder"),
                )
            })?),
        };

        let interceptors = InterceptorPipeline::new();
        if let Some(store) = &self.credentials {
            interceptors.add_request(Arc::new(BearerAuthInterceptor::new(store.clone())));
        }
        if self.logging {
            let logging = Arc::new(LoggingInterceptor);
            interceptors.add_request(logging.clone());
            interceptors.add_response(logging.clone());
            interceptors.add_error(logging);
        }

        let reactor = match (&self.credentials, self.auth_refresh) {
            (Some(store), true) => {
                let refresher: Arc<dyn TokenRefresher> = match self.refresher {
                    Some(r) => r,
                    None => Arc::new(HttpTokenRefresher::new(&config)?),
                };
                let reactor = Arc::new(AuthRefreshReactor::new(store.clone(), refresher));
                interceptors.add_error(reactor.clone());
                Some(reactor)
            }
            _ => None,
        };

        Ok(ApiClient {
            retry: RetryPolicy::new(&config.retry),
            config,
            base_url,
            transport,
            interceptors,
            registry: self.registry.unwrap_or_default(),
            credentials: self.credentials,
            reactor,
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
