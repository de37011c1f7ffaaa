use super::RequestInterceptor;
use crate::credentials::CredentialStore;
use crate::request::RequestDescriptor;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Attaches `Authorization: Bearer <access token>` from the credential store.
///
/// Skipped when the descriptor asks for `skip_auth` or already carries an
/// `Authorization` header. A storage failure is logged and the request goes
/// out unauthenticated.
pub struct BearerAuthInterceptor {
    store: Arc<CredentialStore>,
}

impl BearerAuthInterceptor {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuthInterceptor {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        if request.skips_auth() || request.header_value("authorization").is_some() {
            return Ok(request);
        }
        match self.store.access_token().await {
            Ok(Some(token)) => Ok(request.header("Authorization", format!("Bearer {}", token))),
            Ok(None) => Ok(request),
            Err(e) => {
                warn!(path = request.path(), "credential read failed: {}", e);
                Ok(request)
            }
        }
    }
}
