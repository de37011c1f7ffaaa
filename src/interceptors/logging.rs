use super::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
use crate::error::{Error, ErrorKind};
use crate::request::RequestDescriptor;
use crate::response::ApiResponse;
use crate::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Logs every request, response and failure through `tracing`.
///
/// Register it on all three chains; it never changes what flows through.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        debug!(
            method = request.method().as_str(),
            path = request.path(),
            dedup = request.dedup_enabled(),
            "dispatching request"
        );
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn on_response(
        &self,
        request: &RequestDescriptor,
        response: ApiResponse,
    ) -> Result<ApiResponse> {
        debug!(
            method = request.method().as_str(),
            path = request.path(),
            status = response.status,
            attempts = response.attempts,
            "request succeeded"
        );
        Ok(response)
    }
}

#[async_trait]
impl ErrorInterceptor for LoggingInterceptor {
    async fn on_error(
        &self,
        request: &RequestDescriptor,
        error: &Error,
    ) -> Result<Option<ApiResponse>> {
        match error.kind() {
            ErrorKind::Server | ErrorKind::Network | ErrorKind::Timeout => warn!(
                method = request.method().as_str(),
                path = request.path(),
                kind = error.kind().as_str(),
                status = error.status(),
                "request failed: {}",
                error
            ),
            _ => info!(
                method = request.method().as_str(),
                path = request.path(),
                kind = error.kind().as_str(),
                status = error.status(),
                "request failed: {}",
                error
            ),
        }
        Ok(None)
    }
}
