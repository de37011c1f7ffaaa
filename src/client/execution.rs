//! Execution of one logical call: registration, attempts, retry.

use super::core::ApiClient;
use crate::cancel::CancelHandle;
use crate::error::Error;
use crate::request::RequestDescriptor;
use crate::resilience::Decision;
use crate::response::{ApiResponse, ResponseBody};
use crate::transport::TransportRequest;
use crate::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

impl ApiClient {
    pub(crate) async fn dispatch(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        // A failing pre-request interceptor aborts before any network activity.
        let request = self.interceptors.run_request(request).await?;
        let url = request.resolve_url(&self.base_url)?;
        let key = request.key();

        let handle = match request.cancel_handle() {
            Some(external) => external.child(),
            None => CancelHandle::new(),
        };
        let guard = self.registry.register(&key, request.dedup_enabled(), handle);
        let outcome = self.execute_with_retry(&request, &url, guard.handle()).await;
        // Released before any interceptor runs, so a follow-up call made from
        // an interceptor does not supersede this one.
        drop(guard);

        match outcome {
            Ok(response) => self.interceptors.run_response(&request, response).await,
            Err(e) if e.is_cancelled() => {
                debug!(dedup_key = %key, "request cancelled: {}", e);
                Err(e)
            }
            Err(e) => self.interceptors.run_error(&request, e).await,
        }
    }

    async fn execute_with_retry(
        &self,
        request: &RequestDescriptor,
        url: &Url,
        handle: &CancelHandle,
    ) -> Result<ApiResponse> {
        let max_retries = self.max_retries_for(request);
        let timeout = request.timeout_override().unwrap_or(self.config.timeout);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.execute_once(request, url, handle, timeout).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    return Ok(response);
                }
                // Cancellation is final and never reaches the retry policy.
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            match self.retry.decide(&err, attempt, max_retries) {
                Decision::Fail => {
                    if attempt > 1 {
                        info!(
                            method = request.method().as_str(),
                            path = request.path(),
                            attempts = attempt,
                            "giving up after retries: {}",
                            err
                        );
                    }
                    return Err(err);
                }
                Decision::Retry { delay } => {
                    warn!(
                        method = request.method().as_str(),
                        path = request.path(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = err.kind().as_str(),
                        "retrying request"
                    );
                    tokio::select! {
                        biased;
                        reason = handle.cancelled() => return Err(Error::Cancelled { reason }),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One transport attempt raced against the timeout and the cancel handle.
    async fn execute_once(
        &self,
        request: &RequestDescriptor,
        url: &Url,
        handle: &CancelHandle,
        timeout: Duration,
    ) -> Result<ApiResponse> {
        let mut headers = request.headers().to_vec();
        if request.header_value(REQUEST_ID_HEADER).is_none() {
            headers.push((REQUEST_ID_HEADER.to_string(), Uuid::new_v4().to_string()));
        }
        let transport_request = TransportRequest {
            method: request.method(),
            url: url.clone(),
            headers,
            body: request.body_value().cloned(),
        };

        let started = Instant::now();
        let settled = tokio::select! {
            biased;
            reason = handle.cancelled() => return Err(Error::Cancelled { reason }),
            _ = tokio::time::sleep(timeout) => Err(Error::Timeout { after: timeout }),
            res = self.transport.send(transport_request) => res.map_err(Error::from),
        };

        // A cancellation recorded while the transport was settling still wins.
        if let Some(reason) = handle.reason() {
            return Err(Error::Cancelled { reason });
        }

        let response = settled?;
        debug!(
            method = request.method().as_str(),
            path = request.path(),
            status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "transport settled"
        );

        if !(200..300).contains(&response.status) {
            return Err(Error::from_response(
                response.status,
                &response.headers,
                &response.body,
            ));
        }
        let body = ResponseBody::decode(&response.headers, &response.body)?;
        Ok(ApiResponse::new(response.status, response.headers, body))
    }
}
