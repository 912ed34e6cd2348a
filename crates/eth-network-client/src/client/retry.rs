//! Retry policies and the retrying transport.
//!
//! Infura and custom RPC endpoints fail in different ways, so each has its
//! own [`RetryPolicy`]. The policy classifies every attempt; the
//! [`RetryingTransport`] owns the attempt loop and the backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use super::middleware::RequestHandler;
use super::transport::{HttpReply, Transport, TransportError, TransportErrorKind};
use crate::error::RpcError;
use crate::types::{JsonRpcRequest, JsonRpcResponse};

/// Failure reason recorded for HTTP 503 and 504 from Infura.
pub const GATEWAY_TIMEOUT_REASON: &str = "Gateway timeout. The request took too long to process. This can happen when querying logs over too wide a block range.";

/// Retry configuration for upstream calls.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts for transient failures, including the first.
    pub max_attempts: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
    /// Total attempts when an Infura call keeps returning an empty result.
    pub empty_result_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            empty_result_max_attempts: 10,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay = std::cmp::min(
            self.initial_delay_ms.saturating_mul(factor),
            self.max_delay_ms,
        );
        Duration::from_millis(delay)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Classification of one attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// The call settled with a result. An empty result is still a success here.
    Success(Value),
    /// Transient failure; try again. Carries the failure reason.
    Retry(String),
    /// Terminal failure.
    Fail(RpcError),
}

/// Provider-specific failure classification.
pub trait RetryPolicy: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// Classify the outcome of one attempt against `url`.
    fn classify(
        &self,
        request: &JsonRpcRequest,
        url: &str,
        outcome: Result<HttpReply, TransportError>,
    ) -> Verdict;

    /// Error returned once every attempt was a transient failure.
    fn exhausted(&self, request: &JsonRpcRequest, last_reason: String) -> RpcError;

    /// Whether empty results at a known block are retried.
    fn retries_empty_results(&self) -> bool;
}

/// Decode a 2xx body into a verdict, using `on_malformed` for bodies that
/// are not a JSON-RPC response.
fn classify_body(body: &str, on_malformed: impl FnOnce(serde_json::Error) -> String) -> Verdict {
    match serde_json::from_str::<JsonRpcResponse>(body) {
        Ok(response) => match response.into_result() {
            Ok(result) => Verdict::Success(result),
            Err(e) => Verdict::Fail(e),
        },
        Err(e) => Verdict::Retry(on_malformed(e)),
    }
}

/// Policy for Infura endpoints.
///
/// | Outcome | Handling |
/// |---------|----------|
/// | 405 | [`RpcError::MethodNotAvailable`] |
/// | 429 | [`RpcError::RateLimited`] |
/// | 503, 504 | retried as a gateway timeout |
/// | other non-2xx | [`RpcError::Upstream`] with the raw body |
/// | timeout, reset, malformed body | retried |
/// | other transport errors | [`RpcError::FetchFailed`] |
///
/// Exhaustion yields [`RpcError::RetriesExhausted`]. Empty results at a
/// known block are retried by the retry-on-empty stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct InfuraRetryPolicy;

impl RetryPolicy for InfuraRetryPolicy {
    fn name(&self) -> &'static str {
        "infura"
    }

    fn classify(
        &self,
        _request: &JsonRpcRequest,
        url: &str,
        outcome: Result<HttpReply, TransportError>,
    ) -> Verdict {
        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                return match e.kind {
                    TransportErrorKind::TimedOut
                    | TransportErrorKind::ConnectionReset
                    | TransportErrorKind::Syntax => Verdict::Retry(e.to_string()),
                    TransportErrorKind::FetchFailed | TransportErrorKind::Other => {
                        Verdict::Fail(RpcError::FetchFailed {
                            url: url.to_string(),
                            reason: e.to_string(),
                        })
                    }
                };
            }
        };

        match reply.status {
            405 => Verdict::Fail(RpcError::MethodNotAvailable),
            429 => Verdict::Fail(RpcError::RateLimited),
            503 | 504 => Verdict::Retry(GATEWAY_TIMEOUT_REASON.to_string()),
            _ if !reply.is_success() => Verdict::Fail(RpcError::Upstream { body: reply.body }),
            _ => classify_body(&reply.body, |e| format!("SyntaxError: {}", e)),
        }
    }

    fn exhausted(&self, _request: &JsonRpcRequest, last_reason: String) -> RpcError {
        RpcError::RetriesExhausted {
            reason: last_reason,
        }
    }

    fn retries_empty_results(&self) -> bool {
        true
    }
}

/// Policy for arbitrary JSON-RPC endpoints.
///
/// Retries timeouts, `Failed to fetch`, unparseable bodies and HTTP
/// 503/504. Exhaustion yields [`RpcError::EmptyResponse`]. Connection
/// resets and other transport errors fail at once with
/// [`RpcError::FetchFailed`]. HTTP 418 is reported as rate limiting and
/// is not retried; every other non-2xx is [`RpcError::NonSuccessStatus`].
///
/// The two policies disagree on resets and `Failed to fetch`. Both
/// behaviors are kept until the providers are unified.
#[derive(Clone, Copy, Debug, Default)]
pub struct CustomRpcRetryPolicy;

impl RetryPolicy for CustomRpcRetryPolicy {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn classify(
        &self,
        _request: &JsonRpcRequest,
        url: &str,
        outcome: Result<HttpReply, TransportError>,
    ) -> Verdict {
        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                return match e.kind {
                    TransportErrorKind::TimedOut | TransportErrorKind::FetchFailed => {
                        Verdict::Retry(e.to_string())
                    }
                    TransportErrorKind::ConnectionReset
                    | TransportErrorKind::Syntax
                    | TransportErrorKind::Other => Verdict::Fail(RpcError::FetchFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }),
                };
            }
        };

        match reply.status {
            405 => Verdict::Fail(RpcError::MethodNotAvailable),
            418 => Verdict::Fail(RpcError::RateLimited),
            503 | 504 => Verdict::Retry(format!("Non-200 status code: '{}'", reply.status)),
            status if !reply.is_success() => {
                Verdict::Fail(RpcError::NonSuccessStatus { status })
            }
            _ => classify_body(&reply.body, |e| {
                format!("failed to parse response body: {}", e)
            }),
        }
    }

    fn exhausted(&self, request: &JsonRpcRequest, _last_reason: String) -> RpcError {
        RpcError::EmptyResponse {
            method: request.method.clone(),
        }
    }

    fn retries_empty_results(&self) -> bool {
        false
    }
}

// ============================================================================
// RetryingTransport
// ============================================================================

/// Sends requests upstream, retrying transient failures per policy.
///
/// Every attempt gets a fresh upstream id. Ids are never matched against
/// the response.
pub struct RetryingTransport {
    transport: Arc<dyn Transport>,
    policy: Arc<dyn RetryPolicy>,
    config: RetryConfig,
    request_id: AtomicU64,
    closed: AtomicBool,
}

impl RetryingTransport {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: Arc<dyn RetryPolicy>,
        config: RetryConfig,
    ) -> Self {
        Self {
            transport,
            policy,
            config,
            request_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The upstream URL.
    pub fn url(&self) -> &str {
        self.transport.url()
    }

    pub fn policy(&self) -> &dyn RetryPolicy {
        self.policy.as_ref()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.config
    }

    /// Stop scheduling retries. Attempts already on the wire still settle.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send a request, retrying transient failures.
    pub async fn send(&self, request: &JsonRpcRequest) -> Result<Value, RpcError> {
        let total_attempts = self.config.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 0..total_attempts {
            let upstream = JsonRpcRequest {
                id: Value::from(self.request_id.fetch_add(1, Ordering::Relaxed)),
                ..request.clone()
            };

            tracing::debug!(
                method = %request.method,
                attempt = attempt + 1,
                policy = self.policy.name(),
                "upstream attempt"
            );

            let outcome = self.transport.send(&upstream).await;
            match self.policy.classify(request, self.transport.url(), outcome) {
                Verdict::Success(result) => return Ok(result),
                Verdict::Fail(e) => return Err(e),
                Verdict::Retry(reason) => {
                    tracing::warn!(
                        method = %request.method,
                        attempt = attempt + 1,
                        max_attempts = total_attempts,
                        reason = %reason,
                        "transient upstream failure"
                    );
                    last_reason = reason;
                    if self.is_closed() {
                        break;
                    }
                    if attempt + 1 < total_attempts {
                        tokio::time::sleep(self.config.delay_for(attempt)).await;
                    }
                }
            }
        }

        Err(self.policy.exhausted(request, last_reason))
    }
}

impl RequestHandler for RetryingTransport {
    fn handle(&self, request: JsonRpcRequest) -> BoxFuture<'_, Result<Value, RpcError>> {
        Box::pin(async move { self.send(&request).await })
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("url", &self.transport.url())
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .finish()
    }
}
