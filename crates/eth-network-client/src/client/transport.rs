//! HTTP transport for JSON-RPC requests.
//!
//! A transport performs exactly one HTTP exchange. It does not parse the
//! body or retry; classification belongs to the provider's retry policy.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::types::JsonRpcRequest;

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpReply, TransportError>> + Send + 'a>>;

/// Raw HTTP reply: status code and undecoded body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Transport errors
// ============================================================================

/// Kind of failure raised before an HTTP reply was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request timed out (`ETIMEDOUT`).
    TimedOut,
    /// The peer reset the connection (`ECONNRESET`).
    ConnectionReset,
    /// The request could not be sent at all (`Failed to fetch`).
    FetchFailed,
    /// The reply could not be decoded (`SyntaxError`).
    Syntax,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Short code prefixed to the error message.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            TransportErrorKind::TimedOut => Some("ETIMEDOUT"),
            TransportErrorKind::ConnectionReset => Some("ECONNRESET"),
            TransportErrorKind::FetchFailed => Some("Failed to fetch"),
            TransportErrorKind::Syntax => Some("SyntaxError"),
            TransportErrorKind::Other => None,
        }
    }
}

/// Error raised by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::TimedOut, message)
    }

    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionReset, message)
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::FetchFailed, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Syntax, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.code() {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            return TransportError::timed_out(message);
        }
        if is_connection_reset(&e) {
            return TransportError::connection_reset(message);
        }
        if e.is_decode() {
            return TransportError::syntax(message);
        }
        if e.is_connect() || e.is_request() {
            return TransportError::fetch_failed(message);
        }
        TransportError::other(message)
    }
}

/// Walk the source chain looking for an io reset.
fn is_connection_reset(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = std::error::Error::source(err);
    }
    false
}

// ============================================================================
// Transport trait
// ============================================================================

/// A single-shot JSON-RPC transport.
pub trait Transport: Send + Sync {
    /// The endpoint requests are sent to.
    fn url(&self) -> &str;

    /// POST one request and return the raw reply.
    fn send<'a>(&'a self, request: &'a JsonRpcRequest) -> TransportFuture<'a>;
}

/// Per-request timeout used unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport backed by `reqwest`.
///
/// Each exchange is bounded by a timeout. An expired timeout surfaces as
/// [`TransportErrorKind::TimedOut`].
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    /// Create a transport sharing an existing `reqwest` client.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bound each exchange, body included, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport for HttpTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn send<'a>(&'a self, request: &'a JsonRpcRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            tracing::debug!(url = %self.url, method = %request.method, "sending request");

            let response = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .timeout(self.timeout)
                .json(request)
                .send()
                .await?;

            let status = response.status().as_u16();
            let body = response.text().await?;

            Ok(HttpReply { status, body })
        })
    }
}

// ============================================================================
// Scripted transport
// ============================================================================

/// In-memory transport with scripted replies, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::{HttpReply, Transport, TransportError, TransportFuture};
    use crate::types::JsonRpcRequest;

    /// One scripted outcome.
    #[derive(Clone, Debug)]
    pub enum ScriptedStep {
        Reply(HttpReply),
        Error(TransportError),
    }

    #[derive(Default)]
    struct Script {
        queued: HashMap<String, VecDeque<ScriptedStep>>,
        fallback: HashMap<String, ScriptedStep>,
        requests: Vec<JsonRpcRequest>,
    }

    /// Transport that replays queued replies per method.
    ///
    /// Queued steps are consumed in order. Once a method's queue is empty
    /// its fallback step (if any) is returned on every call. A method with
    /// neither fails with a transport error.
    pub struct ScriptedTransport {
        url: String,
        latency: Option<Duration>,
        script: Mutex<Script>,
    }

    impl Default for ScriptedTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                url: "http://scripted.test/".to_string(),
                latency: None,
                script: Mutex::new(Script::default()),
            }
        }

        /// Delay every reply, so concurrent callers overlap.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Use a different URL in error messages.
        pub fn with_url(mut self, url: impl Into<String>) -> Self {
            self.url = url.into();
            self
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Queue a step for a method.
        pub fn push_step(&self, method: &str, step: ScriptedStep) {
            self.lock()
                .queued
                .entry(method.to_string())
                .or_default()
                .push_back(step);
        }

        /// Queue a 200 reply carrying `result`.
        pub fn push_result(&self, method: &str, result: Value) {
            self.push_step(method, ScriptedStep::Reply(success_reply(result)));
        }

        /// Queue a raw reply.
        pub fn push_reply(&self, method: &str, status: u16, body: impl Into<String>) {
            self.push_step(method, ScriptedStep::Reply(HttpReply::new(status, body)));
        }

        /// Queue a transport error.
        pub fn push_error(&self, method: &str, error: TransportError) {
            self.push_step(method, ScriptedStep::Error(error));
        }

        /// Reply with `result` whenever the queue for `method` is empty.
        pub fn set_result(&self, method: &str, result: Value) {
            self.set_fallback(method, ScriptedStep::Reply(success_reply(result)));
        }

        /// Use `step` whenever the queue for `method` is empty.
        pub fn set_fallback(&self, method: &str, step: ScriptedStep) {
            self.lock().fallback.insert(method.to_string(), step);
        }

        /// Number of requests sent for a method.
        pub fn calls(&self, method: &str) -> usize {
            self.lock()
                .requests
                .iter()
                .filter(|r| r.method == method)
                .count()
        }

        /// Requests sent for a method, in order.
        pub fn requests(&self, method: &str) -> Vec<JsonRpcRequest> {
            self.lock()
                .requests
                .iter()
                .filter(|r| r.method == method)
                .cloned()
                .collect()
        }

        /// Total number of requests sent.
        pub fn total_calls(&self) -> usize {
            self.lock().requests.len()
        }

        fn next_step(&self, request: &JsonRpcRequest) -> Option<ScriptedStep> {
            let mut script = self.lock();
            script.requests.push(request.clone());
            if let Some(step) = script
                .queued
                .get_mut(&request.method)
                .and_then(VecDeque::pop_front)
            {
                return Some(step);
            }
            script.fallback.get(&request.method).cloned()
        }
    }

    /// 200 reply with a JSON-RPC success body.
    pub fn success_reply(result: Value) -> HttpReply {
        HttpReply::new(
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string(),
        )
    }

    impl Transport for ScriptedTransport {
        fn url(&self) -> &str {
            &self.url
        }

        fn send<'a>(&'a self, request: &'a JsonRpcRequest) -> TransportFuture<'a> {
            Box::pin(async move {
                let step = self.next_step(request);
                if let Some(latency) = self.latency {
                    tokio::time::sleep(latency).await;
                }
                match step {
                    Some(ScriptedStep::Reply(reply)) => Ok(reply),
                    Some(ScriptedStep::Error(error)) => Err(error),
                    None => Err(TransportError::other(format!(
                        "no scripted reply for {}",
                        request.method
                    ))),
                }
            })
        }
    }
}
