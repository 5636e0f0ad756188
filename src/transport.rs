//! HTTP request execution for the Combined Energy API
//!
//! One `Transport` owns the connection pool shared by every caller. It
//! serializes JSON bodies, drops null query parameters, retries 503 responses
//! through its [`RetryPolicy`] and turns every other non-success status into a
//! [`CombinedEnergyError::Transport`] without retrying.

use crate::config::HttpConfig;
use crate::error::{CombinedEnergyError, Result};
use crate::logging::get_logger;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

mod retry;

pub use retry::{RetryPolicy, is_service_unavailable};

/// Query parameter whose value may be absent
pub type QueryParam<'a> = (&'a str, Option<String>);

/// Drop parameters without a value, keeping order
pub fn strip_null_params<'a>(params: &[QueryParam<'a>]) -> Vec<(&'a str, String)> {
    params
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (*key, v.clone())))
        .collect()
}

/// Authenticated-call agnostic HTTP executor
pub struct Transport {
    timeout: Duration,
    user_agent: String,
    retry: RetryPolicy,
    http: Mutex<Option<reqwest::Client>>,
    /// Client handed in by the host; never closed by the transport
    host_owned: bool,
    scope_held: AtomicBool,
    requests_sent: AtomicU64,
    logger: crate::logging::StructuredLogger,
}

/// Exclusive ownership of the transport's connection.
///
/// Only one scope exists at a time. A connection the transport built itself
/// is closed when the scope is dropped and the next request opens a fresh one;
/// a host-owned client stays open.
pub struct ConnectionScope<'a> {
    transport: &'a Transport,
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        self.transport.close();
        self.transport.scope_held.store(false, Ordering::Release);
    }
}

impl Transport {
    /// Create a transport that builds its own connection pool on first use
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout(),
            user_agent: format!("CombinedEnergyClient/{}", config.user_agent_version),
            retry: RetryPolicy::from_config(&config.retry),
            http: Mutex::new(None),
            host_owned: false,
            scope_held: AtomicBool::new(false),
            requests_sent: AtomicU64::new(0),
            logger: get_logger("transport"),
        }
    }

    /// Create a transport around a client owned by the host; it stays open for the transport's lifetime
    pub fn with_client(client: reqwest::Client, config: &HttpConfig) -> Self {
        Self {
            http: Mutex::new(Some(client)),
            host_owned: true,
            ..Self::new(config)
        }
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of HTTP requests put on the wire, retries included
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Whether a connection pool is currently held
    pub fn is_connected(&self) -> bool {
        self.http.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Whether the connection belongs to the host rather than the transport
    pub fn is_host_owned(&self) -> bool {
        self.host_owned
    }

    /// Whether a [`ConnectionScope`] is currently held
    pub fn is_scoped(&self) -> bool {
        self.scope_held.load(Ordering::Acquire)
    }

    /// Take exclusive ownership of the connection until the returned scope ends.
    ///
    /// Fails while another scope is held.
    pub fn scoped(&self) -> Result<ConnectionScope<'_>> {
        self.scope_held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                CombinedEnergyError::generic("Connection is already held by another scope")
            })?;
        Ok(ConnectionScope { transport: self })
    }

    /// Drop the pooled connection; requests already in flight keep their handle.
    ///
    /// A host-owned client is left open.
    pub fn close(&self) {
        if self.host_owned {
            self.logger.debug("Connection is host-owned, leaving it open");
            return;
        }
        if let Ok(mut slot) = self.http.lock()
            && slot.take().is_some()
        {
            self.logger.debug("Closed HTTP connection pool");
        }
    }

    fn connection(&self) -> Result<reqwest::Client> {
        let mut slot = self
            .http
            .lock()
            .map_err(|_| CombinedEnergyError::generic("Transport connection lock poisoned"))?;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| {
                CombinedEnergyError::config(format!("Failed to build HTTP client: {}", e))
            })?;
        self.logger.debug("Opened HTTP connection pool");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Execute a request and decode the JSON response body
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[QueryParam<'_>],
    ) -> Result<Value> {
        let params = strip_null_params(query);

        self.retry
            .run(|attempt| {
                let method = method.clone();
                let params = &params;
                async move {
                    let http = self.connection()?;
                    self.logger
                        .debug(&format!("{} {} (attempt {})", method, url, attempt));

                    let mut request = http.request(method, url);
                    if !params.is_empty() {
                        request = request.query(params);
                    }
                    if let Some(body) = body {
                        request = request.json(body);
                    }

                    self.requests_sent.fetch_add(1, Ordering::Relaxed);
                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(CombinedEnergyError::http_status(
                            status.as_u16(),
                            self.retry.is_retryable_status(status),
                        ));
                    }
                    Ok(response.json::<Value>().await?)
                }
            })
            .await
    }

    /// GET with query parameters
    pub async fn get(&self, url: &str, query: &[QueryParam<'_>]) -> Result<Value> {
        self.request(Method::GET, url, None, query).await
    }

    /// POST a JSON body
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, url, Some(body), &[]).await
    }
}
