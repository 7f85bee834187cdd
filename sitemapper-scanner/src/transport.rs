//! Rate-limited HTTP transport for the remote layout API.
//!
//! Every call passes through an admission gate (a counting semaphore), runs
//! under a total timeout and is retried with exponential backoff. Transient
//! failures never reach the caller: an exhausted call yields an empty JSON
//! array, which is indistinguishable from "no children".

use crate::error::{Result, ScanError};
use crate::layout::truncate;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, warn};

pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub credentials: Option<Credentials>,
    pub accept_invalid_certs: bool,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            credentials: None,
            accept_invalid_certs: false,
        }
    }
}

/// Why a single attempt failed. Decides whether and how to retry.
#[derive(Debug)]
pub enum AttemptError {
    /// Non-success HTTP status; retried immediately.
    Status { status: u16, body: String },
    /// Connection failure or timeout; retried after `2^attempt` seconds.
    Transient(String),
    /// Anything else; not retried.
    Unexpected(String),
}

/// Result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub attempts: u32,
    pub failures: u32,
}

/// Run `op` up to `max_retries` times.
///
/// `op` receives the zero-based attempt number. On exhaustion the last error
/// is logged once and `value` is `None`.
pub async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut outcome = RetryOutcome {
        value: None,
        attempts: 0,
        failures: 0,
    };

    for attempt in 0..max_retries {
        outcome.attempts += 1;
        let last = attempt + 1 == max_retries;

        match op(attempt).await {
            Ok(value) => {
                outcome.value = Some(value);
                return outcome;
            }
            Err(AttemptError::Status { status, body }) => {
                outcome.failures += 1;
                warn!(
                    "Error response (attempt {}/{}): status {}",
                    attempt + 1,
                    max_retries,
                    status
                );
                if last {
                    error!("Error details: {}", truncate(&body, 200));
                    return outcome;
                }
            }
            Err(AttemptError::Transient(message)) => {
                outcome.failures += 1;
                if last {
                    error!("Request failed after {} attempts: {}", max_retries, message);
                    return outcome;
                }
                let wait = Duration::from_secs(1u64 << attempt.min(16));
                warn!(
                    "Attempt {} failed ({}). Waiting {}s before retrying...",
                    attempt + 1,
                    message,
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
            }
            Err(AttemptError::Unexpected(message)) => {
                outcome.failures += 1;
                error!("Unexpected error: {}", message);
                return outcome;
            }
        }
    }

    outcome
}

/// Counting admission gate with an in-flight instrument.
pub struct AdmissionGate {
    semaphore: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held while a call is in flight; releases the slot on drop.
pub struct Admission<'a> {
    _permit: SemaphorePermit<'a>,
    in_flight: &'a AtomicUsize,
}

impl AdmissionGate {
    pub fn new(slots: usize) -> Self {
        Self {
            semaphore: Semaphore::new(slots),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub async fn admit(&self) -> Result<Admission<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ScanError::Other(format!("Admission gate closed: {}", e)))?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Admission {
            _permit: permit,
            in_flight: &self.in_flight,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously admitted calls seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The body of a transport call. `body` is an empty array when every
/// attempt failed.
#[derive(Debug)]
pub struct TransportResponse {
    pub body: Value,
    pub attempts: u32,
    pub failures: u32,
}

impl TransportResponse {
    pub fn succeeded(&self) -> bool {
        self.attempts > self.failures
    }
}

pub struct Transport {
    client: Client,
    gate: AdmissionGate,
    max_retries: u32,
    credentials: Option<Credentials>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("Sitemapper/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_max_idle_per_host(config.max_concurrent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            gate: AdmissionGate::new(config.max_concurrent.max(1)),
            max_retries: config.max_retries,
            credentials: config.credentials,
        })
    }

    /// Issue `method endpoint?params` and return the parsed JSON body.
    ///
    /// Waits for an admission slot first; the slot is held across retries.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> TransportResponse {
        let _admission = match self.gate.admit().await {
            Ok(admission) => admission,
            Err(e) => {
                error!("Unexpected error: {}", e);
                return TransportResponse {
                    body: Value::Array(Vec::new()),
                    attempts: 0,
                    failures: 0,
                };
            }
        };

        let outcome = with_retry(self.max_retries, |attempt| {
            let method = method.clone();
            async move {
                debug!("{} {} (attempt {})", method, endpoint, attempt + 1);
                self.attempt(method, endpoint, params).await
            }
        })
        .await;

        TransportResponse {
            body: outcome.value.unwrap_or_else(|| Value::Array(Vec::new())),
            attempts: outcome.attempts,
            failures: outcome.failures,
        }
    }

    async fn attempt(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Value, AttemptError> {
        let mut request = self.client.request(method, endpoint).query(params);
        if let Some(ref credentials) = self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if status == StatusCode::OK || status == StatusCode::CREATED {
            serde_json::from_str(&body)
                .map_err(|e| AttemptError::Unexpected(format!("Invalid JSON body: {}", e)))
        } else {
            Err(AttemptError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }
}

fn classify(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        AttemptError::Transient(e.to_string())
    } else {
        AttemptError::Unexpected(e.to_string())
    }
}
