//! Dispatcher — delivers a rendered payload to one target with retry.
//!
//! Every attempt is bounded by the target's timeout. Transport failures and
//! 5xx responses are retried per the `RetryPolicy`; a 4xx response or a
//! payload that can't be encoded fails immediately.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::TransportError;
use crate::pipeline::render::{Payload, encode};
use crate::pipeline::resolver::{ContentType, DeliveryTarget, HttpMethod};
use crate::pipeline::retry::RetryPolicy;

// ── Transport ───────────────────────────────────────────────────────

/// One encoded HTTP request, ready to send.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub content_type: ContentType,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

/// Sends a request and reports the response status code.
///
/// Only the status class of a response matters to the dispatcher, so the
/// body is never read.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<u16, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(request.content_type.mime()),
        );
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("header {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        let builder = match request.method {
            HttpMethod::Post => self.client.post(request.url.clone()),
            HttpMethod::Put => self.client.put(request.url.clone()),
            HttpMethod::Patch => self.client.patch(request.url.clone()),
        };

        let response = builder
            .headers(headers)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(request.timeout)
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Final status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Why the last attempt (or the refusal to attempt) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Timeout,
    Connect,
    Request,
    ServerError,
    ClientError,
    UnexpectedStatus,
    Encoding,
    IncompleteRecord,
}

impl ErrorClass {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect | Self::Request | Self::ServerError | Self::UnexpectedStatus
        )
    }

    /// Classify a non-2xx status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::UnexpectedStatus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::UnexpectedStatus => "unexpected_status",
            Self::Encoding => "encoding",
            Self::IncompleteRecord => "incomplete_record",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransportError> for ErrorClass {
    fn from(e: &TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => Self::Timeout,
            TransportError::Connect(_) => Self::Connect,
            TransportError::Request(_) => Self::Request,
        }
    }
}

/// Result of delivering one record to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub target: String,
    pub attempts: u32,
    pub status: DeliveryStatus,
    pub last_error: Option<ErrorClass>,
    /// Status code of the last response, if any response arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
}

impl DispatchOutcome {
    /// A delivery that failed before any attempt was made.
    pub fn not_attempted(target: impl Into<String>, reason: ErrorClass) -> Self {
        Self {
            target: target.into(),
            attempts: 0,
            status: DeliveryStatus::Failed,
            last_error: Some(reason),
            status_code: None,
            latency_ms: 0,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Executes deliveries through a shared transport. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn DeliveryTransport>,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn DeliveryTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `payload` to `target`. Never fails; the outcome says how it went.
    pub async fn dispatch(&self, payload: &Payload, target: &DeliveryTarget) -> DispatchOutcome {
        let start = Instant::now();

        let body = match encode(payload, target.content_type) {
            Ok(body) => body,
            Err(e) => {
                error!(target = %target.name, error = %e, "Payload encoding failed");
                return DispatchOutcome::not_attempted(&target.name, ErrorClass::Encoding);
            }
        };

        let request = DeliveryRequest {
            method: target.method,
            url: target.url.clone(),
            headers: target.headers.clone(),
            content_type: target.content_type,
            body,
            timeout: target.timeout,
        };

        let max_attempts = self.policy.attempts();
        let mut attempts = 0;
        let mut last_error = None;
        let mut status_code = None;

        while attempts < max_attempts {
            attempts += 1;

            let result = tokio::time::timeout(target.timeout, self.transport.send(&request)).await;
            let class = match result {
                Ok(Ok(code)) if (200..300).contains(&code) => {
                    info!(
                        target = %target.name,
                        status = code,
                        attempts,
                        "Delivered notification"
                    );
                    return DispatchOutcome {
                        target: target.name.clone(),
                        attempts,
                        status: DeliveryStatus::Delivered,
                        last_error: None,
                        status_code: Some(code),
                        latency_ms: elapsed_ms(start),
                    };
                }
                Ok(Ok(code)) => {
                    status_code = Some(code);
                    ErrorClass::from_status(code)
                }
                Ok(Err(e)) => {
                    debug!(target = %target.name, error = %e, "Transport error");
                    ErrorClass::from(&e)
                }
                Err(_) => ErrorClass::Timeout,
            };
            last_error = Some(class);

            if !class.is_transient() {
                warn!(
                    target = %target.name,
                    error = %class,
                    status = ?status_code,
                    "Delivery rejected, not retrying"
                );
                break;
            }

            if attempts < max_attempts {
                let delay = self.policy.delay_after(attempts);
                warn!(
                    target = %target.name,
                    attempt = attempts,
                    error = %class,
                    delay_ms = delay.as_millis() as u64,
                    "Delivery attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        if last_error.is_some_and(|c| c.is_transient()) {
            error!(
                target = %target.name,
                attempts,
                error = ?last_error,
                "Delivery failed after all attempts"
            );
        }

        DispatchOutcome {
            target: target.name.clone(),
            attempts,
            status: DeliveryStatus::Failed,
            last_error,
            status_code,
            latency_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
