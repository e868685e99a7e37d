//! Failure classification for upstream service calls.
//!
//! Every raw failure is normalized into a [`ClassifiedError`] before any
//! retry decision is made. Classification prefers a structured status code
//! when the failure carries one and falls back to substring heuristics on
//! the message for untyped errors. The substring table is deliberately
//! small and covered by tests, since upstream SDK wording drifts between
//! versions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories the wrapper distinguishes.
///
/// Callers pattern-match on this to decide how to surface a terminal
/// failure: [`QuotaExceeded`](ErrorKind::QuotaExceeded) is
/// billing-actionable, [`Timeout`](ErrorKind::Timeout) and
/// [`ServiceUnavailable`](ErrorKind::ServiceUnavailable) are transient,
/// [`ClientError`](ErrorKind::ClientError) means the request itself needs
/// fixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The attempt outlived its deadline, or the upstream reported a timeout.
    Timeout,
    /// HTTP 429 or an explicit rate-limit message. Retryable despite 4xx.
    RateLimited,
    /// Quota or billing exhaustion. Never retried.
    QuotaExceeded,
    /// 5xx, or an explicit unavailability message.
    ServiceUnavailable,
    /// Any other 4xx. Never retried; the request is at fault.
    ClientError,
    /// Everything else.
    Unknown,
}

impl ErrorKind {
    /// Whether policy permits another attempt for this kind.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::ClientError | ErrorKind::QuotaExceeded)
    }

    /// Classify a raw failure from its status code (preferred) or message.
    ///
    /// Status rules: 429 is rate limiting, 5xx is unavailability, any other
    /// 4xx is a client error. Failures without a status fall through to the
    /// message table: "timeout", "rate limit", "quota"/"billing",
    /// "unavailable", matched case-insensitively.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        match status {
            Some(429) => return ErrorKind::RateLimited,
            Some(s) if s >= 500 => return ErrorKind::ServiceUnavailable,
            Some(s) if (400..500).contains(&s) => return ErrorKind::ClientError,
            _ => {}
        }

        let message = message.to_lowercase();
        if message.contains("timeout") {
            ErrorKind::Timeout
        } else if message.contains("rate limit") {
            ErrorKind::RateLimited
        } else if message.contains("quota") || message.contains("billing") {
            ErrorKind::QuotaExceeded
        } else if message.contains("unavailable") {
            ErrorKind::ServiceUnavailable
        } else {
            ErrorKind::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::QuotaExceeded => "quota-exceeded",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::ClientError => "client-error",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured details a failure type can expose to classification.
///
/// The default implementations return `None`, so plain text errors work
/// unchanged; richer types override [`status`](FailureDetails::status) to
/// get status-based classification instead of the substring fallback.
pub trait FailureDetails {
    /// Numeric status code carried by the failure, if any.
    fn status(&self) -> Option<u16> {
        None
    }

    /// Server-supplied retry-after hint, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl FailureDetails for String {}
impl FailureDetails for &str {}
impl FailureDetails for std::io::Error {}
impl FailureDetails for anyhow::Error {}

/// The normalized failure surfaced to callers when an invocation fails.
///
/// Carries the classification [`kind`](ClassifiedError::kind), the logical
/// service the invocation targeted, the raw message, and whatever
/// structured details the failure exposed. The last attempt's error is the
/// one the caller receives; earlier attempts are visible only through the
/// event sink.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{service}: {message} [{kind}]")]
pub struct ClassifiedError {
    /// Failure category, drives retryability.
    pub kind: ErrorKind,
    /// Label of the logical service the invocation targeted.
    pub service: String,
    /// Human-readable message from the raw failure.
    pub message: String,
    /// Numeric status from the raw failure, when it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Server-supplied retry-after hint. Recorded for callers and logs;
    /// the backoff schedule does not consume it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl ClassifiedError {
    /// Classify a raw failure against a service label.
    pub fn from_failure<E>(service: &str, failure: &E) -> Self
    where
        E: fmt::Display + FailureDetails,
    {
        let message = failure.to_string();
        let status = failure.status();
        Self {
            kind: ErrorKind::classify(status, &message),
            service: service.to_owned(),
            message,
            status,
            retry_after: failure.retry_after(),
        }
    }

    /// Failure for an attempt that outlived the configured deadline.
    pub(crate) fn timed_out(service: &str, limit: Duration) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            service: service.to_owned(),
            message: format!("operation timed out after {limit:?}"),
            status: None,
            retry_after: None,
        }
    }

    /// Whether policy permits another attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// A service failure in the shape HTTP-backed SDKs raise: a free-text
/// message plus optional status code and retry-after hint.
///
/// Use this when the upstream SDK hands back enough structure to fill the
/// fields; classification will then run on the status instead of guessing
/// from the message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RawServiceError {
    /// Message from the upstream service or SDK.
    pub message: String,
    /// HTTP status, when the failure came from an HTTP response.
    pub status: Option<u16>,
    /// Retry-after hint parsed from the response, when present.
    pub retry_after: Option<Duration>,
}

impl RawServiceError {
    /// Untyped failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// Failure carrying an HTTP status.
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            retry_after: None,
        }
    }

    /// Attach a server-supplied retry-after hint.
    pub fn with_retry_after(mut self, hint: Duration) -> Self {
        self.retry_after = Some(hint);
        self
    }

    /// Build a failure from an HTTP status and response body.
    ///
    /// Understands the `{"error": {"message": ...}}` envelope that AI
    /// service APIs return; any other body is kept verbatim as the message.
    pub fn from_json_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.to_owned());
        Self::with_status(message, status)
    }
}

impl FailureDetails for RawServiceError {
    fn status(&self) -> Option<u16> {
        self.status
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
