//! Side-channel observability for invocations.
//!
//! The invocation loop reports its lifecycle through an [`EventSink`].
//! Sinks only observe: nothing in the loop depends on what a sink does,
//! and a caller ignoring events sees identical success/failure behavior.

use std::time::Duration;

use uuid::Uuid;

use crate::error::ErrorKind;

/// Correlation identifiers attached to events for log stitching.
///
/// Purely observational; the wrapper never branches on these.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    /// Identifier of the caller on whose behalf the invocation runs.
    pub caller: Option<String>,
    /// Identifier of this request, for joining events across services.
    pub request: Option<String>,
}

impl Correlation {
    /// Correlation with a freshly minted request id.
    pub fn request() -> Self {
        Self {
            caller: None,
            request: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Attach a caller identifier.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// One lifecycle event of a single invocation.
#[derive(Debug, Clone)]
pub enum CallEvent<'a> {
    /// Emitted once, before the first attempt runs.
    Started {
        /// Logical service label.
        service: &'a str,
        /// Operation descriptor supplied by the caller.
        operation: &'a str,
        /// Correlation ids for this invocation.
        correlation: &'a Correlation,
    },
    /// Emitted after a retryable failure, before the backoff sleep.
    Retry {
        /// Logical service label.
        service: &'a str,
        /// Operation descriptor supplied by the caller.
        operation: &'a str,
        /// Correlation ids for this invocation.
        correlation: &'a Correlation,
        /// Index of the attempt that just failed (1-based).
        attempt: u32,
        /// Sleep applied before the next attempt.
        delay: Duration,
        /// Classification of the failure that triggered the retry.
        kind: ErrorKind,
    },
    /// Emitted when an attempt returns the operation's success value.
    Succeeded {
        /// Logical service label.
        service: &'a str,
        /// Operation descriptor supplied by the caller.
        operation: &'a str,
        /// Correlation ids for this invocation.
        correlation: &'a Correlation,
        /// Number of attempts consumed, including the successful one.
        attempts: u32,
        /// Wall-clock time from first attempt to success.
        elapsed: Duration,
    },
    /// Emitted when the invocation gives up.
    Failed {
        /// Logical service label.
        service: &'a str,
        /// Operation descriptor supplied by the caller.
        operation: &'a str,
        /// Correlation ids for this invocation.
        correlation: &'a Correlation,
        /// Number of attempts consumed.
        attempts: u32,
        /// Classification of the final failure.
        kind: ErrorKind,
        /// Message of the final failure.
        message: &'a str,
    },
}

/// Receives invocation lifecycle events.
///
/// Implementations must be cheap and must not block; they run inline on
/// the invocation path.
pub trait EventSink: Send + Sync {
    /// Observe one event.
    fn emit(&self, event: CallEvent<'_>);
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CallEvent<'_>) {
        match event {
            CallEvent::Started {
                service,
                operation,
                correlation,
            } => {
                tracing::debug!(
                    service,
                    operation,
                    caller = correlation.caller.as_deref(),
                    request = correlation.request.as_deref(),
                    "request started"
                );
            }
            CallEvent::Retry {
                service,
                operation,
                correlation,
                attempt,
                delay,
                kind,
            } => {
                tracing::warn!(
                    service,
                    operation,
                    request = correlation.request.as_deref(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = %kind,
                    "attempt failed, retrying"
                );
            }
            CallEvent::Succeeded {
                service,
                operation,
                correlation,
                attempts,
                elapsed,
            } => {
                tracing::info!(
                    service,
                    operation,
                    request = correlation.request.as_deref(),
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request succeeded"
                );
            }
            CallEvent::Failed {
                service,
                operation,
                correlation,
                attempts,
                kind,
                message,
            } => {
                tracing::error!(
                    service,
                    operation,
                    request = correlation.request.as_deref(),
                    attempts,
                    kind = %kind,
                    error = message,
                    "request failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_request_ids_are_unique() {
        let a = Correlation::request();
        let b = Correlation::request();

        assert!(a.request.is_some());
        assert_ne!(a.request, b.request);
    }

    #[test]
    fn caller_id_is_carried() {
        let correlation = Correlation::request().with_caller("user-42");

        assert_eq!(correlation.caller.as_deref(), Some("user-42"));
        assert!(correlation.request.is_some());
    }
}
