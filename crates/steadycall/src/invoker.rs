//! The resilient invocation loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::InvokeConfig;
use crate::error::{ClassifiedError, FailureDetails};
use crate::events::{CallEvent, Correlation, EventSink, TracingSink};

/// Executes operations against one logical upstream service with a
/// per-attempt timeout, failure classification, and retry with backoff.
///
/// Build one per service and share it freely: the wrapper holds no mutable
/// state, so concurrent invocations are fully independent. There is no
/// process-global instance; whoever needs resilient calls constructs an
/// `Invoker` (or receives one) with the configuration for that service.
///
/// # Examples
///
/// ```rust,no_run
/// use steadycall::{Invoker, InvokeConfig, RawServiceError};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), steadycall::ClassifiedError> {
/// let config = InvokeConfig::builder()
///     .attempts(3)
///     .base_delay(Duration::from_millis(100))
///     .build()
///     .expect("valid config");
/// let gemini = Invoker::new("gemini", config);
///
/// let caption = gemini
///     .invoke("generate-caption", || async {
///         Err::<String, _>(RawServiceError::with_status("overloaded", 503))
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Invoker {
    service: String,
    config: InvokeConfig,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Create an invoker for a logical service with the default
    /// `tracing`-backed event sink.
    pub fn new(service: impl Into<String>, config: InvokeConfig) -> Self {
        Self {
            service: service.into(),
            config,
            sink: Arc::new(TracingSink),
        }
    }

    /// Create a builder for configuring an invoker.
    pub fn builder(service: impl Into<String>) -> InvokerBuilder {
        InvokerBuilder {
            service: service.into(),
            config: None,
            sink: None,
        }
    }

    /// The logical service label this invoker targets.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The configuration this invoker runs with.
    pub fn config(&self) -> &InvokeConfig {
        &self.config
    }

    /// Invoke an operation without correlation ids.
    ///
    /// See [`invoke_with`](Invoker::invoke_with).
    pub async fn invoke<T, E, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + FailureDetails,
    {
        self.invoke_with(operation, &Correlation::default(), op).await
    }

    /// Invoke an operation, retrying retryable failures up to the
    /// configured attempt budget.
    ///
    /// The closure is called once per attempt and must produce a fresh
    /// future each time; the wrapper offers no at-most-once guarantee, so
    /// the operation must be safe to repeat. Each attempt races against
    /// the configured timeout; a losing operation future is dropped, which
    /// cancels its in-flight work at the next await point.
    ///
    /// Returns the operation's success value unchanged, or the last
    /// attempt's [`ClassifiedError`] once the budget is exhausted or a
    /// non-retryable failure occurs. Correlation ids are threaded into
    /// events only; they never affect control flow.
    pub async fn invoke_with<T, E, F, Fut>(
        &self,
        operation: &str,
        correlation: &Correlation,
        mut op: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + FailureDetails,
    {
        // A hand-built config can bypass builder validation; a zero budget
        // would never run the operation at all.
        let budget = self.config.attempts.max(1);
        let started = Instant::now();

        self.sink.emit(CallEvent::Started {
            service: &self.service,
            operation,
            correlation,
        });

        let mut attempt = 1u32;
        loop {
            let failure = match tokio::time::timeout(self.config.timeout, op()).await {
                Ok(Ok(value)) => {
                    self.sink.emit(CallEvent::Succeeded {
                        service: &self.service,
                        operation,
                        correlation,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                    return Ok(value);
                }
                Ok(Err(raw)) => ClassifiedError::from_failure(&self.service, &raw),
                Err(_) => ClassifiedError::timed_out(&self.service, self.config.timeout),
            };

            if !failure.is_retryable() || attempt >= budget {
                self.sink.emit(CallEvent::Failed {
                    service: &self.service,
                    operation,
                    correlation,
                    attempts: attempt,
                    kind: failure.kind,
                    message: &failure.message,
                });
                return Err(failure);
            }

            let delay = self.config.delay_before_retry(attempt);
            self.sink.emit(CallEvent::Retry {
                service: &self.service,
                operation,
                correlation,
                attempt,
                delay,
                kind: failure.kind,
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Builder for [`Invoker`].
pub struct InvokerBuilder {
    service: String,
    config: Option<InvokeConfig>,
    sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for InvokerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokerBuilder")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InvokerBuilder {
    /// Set the retry/timeout configuration.
    pub fn config(mut self, config: InvokeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Install a custom event sink in place of the default
    /// [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the invoker, defaulting unset pieces.
    pub fn build(self) -> Invoker {
        Invoker {
            service: self.service,
            config: self.config.unwrap_or_default(),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
        }
    }
}
