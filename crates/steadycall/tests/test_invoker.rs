//! End-to-end invocation scenarios under virtual time.
//!
//! `start_paused` makes tokio's clock advance only when every task is
//! idle, so backoff and timeout accounting can be asserted exactly
//! without slowing the suite down.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use steadycall::prelude::*;
use tokio::time::Instant;

fn config(attempts: u32) -> InvokeConfig {
    InvokeConfig::builder()
        .attempts(attempts)
        .base_delay(Duration::from_millis(100))
        .multiplier(2.0)
        .max_delay(Duration::from_secs(10))
        .timeout(Duration::from_secs(1))
        .build()
        .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn server_errors_then_success() {
    let invoker = Invoker::new("gemini", config(3));
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result = invoker
        .invoke("generate-caption", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RawServiceError::with_status("Server error", 500))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    let elapsed = started.elapsed();
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Two backoff sleeps: 100ms and 200ms, each jittered by at most 10%.
    assert!(elapsed >= Duration::from_millis(300), "got {elapsed:?}");
    assert!(elapsed < Duration::from_millis(331), "got {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn retryable_failure_consumes_entire_budget() {
    for attempts in [1, 2, 5] {
        let invoker = Invoker::new("gemini", config(attempts));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = invoker
            .invoke("generate-caption", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RawServiceError::with_status("Server error", 503)) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), attempts);
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(err.status, Some(503));
    }
}

#[tokio::test(start_paused = true)]
async fn fails_once_then_succeeds() {
    let invoker = Invoker::new("gemini", config(3));
    let calls = AtomicU32::new(0);

    let result = invoker
        .invoke("generate-image", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RawServiceError::with_status("Too many requests", 429))
                } else {
                    Ok(vec![0u8; 4])
                }
            }
        })
        .await;

    assert_eq!(result.unwrap().len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn bad_request_fails_after_one_call() {
    let invoker = Invoker::new("gemini", config(3));
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result: Result<String, _> = invoker
        .invoke("generate-caption", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RawServiceError::with_status("Bad request", 400)) }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.kind, ErrorKind::ClientError);
    // Fail-fast: no backoff sleep after the final attempt.
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn quota_message_fails_after_one_call() {
    let invoker = Invoker::new("gemini", config(5));
    let calls = AtomicU32::new(0);

    let result: Result<String, _> = invoker
        .invoke("generate-video", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RawServiceError::new("Quota exceeded")) }
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.kind, ErrorKind::QuotaExceeded);
}

#[tokio::test(start_paused = true)]
async fn hanging_operation_times_out_every_attempt() {
    let invoker = Invoker::new(
        "gemini",
        InvokeConfig::builder()
            .attempts(3)
            .base_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap(),
    );
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result: Result<String, _> = invoker
        .invoke("generate-caption", || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<String, RawServiceError>>()
        })
        .await;

    let elapsed = started.elapsed();
    let err = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.message.contains("timed out"));
    // Three 100ms timeout waits plus two jittered backoff sleeps.
    assert!(elapsed >= Duration::from_millis(600), "got {elapsed:?}");
    assert!(elapsed < Duration::from_millis(631), "got {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn slow_attempt_is_abandoned_and_retried() {
    let invoker = Invoker::new(
        "gemini",
        InvokeConfig::builder()
            .attempts(2)
            .base_delay(Duration::from_millis(100))
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap(),
    );
    let calls = AtomicU32::new(0);

    let result = invoker
        .invoke("generate-caption", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    // Would settle after the deadline; the wrapper stops
                    // waiting and this future is dropped.
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    Ok::<_, RawServiceError>("late")
                } else {
                    Ok("fresh")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn bare_string_failure_is_unknown_but_handled() {
    let invoker = Invoker::new("gemini", config(2));
    let calls = AtomicU32::new(0);

    let result: Result<String, _> = invoker
        .invoke("generate-caption", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

    let err = result.unwrap_err();
    // Unknown errors are retryable, so the whole budget is used.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(err.message, "boom");
}

#[tokio::test(start_paused = true)]
async fn immediate_success_sleeps_not_at_all() {
    let invoker = Invoker::new("gemini", config(5));
    let started = Instant::now();

    let result = invoker
        .invoke("generate-caption", || async { Ok::<_, String>("ok") })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(started.elapsed(), Duration::ZERO);
}

/// Sink that remembers the request id and shape of every event.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, Option<String>)>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CallEvent<'_>) {
        let (label, correlation) = match event {
            CallEvent::Started { correlation, .. } => ("started", correlation),
            CallEvent::Retry { correlation, .. } => ("retry", correlation),
            CallEvent::Succeeded { correlation, .. } => ("succeeded", correlation),
            CallEvent::Failed { correlation, .. } => ("failed", correlation),
        };
        self.events
            .lock()
            .unwrap()
            .push((label.to_string(), correlation.request.clone()));
    }
}

#[tokio::test(start_paused = true)]
async fn correlation_ids_reach_every_event() {
    let sink = Arc::new(RecordingSink::default());
    let invoker = Invoker::builder("gemini")
        .config(config(3))
        .sink(Arc::clone(&sink) as Arc<dyn EventSink>)
        .build();

    let correlation = Correlation::request().with_caller("user-42");
    let request_id = correlation.request.clone();
    let calls = AtomicU32::new(0);

    let result = invoker
        .invoke_with("generate-caption", &correlation, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RawServiceError::with_status("Server error", 500))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    assert!(result.is_ok());
    let events = sink.events.lock().unwrap();
    let labels: Vec<_> = events.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels, vec!["started", "retry", "succeeded"]);
    assert!(events.iter().all(|(_, request)| *request == request_id));
}
