#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Resilient invocation of flaky upstream services.
//!
//! `steadycall` wraps a fallible async operation with a per-attempt
//! timeout, classifies failures into a small taxonomy, and retries the
//! transient ones with exponential backoff and jitter. It exists for
//! outbound calls to generative-AI and payment APIs, where transient
//! 5xx/429 responses are routine but quota exhaustion and malformed
//! requests must fail fast.
//!
//! The pieces:
//!
//! - [`Invoker`]: one per logical service; runs the attempt loop
//! - [`InvokeConfig`]: attempt budget, backoff schedule, per-attempt timeout
//! - [`ClassifiedError`] / [`ErrorKind`]: the normalized failure callers
//!   pattern-match on
//! - [`EventSink`]: side-channel lifecycle events, `tracing`-backed by
//!   default
//!
//! # Examples
//!
//! ```rust,no_run
//! use steadycall::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gemini = Invoker::builder("gemini")
//!     .config(
//!         InvokeConfig::builder()
//!             .attempts(3)
//!             .base_delay(Duration::from_millis(100))
//!             .timeout(Duration::from_secs(30))
//!             .build()?,
//!     )
//!     .build();
//!
//! let caption = gemini
//!     .invoke("generate-caption", || async {
//!         // Call into the upstream SDK here.
//!         Ok::<_, RawServiceError>("a caption".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Terminal failures carry the last attempt's classification, so callers
//! can surface quota problems differently from transient outages:
//!
//! ```rust,no_run
//! use steadycall::ErrorKind;
//! # fn surface(err: steadycall::ClassifiedError) {
//! match err.kind {
//!     ErrorKind::QuotaExceeded => { /* point the user at billing */ }
//!     ErrorKind::ClientError => { /* the request needs fixing */ }
//!     _ => { /* transient; suggest trying again */ }
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod invoker;

pub use config::{ConfigError, InvokeConfig, InvokeConfigBuilder};
pub use error::{ClassifiedError, ErrorKind, FailureDetails, RawServiceError};
pub use events::{CallEvent, Correlation, EventSink, TracingSink};
pub use invoker::{Invoker, InvokerBuilder};

/// Convenient re-exports of commonly used items.
///
/// Import everything with:
///
/// ```rust
/// use steadycall::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigError, InvokeConfig};
    pub use crate::error::{ClassifiedError, ErrorKind, FailureDetails, RawServiceError};
    pub use crate::events::{CallEvent, Correlation, EventSink, TracingSink};
    pub use crate::invoker::Invoker;
}
