//! Invocation configuration and the backoff schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for [`InvokeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The attempt budget was zero; the operation would never run.
    #[error("attempts must be at least 1")]
    ZeroAttempts,

    /// The backoff multiplier would shrink delays instead of growing them.
    #[error("multiplier must be at least 1.0, got {0}")]
    MultiplierBelowOne(f64),

    /// A zero timeout fails every attempt before the operation can settle.
    #[error("timeout must be non-zero")]
    ZeroTimeout,

    /// The delay cap is below the starting delay.
    #[error("max_delay ({max:?}) must not be below base_delay ({base:?})")]
    DelayCapBelowBase {
        /// Configured starting delay.
        base: Duration,
        /// Configured cap.
        max: Duration,
    },
}

/// Retry and timeout configuration for one wrapper instance.
///
/// Immutable once built. Construct via [`InvokeConfig::builder`] to get
/// validation, or rely on [`Default`] for sensible values (3 attempts,
/// 100ms base delay doubling up to 60s, 30s per-attempt timeout).
///
/// The struct derives serde so it can be embedded in an application's
/// config file; unset fields fall back to the defaults.
///
/// # Examples
///
/// ```rust
/// use steadycall::InvokeConfig;
/// use std::time::Duration;
///
/// let config = InvokeConfig::builder()
///     .attempts(5)
///     .base_delay(Duration::from_millis(250))
///     .multiplier(1.5)
///     .build()?;
/// # Ok::<(), steadycall::ConfigError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeConfig {
    /// Total attempt budget, including the first attempt.
    pub attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Cap applied to the computed backoff delay (jitter is added on top).
    pub max_delay: Duration,

    /// Exponential growth factor between successive retries.
    pub multiplier: f64,

    /// Per-attempt deadline; an attempt slower than this counts as failed.
    pub timeout: Duration,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl InvokeConfig {
    /// Create a builder for configuring an `InvokeConfig`.
    pub fn builder() -> InvokeConfigBuilder {
        InvokeConfigBuilder::default()
    }

    /// Backoff delay applied after `completed` failed attempts (1-based),
    /// before attempt `completed + 1` starts.
    ///
    /// `min(max_delay, base_delay * multiplier^(completed - 1))` plus an
    /// additive jitter of 0–10% of the capped value. The jitter is applied
    /// after the cap, so the returned delay can exceed `max_delay` by up
    /// to 10%.
    pub fn delay_before_retry(&self, completed: u32) -> Duration {
        let base = self.base_delay_before_retry(completed);
        base + base.mul_f64(rand::random::<f64>() * 0.1)
    }

    /// The deterministic part of [`delay_before_retry`], without jitter.
    ///
    /// [`delay_before_retry`]: InvokeConfig::delay_before_retry
    pub fn base_delay_before_retry(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
    }
}

/// Builder for [`InvokeConfig`].
///
/// Unset fields take the [`Default`] values; `build` validates the result.
#[derive(Debug, Default)]
pub struct InvokeConfigBuilder {
    attempts: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    timeout: Option<Duration>,
}

impl InvokeConfigBuilder {
    /// Set the total attempt budget, including the first attempt.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Set the cap applied to computed backoff delays.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the exponential growth factor between retries.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the per-attempt deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the config, validating the combination of values.
    pub fn build(self) -> Result<InvokeConfig, ConfigError> {
        let defaults = InvokeConfig::default();
        let config = InvokeConfig {
            attempts: self.attempts.unwrap_or(defaults.attempts),
            base_delay: self.base_delay.unwrap_or(defaults.base_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            timeout: self.timeout.unwrap_or(defaults.timeout),
        };

        if config.attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if config.multiplier < 1.0 {
            return Err(ConfigError::MultiplierBelowOne(config.multiplier));
        }
        if config.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if config.max_delay < config.base_delay {
            return Err(ConfigError::DelayCapBelowBase {
                base: config.base_delay,
                max: config.max_delay,
            });
        }

        Ok(config)
    }
}
