// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Retry Logic with Backoff and Timeout Escalation
 * Pure backoff/timeout policy plus the async loop that applies it
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use crate::errors::{AccessError, AccessResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Constant added per attempt by the balanced strategy
const BALANCED_STEP: Duration = Duration::from_secs(2);

/// How the per-attempt navigation timeout evolves across retries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutStrategy {
    /// Half the base timeout on every attempt
    Aggressive,
    /// Base timeout plus a small constant per attempt
    #[default]
    Balanced,
    /// Base timeout multiplied by the attempt number
    Patient,
}

impl TimeoutStrategy {
    /// Timeout for a 1-based attempt number
    pub fn attempt_timeout(&self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            TimeoutStrategy::Aggressive => base / 2,
            TimeoutStrategy::Balanced => base + BALANCED_STEP * (attempt - 1),
            TimeoutStrategy::Patient => base * attempt,
        }
    }
}

impl std::fmt::Display for TimeoutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutStrategy::Aggressive => write!(f, "aggressive"),
            TimeoutStrategy::Balanced => write!(f, "balanced"),
            TimeoutStrategy::Patient => write!(f, "patient"),
        }
    }
}

/// What to do when a probe keeps failing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorRecoveryMode {
    /// Single attempt, failures recorded immediately
    Skip,
    /// Retry up to the configured attempt count
    #[default]
    Retry,
    /// Retry, then one last attempt with relaxed wait conditions
    Fallback,
}

/// Retry configuration with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential)
    pub backoff_multiplier: f64,

    /// Enable jitter to prevent thundering herd
    pub enable_jitter: bool,

    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,

    /// Base per-attempt timeout
    pub base_timeout: Duration,

    /// Timeout escalation across attempts
    pub timeout_strategy: TimeoutStrategy,

    /// Failure handling mode
    pub recovery: ErrorRecoveryMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            enable_jitter: false,
            jitter_factor: 0.3,
            base_timeout: Duration::from_secs(30),
            timeout_strategy: TimeoutStrategy::Balanced,
            recovery: ErrorRecoveryMode::Retry,
        }
    }
}

/// Per-attempt parameters handed to the retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number
    pub attempt: u32,
    /// Timeout the operation is held to
    pub timeout: Duration,
    /// True for the relaxed last attempt of fallback mode
    pub fallback: bool,
}

impl RetryConfig {
    /// Create a new retry config with custom max attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a new retry config with custom initial backoff
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Create a new retry config with custom base timeout
    pub fn with_timeout(mut self, base_timeout: Duration, strategy: TimeoutStrategy) -> Self {
        self.base_timeout = base_timeout;
        self.timeout_strategy = strategy;
        self
    }

    /// Create a new retry config with a recovery mode
    pub fn with_recovery(mut self, recovery: ErrorRecoveryMode) -> Self {
        self.recovery = recovery;
        self
    }

    /// Create a new retry config with jitter enabled
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.enable_jitter = true;
        self.jitter_factor = factor;
        self
    }

    /// Number of attempts the recovery mode actually allows
    pub fn effective_attempts(&self) -> u32 {
        match self.recovery {
            ErrorRecoveryMode::Skip => 1,
            ErrorRecoveryMode::Retry => self.max_attempts.max(1),
            ErrorRecoveryMode::Fallback => self.max_attempts.max(1) + 1,
        }
    }

    /// Calculate backoff duration before the attempt following `attempt`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let base_backoff = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped_backoff = base_backoff.min(self.max_backoff.as_millis() as f64);

        let backoff_with_jitter = if self.enable_jitter && capped_backoff > 0.0 {
            let mut rng = rand::rng();
            let jitter_range = capped_backoff * self.jitter_factor;
            let jitter = rng.random_range(-jitter_range..jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::from_millis(backoff_with_jitter as u64)
    }

    /// Attempt parameters for a 1-based attempt number
    pub fn attempt_context(&self, attempt: u32) -> AttemptContext {
        let fallback =
            self.recovery == ErrorRecoveryMode::Fallback && attempt == self.effective_attempts();
        let timeout = if fallback {
            TimeoutStrategy::Patient.attempt_timeout(self.base_timeout, attempt)
        } else {
            self.timeout_strategy.attempt_timeout(self.base_timeout, attempt)
        };

        AttemptContext {
            attempt,
            timeout,
            fallback,
        }
    }
}

/// Retry an operation with backoff, holding every attempt to its timeout
///
/// An attempt that exceeds its timeout fails with `NavigationTimeout`, which is
/// retryable. Non-retryable errors stop the loop immediately. Exhaustion yields
/// `ProbeFailure` carrying the last error.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    target: &str,
    mut operation: F,
) -> AccessResult<T>
where
    F: FnMut(AttemptContext) -> Fut,
    Fut: Future<Output = AccessResult<T>>,
{
    let attempts = config.effective_attempts();
    let mut last_error: Option<AccessError> = None;

    for attempt in 1..=attempts {
        let ctx = config.attempt_context(attempt);

        debug!(
            attempt = attempt,
            max_attempts = attempts,
            target = target,
            timeout_ms = ctx.timeout.as_millis() as u64,
            fallback = ctx.fallback,
            "Executing operation"
        );

        let outcome = match tokio::time::timeout(ctx.timeout, operation(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AccessError::NavigationTimeout {
                url: target.to_string(),
                timeout: ctx.timeout,
            }),
        };

        match outcome {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt = attempt, target = target, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                let retryable = err.is_retryable();

                warn!(
                    attempt = attempt,
                    max_attempts = attempts,
                    target = target,
                    error = %err,
                    retryable = retryable,
                    "Operation failed"
                );

                if !retryable {
                    return Err(err);
                }

                last_error = Some(err);

                if attempt < attempts {
                    let backoff = config.calculate_backoff(attempt);
                    debug!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        target = target,
                        "Backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    Err(AccessError::ProbeFailure {
        target: target.to_string(),
        attempts,
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(max_attempts)
            .with_initial_backoff(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(1), TimeoutStrategy::Balanced)
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            ..RetryConfig::default()
        };

        assert_eq!(config.calculate_backoff(0), Duration::from_secs(0));
        assert_eq!(config.calculate_backoff(1), Duration::from_millis(100));
        assert_eq!(config.calculate_backoff(2), Duration::from_millis(200));
        assert_eq!(config.calculate_backoff(3), Duration::from_millis(400));
        assert_eq!(config.calculate_backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_with_max_cap() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            ..RetryConfig::default()
        };

        assert_eq!(config.calculate_backoff(3), Duration::from_secs(4));
        assert_eq!(config.calculate_backoff(4), Duration::from_secs(5));
        assert_eq!(config.calculate_backoff(9), Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_strategies() {
        let base = Duration::from_secs(10);

        assert_eq!(TimeoutStrategy::Aggressive.attempt_timeout(base, 1), Duration::from_secs(5));
        assert_eq!(TimeoutStrategy::Aggressive.attempt_timeout(base, 3), Duration::from_secs(5));

        assert_eq!(TimeoutStrategy::Patient.attempt_timeout(base, 1), Duration::from_secs(10));
        assert_eq!(TimeoutStrategy::Patient.attempt_timeout(base, 3), Duration::from_secs(30));

        assert_eq!(TimeoutStrategy::Balanced.attempt_timeout(base, 1), Duration::from_secs(10));
        assert_eq!(TimeoutStrategy::Balanced.attempt_timeout(base, 3), Duration::from_secs(14));
    }

    #[test]
    fn test_recovery_mode_attempts() {
        let config = RetryConfig::default().with_max_attempts(3);
        assert_eq!(config.clone().with_recovery(ErrorRecoveryMode::Skip).effective_attempts(), 1);
        assert_eq!(config.clone().with_recovery(ErrorRecoveryMode::Retry).effective_attempts(), 3);

        let fallback = config.with_recovery(ErrorRecoveryMode::Fallback);
        assert_eq!(fallback.effective_attempts(), 4);
        assert!(!fallback.attempt_context(3).fallback);
        assert!(fallback.attempt_context(4).fallback);
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: AccessResult<&str> = retry_with_backoff(&quick_config(3), "/dashboard", |_| {
            let counter = Arc::clone(&counter_clone);
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(AccessError::Navigation {
                        url: "/dashboard".to_string(),
                        reason: "connection reset".to_string(),
                    })
                } else {
                    Ok("Success")
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_yields_probe_failure() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: AccessResult<()> = retry_with_backoff(&quick_config(3), "/reports", |_| {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AccessError::NavigationTimeout {
                    url: "/reports".to_string(),
                    timeout: Duration::from_secs(1),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AccessError::ProbeFailure { attempts: 3, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: AccessResult<()> = retry_with_backoff(&quick_config(5), "/settings", |_| {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AccessError::Configuration("Invalid config".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(AccessError::Configuration(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let result: AccessResult<u32> = retry_with_backoff(&quick_config(2), "/slow", |ctx| {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(ctx.attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
