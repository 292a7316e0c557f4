// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Access Assessment Error Types
 * Error taxonomy for role sessions, navigation, probes and detection
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use std::time::Duration;
use thiserror::Error;

/// Main error type for the access assessment engine
#[derive(Error, Debug)]
pub enum AccessError {
    /// Pool exhausted, role unknown or session could not be opened. Aborts the run.
    #[error("Session unavailable for role '{role}': {reason}")]
    SessionUnavailable {
        role: String,
        reason: String,
    },

    /// Navigation or submit exceeded its bounded timeout
    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout {
        url: String,
        timeout: Duration,
    },

    /// Navigation failed for a reason other than a timeout
    #[error("Navigation to {url} failed: {reason}")]
    Navigation {
        url: String,
        reason: String,
    },

    /// All retries exhausted for a single probe
    #[error("Probe of {target} failed after {attempts} attempts: {reason}")]
    ProbeFailure {
        target: String,
        attempts: u32,
        reason: String,
    },

    /// Detection signal present but below the confidence threshold
    #[error("Ambiguous detection on {url} (confidence {confidence:.2})")]
    DetectionAmbiguous {
        url: String,
        confidence: f64,
    },

    /// Driver-level failures
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Report schema / invariant violations
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem errors (screenshots, reports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a browser-automation driver
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Timed out after {timeout:?} on {url}")]
    Timeout {
        url: String,
        timeout: Duration,
    },

    #[error("Request to {url} failed: {reason}")]
    Request {
        url: String,
        reason: String,
    },

    #[error("No element matches selector '{selector}'")]
    ElementNotFound {
        selector: String,
    },

    #[error("Invalid selector '{selector}'")]
    InvalidSelector {
        selector: String,
    },

    #[error("Login failed for role '{role}': {reason}")]
    LoginFailed {
        role: String,
        reason: String,
    },

    #[error("Operation not supported by this driver: {0}")]
    Unsupported(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Check if the driver failure is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::Timeout { .. } => true,
            DriverError::Request { .. } => true,
            DriverError::ElementNotFound { .. } => false,
            DriverError::InvalidSelector { .. } => false,
            DriverError::LoginFailed { .. } => false,
            DriverError::Unsupported(_) => false,
            DriverError::SessionClosed => false,
            DriverError::Other(_) => false,
        }
    }
}

impl AccessError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AccessError::NavigationTimeout { .. } => true,
            AccessError::Navigation { .. } => true,
            AccessError::Driver(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Fatal errors abort the whole run; everything else becomes a result record
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AccessError::SessionUnavailable { .. }
                | AccessError::Configuration(_)
                | AccessError::Validation(_)
        )
    }

    /// Wrap a driver error with the URL it happened on
    pub fn from_driver(url: &str, err: DriverError) -> Self {
        match err {
            DriverError::Timeout { timeout, .. } => AccessError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            },
            DriverError::Request { reason, .. } => AccessError::Navigation {
                url: url.to_string(),
                reason,
            },
            other => AccessError::Driver(other),
        }
    }
}

/// Result type for assessment operations
pub type AccessResult<T> = Result<T, AccessError>;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = AccessError::NavigationTimeout {
            url: "https://app.test/admin".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());

        let missing = AccessError::Driver(DriverError::ElementNotFound {
            selector: "#submit".to_string(),
        });
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        let pool = AccessError::SessionUnavailable {
            role: "admin".to_string(),
            reason: "pool exhausted".to_string(),
        };
        assert!(pool.is_fatal());
        assert!(AccessError::Configuration("bad".to_string()).is_fatal());
        assert!(!AccessError::ProbeFailure {
            target: "/x".to_string(),
            attempts: 3,
            reason: "timeout".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_from_driver_maps_timeouts() {
        let err = AccessError::from_driver(
            "/users",
            DriverError::Timeout {
                url: "/users".to_string(),
                timeout: Duration::from_millis(250),
            },
        );
        assert!(matches!(err, AccessError::NavigationTimeout { .. }));
    }
}
