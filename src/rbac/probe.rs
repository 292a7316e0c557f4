// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Access probes against a live page, classified into allow / deny / error.
//!
//! Content wins over transport: when a configured success marker is present
//! in the body, the probe is an `allow` whatever the status code said.

use crate::config::AppConfig;
use crate::crawler::classify_access;
use crate::driver::{resolve_url, ApiRequest, NavigationOptions, PageResponse};
use crate::errors::{AccessError, AccessResult, DriverError};
use crate::events::{EventLedger, LedgerMarker};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::session_pool::PageLease;
use crate::str_utils::excerpt;
use crate::types::{AccessOutcome, Evidence};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Body text that marks a soft denial on an otherwise successful page
const DENIAL_TEXT: &[&str] = &[
    "access denied",
    "permission denied",
    "not authorized",
    "not authorised",
    "insufficient privileges",
    "insufficient permissions",
    "you do not have permission",
    "forbidden",
];

/// Soft-denial text is only trusted on short pages
const SOFT_DENIAL_MAX_BODY: usize = 4096;

const SNIPPET_LEN: usize = 300;
const MAX_EVIDENCE_HEADERS: usize = 20;

/// Content markers a probe looks for
#[derive(Debug, Clone, Default)]
pub struct ContentSignals {
    /// Lowercased markers that prove access
    pub allow_markers: Vec<String>,
    /// Only a marker counts as access; a plain 200 is a deny
    pub require_marker: bool,
}

impl ContentSignals {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn markers<S: AsRef<str>>(markers: &[S]) -> Self {
        Self {
            allow_markers: markers
                .iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            require_marker: false,
        }
    }

    /// Markers are mandatory when any were given
    pub fn strict<S: AsRef<str>>(markers: &[S]) -> Self {
        let mut signals = Self::markers(markers);
        signals.require_marker = !signals.allow_markers.is_empty();
        signals
    }
}

/// Result of one access attempt
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub actual: AccessOutcome,
    pub evidence: Evidence,
    /// Content marker that decided the outcome
    pub signal: Option<String>,
}

impl ProbeOutcome {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            actual: AccessOutcome::Error,
            evidence: Evidence::from_error(reason),
            signal: None,
        }
    }

    pub fn allowed(&self) -> bool {
        self.actual == AccessOutcome::Allow
    }

    /// Allow beats deny beats error when several attempts target one check
    pub fn strongest(outcomes: Vec<ProbeOutcome>) -> Option<ProbeOutcome> {
        let rank = |o: &ProbeOutcome| match o.actual {
            AccessOutcome::Allow => 2,
            AccessOutcome::Deny => 1,
            AccessOutcome::Error => 0,
        };
        let mut best: Option<ProbeOutcome> = None;
        for outcome in outcomes {
            if best.as_ref().map_or(true, |b| rank(&outcome) > rank(b)) {
                best = Some(outcome);
            }
        }
        best
    }
}

/// Classify a response; content markers take precedence over the status code
pub fn classify_response(
    requested_path: &str,
    response: &PageResponse,
    signals: &ContentSignals,
) -> (AccessOutcome, Option<String>) {
    let body = response.body.to_lowercase();

    if let Some(marker) = signals.allow_markers.iter().find(|m| body.contains(m.as_str())) {
        return (AccessOutcome::Allow, Some(marker.clone()));
    }
    if signals.require_marker {
        return (AccessOutcome::Deny, None);
    }
    if !classify_access(requested_path, response.status, &response.url) {
        return (AccessOutcome::Deny, None);
    }
    if body.len() <= SOFT_DENIAL_MAX_BODY {
        if let Some(text) = DENIAL_TEXT.iter().find(|t| body.contains(*t)) {
            return (AccessOutcome::Deny, Some((*text).to_string()));
        }
    }
    (AccessOutcome::Allow, None)
}

/// Runs navigations and requests for RBAC tests and packages their evidence
pub struct AccessProber {
    base_url: String,
    retry: RetryConfig,
    network_timeout: Duration,
    ledger: Arc<EventLedger>,
    network_window: usize,
    screenshot_dir: PathBuf,
}

impl AccessProber {
    pub fn new(config: &AppConfig, ledger: Arc<EventLedger>) -> Self {
        Self {
            base_url: config.target.base_url.clone(),
            retry: config.crawler.retry_config(),
            network_timeout: config.resources.network_timeout(),
            ledger,
            network_window: config.fuzzer.evidence_network_window,
            screenshot_dir: config.output.screenshot_dir.clone(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        resolve_url(&self.base_url, path)
    }

    /// Navigate with retries and classify where the page ended up
    pub async fn navigate(
        &self,
        page: &mut PageLease,
        path: &str,
        options: NavigationOptions,
        signals: &ContentSignals,
    ) -> ProbeOutcome {
        let url = self.url(path);
        let marker = self.ledger.mark();
        let role = page.role().to_string();

        let result = {
            let shared = Mutex::new(&mut *page);
            let shared = &shared;
            let target = url.as_str();
            let options = &options;
            retry_with_backoff(&self.retry, target, move |ctx| async move {
                let attempt = NavigationOptions {
                    timeout: ctx.timeout,
                    ..options.clone()
                };
                let mut guard = shared.lock().await;
                guard
                    .goto(target, &attempt)
                    .await
                    .map_err(|e| AccessError::from_driver(target, e))
            })
            .await
        };

        self.outcome(&role, path, marker, result, signals)
    }

    /// Navigate to the resource, then trigger the action element when the rule names one
    pub async fn perform_action(
        &self,
        page: &mut PageLease,
        path: &str,
        action_selector: Option<&str>,
        signals: &ContentSignals,
    ) -> ProbeOutcome {
        let landing = self
            .navigate(page, path, NavigationOptions::with_timeout(self.network_timeout), signals)
            .await;
        let Some(selector) = action_selector else {
            return landing;
        };
        if !landing.allowed() {
            return landing;
        }

        let marker = self.ledger.mark();
        let role = page.role().to_string();
        match page.click(selector, self.network_timeout).await {
            Ok(Some(response)) => self.outcome(&role, path, marker, Ok(response), signals),
            Ok(None) => landing,
            // the page rendered without the action control
            Err(DriverError::ElementNotFound { .. }) => ProbeOutcome {
                actual: AccessOutcome::Deny,
                ..landing
            },
            Err(e) => self.outcome(&role, path, marker, Err(AccessError::from_driver(path, e)), signals),
        }
    }

    /// Issue a non-navigation request from the page context
    pub async fn request(
        &self,
        page: &mut PageLease,
        path: &str,
        request: ApiRequest,
        signals: &ContentSignals,
    ) -> ProbeOutcome {
        let marker = self.ledger.mark();
        let role = page.role().to_string();
        let result = page
            .fetch(&request)
            .await
            .map_err(|e| AccessError::from_driver(&request.url, e));
        self.outcome(&role, path, marker, result, signals)
    }

    pub fn api_request(&self, method: &str, path: &str) -> ApiRequest {
        ApiRequest {
            method: method.to_uppercase(),
            ..ApiRequest::get(&self.url(path), self.network_timeout)
        }
    }

    /// Capture the page for a confirmed finding
    pub async fn screenshot(&self, page: &mut PageLease, label: &str) -> Option<String> {
        let name: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let target = self
            .screenshot_dir
            .join(format!("{}_{}_{}.html", page.role(), name, uuid::Uuid::new_v4().simple()));
        match page.screenshot(&target).await {
            Ok(()) => Some(target.to_string_lossy().to_string()),
            Err(e) => {
                debug!("[RBAC] Evidence screenshot failed: {}", e);
                None
            }
        }
    }

    fn outcome(
        &self,
        role: &str,
        path: &str,
        marker: LedgerMarker,
        result: AccessResult<PageResponse>,
        signals: &ContentSignals,
    ) -> ProbeOutcome {
        let mut evidence = match &result {
            Ok(response) => Evidence {
                status_code: Some(response.status),
                final_url: Some(response.url.clone()),
                headers: response
                    .headers
                    .iter()
                    .take(MAX_EVIDENCE_HEADERS)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                response_snippet: Some(excerpt(&response.body, SNIPPET_LEN)),
                ..Evidence::default()
            },
            Err(e) => Evidence::from_error(e.to_string()),
        };

        evidence.console = self
            .ledger
            .console_since(marker, role)
            .into_iter()
            .map(|m| format!("[{}] {}", m.level, m.text))
            .collect();
        let network = self.ledger.network_since(marker, role);
        let skip = network.len().saturating_sub(self.network_window);
        evidence.network = network.iter().skip(skip).map(|n| n.summary()).collect();

        match result {
            Ok(response) => {
                let (actual, signal) = classify_response(path, &response, signals);
                debug!(
                    "[RBAC] {} {} -> {} ({})",
                    role, path, response.status, actual
                );
                ProbeOutcome {
                    actual,
                    evidence,
                    signal,
                }
            }
            Err(e) => {
                debug!("[RBAC] {} {} -> error: {}", role, path, e);
                ProbeOutcome {
                    actual: AccessOutcome::Error,
                    evidence,
                    signal: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(status: u16, url: &str, body: &str) -> PageResponse {
        PageResponse {
            status,
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: body.to_string(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_content_signal_beats_http_error() {
        let signals = ContentSignals::markers(&["Tenant Settings"]);
        let (outcome, signal) = classify_response(
            "/admin",
            &response(500, "https://app.test/admin", "<h1>Tenant settings</h1> upstream error"),
            &signals,
        );
        assert_eq!(outcome, AccessOutcome::Allow);
        assert_eq!(signal.as_deref(), Some("tenant settings"));
    }

    #[test]
    fn test_status_and_redirect_classification() {
        let none = ContentSignals::none();
        assert_eq!(
            classify_response("/admin", &response(200, "https://app.test/admin", "<h1>Admin</h1>"), &none).0,
            AccessOutcome::Allow
        );
        assert_eq!(
            classify_response("/admin", &response(200, "https://app.test/login", "<form>"), &none).0,
            AccessOutcome::Deny
        );
        assert_eq!(
            classify_response("/admin", &response(403, "https://app.test/admin", ""), &none).0,
            AccessOutcome::Deny
        );
    }

    #[test]
    fn test_soft_denial_text() {
        let (outcome, signal) = classify_response(
            "/admin",
            &response(200, "https://app.test/admin", "<p>Access denied</p>"),
            &ContentSignals::none(),
        );
        assert_eq!(outcome, AccessOutcome::Deny);
        assert_eq!(signal.as_deref(), Some("access denied"));
    }

    #[test]
    fn test_strict_markers_require_content() {
        let signals = ContentSignals::strict(&["tenant-b"]);
        assert_eq!(
            classify_response("/orders", &response(200, "https://app.test/orders", "tenant-a orders"), &signals).0,
            AccessOutcome::Deny
        );
        assert_eq!(
            classify_response("/orders", &response(200, "https://app.test/orders", "TENANT-B orders"), &signals).0,
            AccessOutcome::Allow
        );
        assert!(!ContentSignals::strict::<&str>(&[]).require_marker);
    }

    #[test]
    fn test_strongest_outcome() {
        let deny = ProbeOutcome {
            actual: AccessOutcome::Deny,
            evidence: Evidence::default(),
            signal: None,
        };
        let allow = ProbeOutcome {
            actual: AccessOutcome::Allow,
            ..deny.clone()
        };
        let picked = ProbeOutcome::strongest(vec![ProbeOutcome::error("x"), deny, allow]).unwrap();
        assert!(picked.allowed());
        assert!(ProbeOutcome::strongest(Vec::new()).is_none());
    }
}
