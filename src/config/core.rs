// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use crate::fuzzer::detection::{default_rules, VulnerabilityRule};
use crate::fuzzer::payloads::{default_payload_sets, PayloadSet};
use crate::rbac::model::{HierarchyConfig, PermissionRule};
use crate::retry::{ErrorRecoveryMode, RetryConfig, TimeoutStrategy};
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub target: TargetConfig,

    #[serde(default)]
    #[validate(nested)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub resources: ResourceLimits,

    #[serde(default)]
    #[validate(nested)]
    pub batch: BatchConfig,

    #[serde(default)]
    #[validate(nested)]
    pub fuzzer: FuzzerConfig,

    #[validate(length(min = 1))]
    pub roles: Vec<Role>,

    #[serde(default)]
    pub permission_rules: Vec<PermissionRule>,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TargetConfig {
    #[validate(url)]
    pub base_url: String,

    /// Paths every role, including anonymous sessions, may reach
    #[serde(default)]
    pub public_paths: Vec<String>,

    /// Data APIs probed by the data boundary checks
    #[serde(default)]
    pub data_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CrawlerConfig {
    /// Global page-visit cap per role
    #[validate(range(min = 1, max = 100000))]
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[validate(range(min = 100, max = 600000))]
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default)]
    pub timeout_strategy: TimeoutStrategy,

    #[serde(default)]
    pub error_recovery: ErrorRecoveryMode,

    #[serde(default)]
    pub screenshots: bool,

    #[serde(default = "default_true")]
    pub follow_links: bool,

    /// Probe every path some role reached with the roles that never tried it
    #[serde(default = "default_true")]
    pub cross_role_probe: bool,

    /// Regex patterns of URLs never visited (static assets, logout ...)
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResourceLimits {
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_max_sessions")]
    pub max_concurrent_sessions: usize,

    #[validate(range(min = 1, max = 32))]
    #[serde(default = "default_pages_per_session")]
    pub max_pages_per_session: usize,

    #[validate(range(min = 128))]
    #[serde(default = "default_memory_ceiling")]
    pub memory_ceiling_mb: u64,

    #[validate(range(min = 100))]
    #[serde(default = "default_network_timeout")]
    pub network_timeout_ms: u64,

    /// How long a request beyond the bounds queues before failing
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_network_capacity")]
    pub network_capture_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchConfig {
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_batch_size")]
    pub size: usize,

    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Roles crawled first, in this order
    #[serde(default)]
    pub priority_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FuzzerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_payload_sets")]
    pub payload_sets: Vec<PayloadSet>,

    #[serde(default = "default_rules")]
    pub vulnerability_rules: Vec<VulnerabilityRule>,

    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_max_payloads")]
    pub max_payloads_per_field: usize,

    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    #[serde(default = "default_true")]
    pub api_fuzzing: bool,

    #[serde(default = "default_max_api_endpoints")]
    pub max_api_endpoints: usize,

    /// Network captures attached to each result as evidence
    #[serde(default = "default_evidence_window")]
    pub evidence_network_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    #[serde(default = "default_true")]
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            navigation_timeout_ms: default_navigation_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            timeout_strategy: TimeoutStrategy::default(),
            error_recovery: ErrorRecoveryMode::default(),
            screenshots: false,
            follow_links: true,
            cross_role_probe: true,
            skip_patterns: default_skip_patterns(),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_sessions(),
            max_pages_per_session: default_pages_per_session(),
            memory_ceiling_mb: default_memory_ceiling(),
            network_timeout_ms: default_network_timeout(),
            acquire_timeout_secs: default_acquire_timeout(),
            network_capture_capacity: default_network_capacity(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            cooldown_ms: default_cooldown(),
            priority_roles: Vec::new(),
        }
    }
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            payload_sets: default_payload_sets(),
            vulnerability_rules: default_rules(),
            max_payloads_per_field: default_max_payloads(),
            detection_threshold: default_detection_threshold(),
            api_fuzzing: true,
            max_api_endpoints: default_max_api_endpoints(),
            evidence_network_window: default_evidence_window(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: None,
            screenshot_dir: default_screenshot_dir(),
            pretty: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl CrawlerConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Retry policy for navigation probes
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts,
            initial_backoff: Duration::from_millis(self.retry_delay_ms),
            max_backoff: Duration::from_millis(self.max_retry_delay_ms.max(self.retry_delay_ms)),
            ..RetryConfig::default()
        }
        .with_timeout(self.navigation_timeout(), self.timeout_strategy)
        .with_recovery(self.error_recovery)
    }
}

impl ResourceLimits {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl BatchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl AppConfig {
    /// Minimal configuration for a base URL and role list
    pub fn new(base_url: &str, roles: Vec<Role>) -> Self {
        Self {
            target: TargetConfig {
                base_url: base_url.to_string(),
                public_paths: Vec::new(),
                data_endpoints: Vec::new(),
            },
            crawler: CrawlerConfig::default(),
            resources: ResourceLimits::default(),
            batch: BatchConfig::default(),
            fuzzer: FuzzerConfig::default(),
            roles,
            permission_rules: Vec::new(),
            hierarchy: HierarchyConfig::default(),
            output: OutputConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> usize {
    200
}

fn default_navigation_timeout() -> u64 {
    30000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_max_retry_delay() -> u64 {
    10000
}

fn default_skip_patterns() -> Vec<String> {
    vec![
        r"(?i)\.(png|jpe?g|gif|svg|ico|webp|css|js|map|woff2?|ttf|eot|pdf|zip)(\?.*)?$".to_string(),
        r"(?i)/logout\b".to_string(),
        r"(?i)/signout\b".to_string(),
    ]
}

fn default_max_sessions() -> usize {
    4
}

fn default_pages_per_session() -> usize {
    2
}

fn default_memory_ceiling() -> u64 {
    2048
}

fn default_network_timeout() -> u64 {
    30000
}

fn default_acquire_timeout() -> u64 {
    60
}

fn default_network_capacity() -> usize {
    crate::events::DEFAULT_NETWORK_CAPACITY
}

fn default_batch_size() -> usize {
    3
}

fn default_cooldown() -> u64 {
    1000
}

fn default_max_payloads() -> usize {
    5
}

fn default_detection_threshold() -> f64 {
    0.5
}

fn default_max_api_endpoints() -> usize {
    20
}

fn default_evidence_window() -> usize {
    10
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
target:
  base_url: "https://app.test"
roles:
  - name: admin
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_pages, 200);
        assert_eq!(config.crawler.timeout_strategy, TimeoutStrategy::Balanced);
        assert_eq!(config.resources.max_concurrent_sessions, 4);
        assert_eq!(config.fuzzer.payload_sets.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_from_crawler() {
        let crawler = CrawlerConfig {
            retry_attempts: 4,
            retry_delay_ms: 200,
            timeout_strategy: TimeoutStrategy::Patient,
            error_recovery: ErrorRecoveryMode::Skip,
            ..CrawlerConfig::default()
        };
        let retry = crawler.retry_config();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.initial_backoff, Duration::from_millis(200));
        assert_eq!(retry.timeout_strategy, TimeoutStrategy::Patient);
        assert_eq!(retry.effective_attempts(), 1);
    }

    #[test]
    fn test_range_validation() {
        let mut config = AppConfig::new("https://app.test", vec![Role::new("admin")]);
        config.resources.max_concurrent_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::new("not a url", vec![Role::new("admin")]);
        assert!(config.validate().is_err());
        config.target.base_url = "https://app.test".to_string();
        config.roles.clear();
        assert!(config.validate().is_err());
    }
}
