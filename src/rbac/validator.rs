// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - RBAC Validator
 * Verifies the permission matrix, declared escalation paths, isolation
 * boundaries and generic authentication/session/data boundaries against the
 * live application, one role session at a time.
 *
 * Every test opens a fresh page from the role's session so that results do not
 * depend on the order tests run in.
 */

use super::hierarchy::RoleHierarchy;
use super::model::{EscalationPath, IsolationBoundary, PermissionRule, RbacTestResult, RbacTestType};
use super::probe::{AccessProber, ContentSignals, ProbeOutcome};
use super::report::{
    BoundaryCategory, EscalationTestResult, IsolationTestResult, RbacSecurityReport,
};
use super::strategies::{EscalationAttempt, IsolationAttempt, StrategyRegistry};
use crate::config::AppConfig;
use crate::driver::NavigationOptions;
use crate::errors::AccessResult;
use crate::role::Role;
use crate::session_pool::{PageLease, SessionPool};
use crate::types::{AccessOutcome, FindingType, Severity, Vulnerability};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_ESCALATION_METHOD: &str = "direct_navigation";
const DEFAULT_ISOLATION_METHOD: &str = "direct_access";

/// Token and cookie values no server should have issued
const FORGED_TOKEN: &str = "eyJhbGciOiJub25lIn0.eyJyb2xlIjoiYWRtaW4ifQ.";
const FORGED_SESSION: &str = "session=forged-session-0000; sid=forged-session-0000";

/// Client-IP headers some proxies trust for internal routing
const TRUSTED_IP_HEADERS: &[&str] = &[
    "X-Forwarded-For",
    "X-Real-IP",
    "X-Originating-IP",
    "X-Custom-IP-Authorization",
    "X-Client-IP",
];

/// Results and findings of one test family
#[derive(Debug)]
pub struct TestBatch<T> {
    pub results: Vec<T>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl<T> Default for TestBatch<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            vulnerabilities: Vec::new(),
        }
    }
}

impl<T> TestBatch<T> {
    fn merge(&mut self, other: TestBatch<T>) {
        self.results.extend(other.results);
        self.vulnerabilities.extend(other.vulnerabilities);
    }
}

pub struct RbacValidator {
    pool: Arc<SessionPool>,
    prober: AccessProber,
    strategies: StrategyRegistry,
    hierarchy: RoleHierarchy,
    config: AppConfig,
}

impl RbacValidator {
    pub fn new(pool: Arc<SessionPool>, config: &AppConfig) -> AccessResult<Self> {
        let hierarchy = RoleHierarchy::build(&config.hierarchy.roles)?;
        let prober = AccessProber::new(config, pool.ledger());
        Ok(Self {
            pool,
            prober,
            strategies: StrategyRegistry::with_builtins(),
            hierarchy,
            config: config.clone(),
        })
    }

    /// Replace the method/technique registry
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Run all four test families and assemble the report
    pub async fn run(&self) -> AccessResult<RbacSecurityReport> {
        info!("[RBAC] Starting validation for {} roles", self.config.roles.len());

        let permissions = self.test_permissions().await?;
        let escalations = self.test_escalations().await?;
        let isolation = self.test_isolation().await?;
        let boundaries = self.test_boundaries().await?;

        let mut vulnerabilities = permissions.vulnerabilities;
        vulnerabilities.extend(escalations.vulnerabilities);
        vulnerabilities.extend(isolation.vulnerabilities);
        vulnerabilities.extend(boundaries.vulnerabilities);

        let report = RbacSecurityReport::build(
            permissions.results,
            escalations.results,
            isolation.results,
            boundaries.results,
            vulnerabilities,
        )?;

        info!(
            "[RBAC] Validation complete: {} tests, {} violations, compliance {:.1}%",
            report.summary.total_tests, report.summary.violations, report.compliance_score
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Permission matrix
    // ------------------------------------------------------------------

    /// Check every rule for every role; roles run concurrently
    pub async fn test_permissions(&self) -> AccessResult<TestBatch<RbacTestResult>> {
        let rules = &self.config.permission_rules;
        info!(
            "[RBAC] Testing {} permission rules across {} roles",
            rules.len(),
            self.config.roles.len()
        );

        let mut batch = TestBatch::default();
        let parallelism = self.pool.role_parallelism(self.config.roles.len());
        for roles in self.config.roles.chunks(parallelism) {
            let per_role = join_all(
                roles
                    .iter()
                    .map(|role| self.permission_tests_for_role(&role.name, rules)),
            )
            .await;
            for role_batch in per_role {
                batch.merge(role_batch?);
            }
        }
        Ok(batch)
    }

    async fn permission_tests_for_role(
        &self,
        role: &str,
        rules: &[PermissionRule],
    ) -> AccessResult<TestBatch<RbacTestResult>> {
        let mut batch = TestBatch::default();
        for rule in rules {
            let expected = if rule.expects_allow(role) {
                AccessOutcome::Allow
            } else {
                AccessOutcome::Deny
            };

            let mut page = self.pool.acquire(role).await?;
            let selector = if rule.is_read_action() {
                rule.action_selector.as_deref()
            } else {
                Some(rule.action_selector.as_deref().unwrap_or_else(|| action_selector(&rule.action)))
            };
            let mut outcome = self
                .prober
                .perform_action(&mut page, &rule.resource, selector, &ContentSignals::none())
                .await;

            let violation = expected == AccessOutcome::Deny && outcome.allowed();
            if violation {
                outcome.evidence.screenshot = self.prober.screenshot(&mut page, &rule.id()).await;
            }
            close_quietly(page).await;

            let risk = if violation {
                rule.permission_level.violation_severity()
            } else if outcome.actual != expected {
                Severity::Low
            } else {
                Severity::Info
            };

            if violation {
                warn!(
                    "[RBAC] {} reached {} ({}) without permission",
                    role,
                    rule.resource,
                    rule.action
                );
                let category = if rule.requires_tenant_scope {
                    "Multi-Tenant Authorization"
                } else if rule.requires_data_scope {
                    "Data Authorization"
                } else {
                    "Authorization"
                };
                batch.vulnerabilities.push(
                    Vulnerability::new(
                        FindingType::UnauthorizedAccess,
                        risk,
                        role,
                        &rule.resource,
                        format!(
                            "Role '{}' performed '{}' on {} which requires {} permission and is not granted to it",
                            role, rule.action, rule.resource, rule.permission_level
                        ),
                        outcome.evidence.clone(),
                    )
                    .with_category(category),
                );
            }

            batch.results.push(RbacTestResult::new(
                RbacTestType::Permission,
                role,
                &rule.id(),
                expected,
                outcome.actual,
                risk,
                outcome.evidence,
            ));
        }
        Ok(batch)
    }

    // ------------------------------------------------------------------
    // Escalation paths
    // ------------------------------------------------------------------

    pub async fn test_escalations(&self) -> AccessResult<TestBatch<EscalationTestResult>> {
        let paths = &self.config.hierarchy.escalation_paths;
        info!("[RBAC] Testing {} escalation paths", paths.len());

        let mut batch = TestBatch::default();
        for path in paths {
            batch.merge(self.test_escalation_path(path).await?);
        }
        Ok(batch)
    }

    /// Pages that prove `to_role` capabilities
    pub fn escalation_targets(&self, path: &EscalationPath) -> Vec<String> {
        if !path.target_paths.is_empty() {
            return dedup(path.target_paths.iter().cloned());
        }

        let from_rules = dedup(
            self.config
                .permission_rules
                .iter()
                .filter(|r| r.expects_allow(&path.to_role) && !r.expects_allow(&path.from_role))
                .map(|r| r.resource.clone()),
        );
        if !from_rules.is_empty() {
            return from_rules;
        }

        let from_pages: BTreeSet<&str> = self
            .config
            .role(&path.from_role)
            .map(|r| r.seed_paths.iter().map(String::as_str).collect())
            .unwrap_or_default();
        self.config
            .role(&path.to_role)
            .map(|r| {
                dedup(
                    r.seed_paths
                        .iter()
                        .filter(|p| !from_pages.contains(p.as_str()))
                        .cloned(),
                )
            })
            .unwrap_or_default()
    }

    async fn test_escalation_path(
        &self,
        path: &EscalationPath,
    ) -> AccessResult<TestBatch<EscalationTestResult>> {
        let path_id = path.id();
        if self.hierarchy.contains(&path.from_role)
            && self.hierarchy.contains(&path.to_role)
            && !self.hierarchy.outranks(&path.to_role, &path.from_role)
        {
            warn!(
                "[RBAC] Escalation path {} does not climb the role hierarchy",
                path_id
            );
        }

        let methods: Vec<String> = if path.methods.is_empty() {
            vec![DEFAULT_ESCALATION_METHOD.to_string()]
        } else {
            path.methods.clone()
        };
        let targets = self.escalation_targets(path);
        let signals = ContentSignals::markers(&path.success_markers);

        let mut results = Vec::new();
        let mut vulnerabilities = Vec::new();

        if targets.is_empty() {
            warn!("[RBAC] No privileged target known for escalation path {}", path_id);
            let outcome = ProbeOutcome::error(format!(
                "no page distinguishes '{}' from '{}'",
                path.to_role, path.from_role
            ));
            results.push(RbacTestResult::new(
                RbacTestType::Escalation,
                &path.from_role,
                &path_id,
                AccessOutcome::Deny,
                outcome.actual,
                Severity::Low,
                outcome.evidence,
            ));
        }

        for method_name in &methods {
            let method = self.strategies.escalation(method_name);
            for target in &targets {
                let label = format!("{}:{}:{}", path_id, method_name, target);
                let mut page = self.pool.acquire(&path.from_role).await?;

                let mut outcome = match &method {
                    Some(method) => {
                        let attempt = EscalationAttempt {
                            prober: &self.prober,
                            path,
                            target,
                            signals: &signals,
                            timeout: self.config.resources.network_timeout(),
                        };
                        method.attempt(&mut page, &attempt).await
                    }
                    None => ProbeOutcome::error(format!("unknown escalation method '{}'", method_name)),
                };

                if outcome.allowed() {
                    outcome.evidence.screenshot = self.prober.screenshot(&mut page, &label).await;
                    warn!(
                        "[RBAC] Escalation {} succeeded via {} on {}",
                        path_id, method_name, target
                    );
                    vulnerabilities.push(
                        Vulnerability::new(
                            FindingType::PrivilegeEscalation,
                            Severity::Critical,
                            &path.from_role,
                            target,
                            format!(
                                "Role '{}' reached '{}' capabilities on {} using {}",
                                path.from_role, path.to_role, target, method_name
                            ),
                            outcome.evidence.clone(),
                        )
                        .with_category("Privilege Escalation"),
                    );
                }
                close_quietly(page).await;

                let risk = match outcome.actual {
                    AccessOutcome::Allow => Severity::Critical,
                    AccessOutcome::Deny => Severity::Info,
                    AccessOutcome::Error => Severity::Low,
                };
                results.push(RbacTestResult::new(
                    RbacTestType::Escalation,
                    &path.from_role,
                    &label,
                    AccessOutcome::Deny,
                    outcome.actual,
                    risk,
                    outcome.evidence,
                ));
            }
        }

        let result = EscalationTestResult::from_results(
            path_id,
            &path.from_role,
            &path.to_role,
            methods,
            targets,
            results,
        );
        debug!(
            "[RBAC] Escalation {}: blocked={} detected={}",
            result.path_id, result.blocked, result.vulnerability_detected
        );
        Ok(TestBatch {
            results: vec![result],
            vulnerabilities,
        })
    }

    // ------------------------------------------------------------------
    // Isolation boundaries
    // ------------------------------------------------------------------

    pub async fn test_isolation(&self) -> AccessResult<TestBatch<IsolationTestResult>> {
        let boundaries = &self.config.hierarchy.isolation_boundaries;
        info!("[RBAC] Testing {} isolation boundaries", boundaries.len());

        let mut batch = TestBatch::default();
        for boundary in boundaries {
            batch.merge(self.test_boundary(boundary).await?);
        }
        Ok(batch)
    }

    async fn test_boundary(
        &self,
        boundary: &IsolationBoundary,
    ) -> AccessResult<TestBatch<IsolationTestResult>> {
        let methods: Vec<String> = if boundary.test_methods.is_empty() {
            vec![DEFAULT_ISOLATION_METHOD.to_string()]
        } else {
            boundary.test_methods.clone()
        };
        let bypass_values = boundary.bypass_values();
        let signals = ContentSignals::strict(&boundary.foreign_markers);
        let outsiders: Vec<&Role> = self
            .config
            .roles
            .iter()
            .filter(|r| !boundary.authorized_roles.contains(&r.name))
            .collect();

        let mut results = Vec::new();
        let mut breaches = Vec::new();

        for role in outsiders {
            for method_name in &methods {
                let technique = self.strategies.isolation(method_name);
                for protected in &boundary.protected_paths {
                    for bypass in &bypass_values {
                        let label = format!("{}/{}:{}[{}]", boundary.name, method_name, protected, bypass);
                        let mut page = self.pool.acquire(&role.name).await?;
                        let mut outcome = match &technique {
                            Some(technique) => {
                                let attempt = IsolationAttempt {
                                    prober: &self.prober,
                                    boundary,
                                    path: protected,
                                    bypass,
                                    signals: &signals,
                                    timeout: self.config.resources.network_timeout(),
                                };
                                technique.attempt(&mut page, &attempt).await
                            }
                            None => ProbeOutcome::error(format!(
                                "unknown isolation technique '{}'",
                                method_name
                            )),
                        };
                        if outcome.allowed() {
                            outcome.evidence.screenshot = self.prober.screenshot(&mut page, &label).await;
                            warn!(
                                "[RBAC] {} crossed boundary {} via {} on {}",
                                role.name, boundary.name, method_name, protected
                            );
                            breaches.push((role.name.clone(), protected.clone(), method_name.clone(), outcome.evidence.clone()));
                        }
                        close_quietly(page).await;

                        results.push(RbacTestResult::new(
                            RbacTestType::Isolation,
                            &role.name,
                            &label,
                            AccessOutcome::Deny,
                            outcome.actual,
                            Severity::Info,
                            outcome.evidence,
                        ));
                    }
                }
            }
        }

        let result = IsolationTestResult::from_results(&boundary.name, boundary.boundary_type, results);
        let severity = result.risk_level;
        let vulnerabilities = breaches
            .into_iter()
            .map(|(role, resource, method, evidence)| {
                Vulnerability::new(
                    FindingType::IsolationBreach,
                    severity,
                    &role,
                    &resource,
                    format!(
                        "Role '{}' read data across the {} boundary '{}' using {}",
                        role, boundary.boundary_type, boundary.name, method
                    ),
                    evidence,
                )
                .with_category("Isolation")
            })
            .collect();

        info!(
            "[RBAC] Boundary {}: {}/{} breaches ({})",
            result.boundary, result.breaches, result.attempts, result.risk_level
        );
        Ok(TestBatch {
            results: vec![result],
            vulnerabilities,
        })
    }

    // ------------------------------------------------------------------
    // Generic boundaries
    // ------------------------------------------------------------------

    /// Authentication, authorization, session and data boundary checks per role
    pub async fn test_boundaries(&self) -> AccessResult<TestBatch<RbacTestResult>> {
        info!("[RBAC] Testing generic boundaries for {} roles", self.config.roles.len());
        let mut batch = TestBatch::default();
        for role in &self.config.roles {
            for category in BoundaryCategory::ALL {
                batch.merge(self.boundary_checks(role, category).await?);
            }
        }
        Ok(batch)
    }

    /// Non-public pages this role is meant to reach
    fn protected_pages(&self, role: &Role) -> Vec<String> {
        let public: BTreeSet<&str> = self.config.target.public_paths.iter().map(String::as_str).collect();
        dedup(
            role.seed_paths
                .iter()
                .cloned()
                .chain(
                    self.config
                        .permission_rules
                        .iter()
                        .filter(|r| r.expects_allow(&role.name))
                        .map(|r| r.resource.clone()),
                )
                .filter(|p| !public.contains(p.as_str())),
        )
    }

    async fn boundary_checks(
        &self,
        role: &Role,
        category: BoundaryCategory,
    ) -> AccessResult<TestBatch<RbacTestResult>> {
        let mut batch = TestBatch::default();
        let probes: Vec<(String, NavigationOptions)> = match category {
            BoundaryCategory::Authentication if role.is_authenticated() => self
                .protected_pages(role)
                .into_iter()
                .map(|p| (p, self.options().anonymous()))
                .collect(),
            BoundaryCategory::Session if role.is_authenticated() => self
                .protected_pages(role)
                .into_iter()
                .take(1)
                .map(|p| {
                    let opts = self
                        .options()
                        .anonymous()
                        .header("Authorization", &format!("Bearer {}", FORGED_TOKEN))
                        .header("Cookie", FORGED_SESSION);
                    (p, opts)
                })
                .collect(),
            BoundaryCategory::Authorization => {
                let mut opts = self.options();
                for header in TRUSTED_IP_HEADERS {
                    opts = opts.header(header, "127.0.0.1");
                }
                dedup(
                    self.config
                        .permission_rules
                        .iter()
                        .filter(|r| !r.expects_allow(&role.name))
                        .map(|r| r.resource.clone()),
                )
                .into_iter()
                .map(|p| (p, opts.clone()))
                .collect()
            }
            // anonymous requests look the same from every role, so only one role sends them
            BoundaryCategory::Data if self.is_data_prober(role) => self
                .config
                .target
                .data_endpoints
                .iter()
                .map(|p| (p.clone(), self.options().anonymous()))
                .collect(),
            _ => Vec::new(),
        };

        for (path, options) in probes {
            let target = format!("{}:{}", category, path);
            let mut page = self.pool.acquire(&role.name).await?;

            // a resource already open without the headers is the permission test's finding
            if matches!(category, BoundaryCategory::Authorization) {
                let baseline = self
                    .prober
                    .navigate(&mut page, &path, self.options(), &ContentSignals::none())
                    .await;
                if baseline.allowed() {
                    debug!(
                        "[RBAC] {} already reachable for {} without client IP headers",
                        path, role.name
                    );
                    close_quietly(page).await;
                    continue;
                }
            }

            let mut outcome = self
                .prober
                .navigate(&mut page, &path, options, &ContentSignals::none())
                .await;
            let severity = if outcome.allowed() {
                outcome.evidence.screenshot = self.prober.screenshot(&mut page, &target).await;
                category.bypass_severity()
            } else {
                Severity::Info
            };
            close_quietly(page).await;

            if outcome.allowed() {
                warn!("[RBAC] {} boundary bypassed for {} on {}", category, role.name, path);
                batch.vulnerabilities.push(
                    Vulnerability::new(
                        FindingType::BoundaryBypass,
                        severity,
                        &role.name,
                        &path,
                        boundary_description(category, &role.name, &path),
                        outcome.evidence.clone(),
                    )
                    .with_category("Boundary"),
                );
            }
            batch.results.push(RbacTestResult::new(
                RbacTestType::Boundary,
                &role.name,
                &target,
                AccessOutcome::Deny,
                outcome.actual,
                severity,
                outcome.evidence,
            ));
        }
        Ok(batch)
    }

    fn options(&self) -> NavigationOptions {
        NavigationOptions::with_timeout(self.config.resources.network_timeout())
    }

    /// First authenticated role; runs the anonymous data-endpoint checks
    fn is_data_prober(&self, role: &Role) -> bool {
        self.config
            .roles
            .iter()
            .find(|r| r.is_authenticated())
            .is_some_and(|r| r.name == role.name)
    }
}

fn boundary_description(category: BoundaryCategory, role: &str, path: &str) -> String {
    match category {
        BoundaryCategory::Authentication => format!(
            "{} is served without authentication although it belongs to role '{}'",
            path, role
        ),
        BoundaryCategory::Session => format!(
            "{} accepted a forged session token in place of role '{}'",
            path, role
        ),
        BoundaryCategory::Authorization => format!(
            "{} became reachable for role '{}' through client IP headers",
            path, role
        ),
        BoundaryCategory::Data => format!("Data endpoint {} answers unauthenticated requests", path),
    }
}

/// Default selector for a non-read action
fn action_selector(action: &str) -> &'static str {
    match action.to_lowercase().as_str() {
        "delete" | "remove" => "[data-action='delete'], button.delete, .btn-delete",
        "create" | "add" | "new" => "[data-action='create'], button.create, .btn-create",
        _ => "[data-action='edit'], button.edit, .btn-edit",
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.filter(|i| seen.insert(i.clone())).collect()
}

async fn close_quietly(page: PageLease) {
    if let Err(e) = page.close().await {
        debug!("[RBAC] Page close failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::ScriptedDriver;
    use crate::events::EventLedger;
    use crate::rbac::model::PermissionLevel;
    use crate::role::LoginCredentials;

    fn validator_config() -> AppConfig {
        let mut config = AppConfig::new(
            "https://app.test",
            vec![
                Role::new("operator")
                    .with_credentials(LoginCredentials::bearer("op-token"))
                    .with_seed_paths(["/dashboard", "/help"]),
                Role::new("manager")
                    .with_credentials(LoginCredentials::bearer("mgr-token"))
                    .with_seed_paths(["/dashboard", "/team"]),
            ],
        );
        config.target.public_paths = vec!["/help".to_string()];
        config.permission_rules = vec![
            PermissionRule::new("/reports", "view", PermissionLevel::Read).allow(["manager"]),
            PermissionRule::new("/dashboard", "view", PermissionLevel::Read).allow(["operator", "manager"]),
        ];
        config
    }

    fn validator(config: &AppConfig) -> RbacValidator {
        let driver = ScriptedDriver::new(&config.target.base_url);
        let pool = Arc::new(SessionPool::new(
            Arc::new(driver),
            &config.roles,
            config.resources.clone(),
            Arc::new(EventLedger::default()),
        ));
        RbacValidator::new(pool, config).unwrap()
    }

    #[test]
    fn test_action_selector_defaults() {
        assert!(action_selector("Delete").contains("delete"));
        assert!(action_selector("create").contains("create"));
        assert!(action_selector("edit").contains("edit"));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = vec!["/b".to_string(), "/a".to_string(), "/b".to_string()];
        assert_eq!(dedup(items.into_iter()), vec!["/b".to_string(), "/a".to_string()]);
    }

    #[test]
    fn test_escalation_targets_prefer_declared_then_rules_then_seeds() {
        let mut config = validator_config();
        let v = validator(&config);

        let declared = EscalationPath::new("operator", "manager").with_targets(&["/admin", "/admin"]);
        assert_eq!(v.escalation_targets(&declared), vec!["/admin".to_string()]);

        let derived = EscalationPath::new("operator", "manager");
        assert_eq!(v.escalation_targets(&derived), vec!["/reports".to_string()]);

        config.permission_rules.clear();
        let v = validator(&config);
        assert_eq!(v.escalation_targets(&derived), vec!["/team".to_string()]);
    }

    #[test]
    fn test_protected_pages_exclude_public_paths() {
        let config = validator_config();
        let v = validator(&config);
        let operator = config.role("operator").unwrap();
        assert_eq!(v.protected_pages(operator), vec!["/dashboard".to_string()]);

        let manager = config.role("manager").unwrap();
        assert_eq!(
            v.protected_pages(manager),
            vec!["/dashboard".to_string(), "/team".to_string(), "/reports".to_string()]
        );
    }
}
