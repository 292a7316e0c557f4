// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Aggregated RBAC results handed to the reporting layer.

use super::model::{BoundaryType, RbacTestResult, RbacTestType};
use crate::errors::{AccessError, AccessResult};
use crate::types::{AccessOutcome, FindingType, RiskLevel, Severity, Vulnerability};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of every method tried along one escalation path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EscalationTestResult {
    pub path_id: String,
    pub from_role: String,
    pub to_role: String,
    pub methods_tested: Vec<String>,
    pub targets: Vec<String>,
    /// At least one method was denied and none was allowed
    pub blocked: bool,
    pub vulnerability_detected: bool,
    pub risk_level: RiskLevel,
    pub results: Vec<RbacTestResult>,
}

impl EscalationTestResult {
    pub fn from_results(
        path_id: String,
        from_role: &str,
        to_role: &str,
        methods_tested: Vec<String>,
        targets: Vec<String>,
        results: Vec<RbacTestResult>,
    ) -> Self {
        let detected = results.iter().any(|r| r.actual == AccessOutcome::Allow);
        let any_denied = results.iter().any(|r| r.actual == AccessOutcome::Deny);
        Self {
            path_id,
            from_role: from_role.to_string(),
            to_role: to_role.to_string(),
            methods_tested,
            targets,
            blocked: !detected && any_denied,
            vulnerability_detected: detected,
            risk_level: if detected { Severity::Critical } else { Severity::Low },
            results,
        }
    }
}

/// Breach rate to risk: none low, under 10% medium, under 30% high, else critical
pub fn breach_risk(breaches: usize, attempts: usize) -> RiskLevel {
    if breaches == 0 || attempts == 0 {
        return Severity::Low;
    }
    let rate = breaches as f64 / attempts as f64;
    if rate < 0.10 {
        Severity::Medium
    } else if rate < 0.30 {
        Severity::High
    } else {
        Severity::Critical
    }
}

/// Outcome of every bypass attempt against one boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IsolationTestResult {
    pub boundary: String,
    pub boundary_type: BoundaryType,
    /// Zero breaches across all methods and roles
    pub intact: bool,
    pub attempts: usize,
    pub breaches: usize,
    pub breach_rate: f64,
    pub risk_level: RiskLevel,
    pub results: Vec<RbacTestResult>,
}

impl IsolationTestResult {
    pub fn from_results(boundary: &str, boundary_type: BoundaryType, mut results: Vec<RbacTestResult>) -> Self {
        let attempts = results.len();
        let breaches = results.iter().filter(|r| r.actual == AccessOutcome::Allow).count();
        let risk_level = breach_risk(breaches, attempts);
        for result in &mut results {
            result.risk_level = risk_level;
        }
        Self {
            boundary: boundary.to_string(),
            boundary_type,
            intact: breaches == 0,
            attempts,
            breaches,
            breach_rate: if attempts == 0 {
                0.0
            } else {
                breaches as f64 / attempts as f64
            },
            risk_level,
            results,
        }
    }
}

/// Generic boundary categories checked for every role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCategory {
    Authentication,
    Authorization,
    Session,
    Data,
}

impl BoundaryCategory {
    pub const ALL: [BoundaryCategory; 4] = [
        BoundaryCategory::Authentication,
        BoundaryCategory::Authorization,
        BoundaryCategory::Session,
        BoundaryCategory::Data,
    ];

    /// Severity of a confirmed bypass
    pub fn bypass_severity(&self) -> Severity {
        match self {
            BoundaryCategory::Authentication => Severity::Critical,
            BoundaryCategory::Session => Severity::Critical,
            BoundaryCategory::Authorization => Severity::High,
            BoundaryCategory::Data => Severity::High,
        }
    }
}

impl std::fmt::Display for BoundaryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryCategory::Authentication => write!(f, "authentication"),
            BoundaryCategory::Authorization => write!(f, "authorization"),
            BoundaryCategory::Session => write!(f, "session"),
            BoundaryCategory::Data => write!(f, "data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RbacSummary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Expected deny, observed allow
    pub violations: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Permission, escalation, isolation and boundary results of one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RbacSecurityReport {
    pub summary: RbacSummary,
    pub permission_results: Vec<RbacTestResult>,
    pub escalation_results: Vec<EscalationTestResult>,
    pub isolation_results: Vec<IsolationTestResult>,
    pub boundary_results: Vec<RbacTestResult>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub recommendations: Vec<String>,
    /// Share of tests whose actual outcome matched the expected one
    pub compliance_score: f64,
    pub generated_at: String,
}

impl RbacSecurityReport {
    /// Assemble and check the report; duplicate findings collapse to the most severe
    pub fn build(
        permission_results: Vec<RbacTestResult>,
        escalation_results: Vec<EscalationTestResult>,
        isolation_results: Vec<IsolationTestResult>,
        boundary_results: Vec<RbacTestResult>,
        vulnerabilities: Vec<Vulnerability>,
    ) -> AccessResult<Self> {
        let vulnerabilities = dedup_vulnerabilities(vulnerabilities);

        let mut report = Self {
            summary: RbacSummary::default(),
            permission_results,
            escalation_results,
            isolation_results,
            boundary_results,
            recommendations: recommendations(&vulnerabilities),
            vulnerabilities,
            compliance_score: 100.0,
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        let mut summary = RbacSummary::default();
        for result in report.all_results() {
            if result.passed != (result.expected == result.actual) {
                return Err(AccessError::Validation(format!(
                    "{} test {} for role '{}' has an inconsistent passed flag",
                    result.test_type, result.target, result.role
                )));
            }
            summary.total_tests += 1;
            if result.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if result.actual == AccessOutcome::Error {
                summary.errors += 1;
            }
            if result.is_violation() {
                summary.violations += 1;
            }
        }
        for vuln in &report.vulnerabilities {
            match vuln.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low | Severity::Info => summary.low += 1,
            }
        }

        report.compliance_score = if summary.total_tests == 0 {
            100.0
        } else {
            summary.passed as f64 / summary.total_tests as f64 * 100.0
        };
        report.summary = summary;
        Ok(report)
    }

    /// Every individual test result across the four test types
    pub fn all_results(&self) -> impl Iterator<Item = &RbacTestResult> {
        self.permission_results
            .iter()
            .chain(self.escalation_results.iter().flat_map(|e| e.results.iter()))
            .chain(self.isolation_results.iter().flat_map(|i| i.results.iter()))
            .chain(self.boundary_results.iter())
    }

    pub fn results_of(&self, test_type: RbacTestType) -> Vec<&RbacTestResult> {
        self.all_results().filter(|r| r.test_type == test_type).collect()
    }
}

fn dedup_vulnerabilities(vulnerabilities: Vec<Vulnerability>) -> Vec<Vulnerability> {
    let mut sorted = vulnerabilities;
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut seen = BTreeSet::new();
    let mut unique: Vec<Vulnerability> = sorted
        .into_iter()
        .filter(|v| seen.insert(v.dedup_key()))
        .collect();
    unique.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.role.cmp(&b.role))
            .then_with(|| a.resource.cmp(&b.resource))
    });
    unique
}

fn recommendations(vulnerabilities: &[Vulnerability]) -> Vec<String> {
    let types: BTreeSet<FindingType> = vulnerabilities.iter().map(|v| v.vuln_type).collect();
    let mut out = Vec::new();
    for finding in types {
        let count = vulnerabilities.iter().filter(|v| v.vuln_type == finding).count();
        let text = match finding {
            FindingType::UnauthorizedAccess => {
                "Enforce the permission matrix on the server for every resource and action"
            }
            FindingType::PrivilegeEscalation => {
                "Derive roles from the server-side session only and ignore client-supplied role data"
            }
            FindingType::IsolationBreach => {
                "Scope every query by the caller's tenant and owner, never by request parameters"
            }
            FindingType::BoundaryBypass => {
                "Reject unauthenticated and forged sessions before routing, and ignore client IP headers"
            }
            FindingType::Injection => "Validate and encode all user input at the boundary",
        };
        out.push(format!("{} ({} finding{})", text, count, if count == 1 { "" } else { "s" }));
    }
    if out.is_empty() {
        out.push("No access-control violations observed; keep the permission matrix under regression test".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Evidence;

    fn result(test_type: RbacTestType, expected: AccessOutcome, actual: AccessOutcome) -> RbacTestResult {
        RbacTestResult::new(test_type, "wms_user", "/admin", expected, actual, Severity::Low, Evidence::default())
    }

    #[test]
    fn test_breach_risk_scale() {
        assert_eq!(breach_risk(0, 40), Severity::Low);
        assert_eq!(breach_risk(1, 20), Severity::Medium);
        assert_eq!(breach_risk(2, 10), Severity::High);
        assert_eq!(breach_risk(3, 10), Severity::Critical);
        assert_eq!(breach_risk(0, 0), Severity::Low);
    }

    #[test]
    fn test_escalation_blocked_semantics() {
        let denied = vec![
            result(RbacTestType::Escalation, AccessOutcome::Deny, AccessOutcome::Deny),
            result(RbacTestType::Escalation, AccessOutcome::Deny, AccessOutcome::Deny),
        ];
        let e = EscalationTestResult::from_results("a->b".into(), "a", "b", vec![], vec![], denied);
        assert!(e.blocked);
        assert!(!e.vulnerability_detected);

        let errors = vec![result(RbacTestType::Escalation, AccessOutcome::Deny, AccessOutcome::Error)];
        let e = EscalationTestResult::from_results("a->b".into(), "a", "b", vec![], vec![], errors);
        assert!(!e.blocked);
        assert!(!e.vulnerability_detected);
    }

    #[test]
    fn test_isolation_aggregation() {
        let mut results: Vec<RbacTestResult> = (0..9)
            .map(|_| result(RbacTestType::Isolation, AccessOutcome::Deny, AccessOutcome::Deny))
            .collect();
        results.push(result(RbacTestType::Isolation, AccessOutcome::Deny, AccessOutcome::Allow));

        let iso = IsolationTestResult::from_results("tenant", BoundaryType::Tenant, results);
        assert!(!iso.intact);
        assert_eq!(iso.breaches, 1);
        assert_eq!(iso.risk_level, Severity::High);
        assert!(iso.results.iter().all(|r| r.risk_level == Severity::High));
    }

    #[test]
    fn test_report_summary_and_dedup() {
        let vuln = |sev| {
            Vulnerability::new(
                FindingType::UnauthorizedAccess,
                sev,
                "readonly_user",
                "/admin",
                "x".to_string(),
                Evidence::default(),
            )
        };
        let report = RbacSecurityReport::build(
            vec![
                result(RbacTestType::Permission, AccessOutcome::Deny, AccessOutcome::Allow),
                result(RbacTestType::Permission, AccessOutcome::Allow, AccessOutcome::Allow),
            ],
            vec![],
            vec![],
            vec![result(RbacTestType::Boundary, AccessOutcome::Deny, AccessOutcome::Error)],
            vec![vuln(Severity::Medium), vuln(Severity::Critical)],
        )
        .unwrap();

        assert_eq!(report.summary.total_tests, 3);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.violations, 1);
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].severity, Severity::Critical);
        assert!((report.compliance_score - 33.333).abs() < 0.01);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_inconsistent_result_rejected() {
        let mut bad = result(RbacTestType::Permission, AccessOutcome::Deny, AccessOutcome::Allow);
        bad.passed = true;
        assert!(matches!(
            RbacSecurityReport::build(vec![bad], vec![], vec![], vec![], vec![]),
            Err(AccessError::Validation(_))
        ));
    }
}
