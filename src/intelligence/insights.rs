// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Security risks, scoring and prioritized recommendations.

use super::comparison::{AnomalyKind, MatrixAnomaly};
use super::patterns::{AccessPattern, GapKind, HierarchyCompliance, PatternKind, PermissionGap};
use crate::types::{FindingType, RiskLevel, Severity, Vulnerability};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score points lost per identified risk
const RISK_PENALTY: f64 = 3.0;
const COMPLIANCE_WEIGHT: f64 = 0.7;
const PERFORMANCE_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    HierarchyViolation,
    AccessPattern,
    AccessAnomaly,
    Vulnerability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRisk {
    pub source: RiskSource,
    pub severity: RiskLevel,
    pub title: String,
    pub description: String,
    pub affected_roles: Vec<String>,
    pub affected_paths: Vec<String>,
    /// Vulnerability ids behind this risk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_findings: Vec<String>,
}

/// Collects risks from every analysis section, most severe first
pub fn collect_risks(
    compliance: &HierarchyCompliance,
    patterns: &[AccessPattern],
    anomalies: &[MatrixAnomaly],
    vulnerabilities: &[Vulnerability],
) -> Vec<SecurityRisk> {
    let mut risks = Vec::new();

    let mut by_pair: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
    for v in &compliance.violations {
        by_pair
            .entry((v.lower_role.as_str(), v.higher_role.as_str()))
            .or_default()
            .push(v.path.clone());
    }
    for ((lower, higher), paths) in by_pair {
        risks.push(SecurityRisk {
            source: RiskSource::HierarchyViolation,
            severity: RiskLevel::High,
            title: format!("Role hierarchy inverted between {} and {}", lower, higher),
            description: format!(
                "{} reaches {} path(s) that the higher-ranked {} cannot",
                lower,
                paths.len(),
                higher
            ),
            affected_roles: vec![lower.to_string(), higher.to_string()],
            affected_paths: paths,
            related_findings: Vec::new(),
        });
    }

    for pattern in patterns.iter().filter(|p| p.flagged) {
        let (title, description) = match pattern.kind {
            PatternKind::PotentialEscalation => (
                "Sensitive endpoints reachable by lower-ranked roles".to_string(),
                format!(
                    "{} administrative path(s) are reachable by roles below the top of the hierarchy",
                    pattern.paths.len()
                ),
            ),
            PatternKind::UniversalAccess => (
                "Paths reachable by every role".to_string(),
                format!(
                    "{} path(s) are granted to all {} roles; confirm they are meant to be shared",
                    pattern.paths.len(),
                    pattern.roles.len()
                ),
            ),
            PatternKind::AdminOnly => continue,
        };
        risks.push(SecurityRisk {
            source: RiskSource::AccessPattern,
            severity: pattern.risk_level,
            title,
            description,
            affected_roles: pattern.roles.clone(),
            affected_paths: pattern.paths.clone(),
            related_findings: Vec::new(),
        });
    }

    let mut by_role: BTreeMap<(&str, AnomalyKind), (RiskLevel, Vec<String>)> = BTreeMap::new();
    for a in anomalies {
        let entry = by_role
            .entry((a.role.as_str(), a.kind))
            .or_insert_with(|| (a.risk_level, Vec::new()));
        entry.0 = entry.0.max(a.risk_level);
        entry.1.push(a.path.clone());
    }
    for ((role, kind), (severity, paths)) in by_role {
        let (title, verb) = match kind {
            AnomalyKind::UnexpectedlyGranted => (format!("{} reaches paths it should not", role), "granted"),
            AnomalyKind::UnexpectedlyDenied => (format!("{} is refused paths it should reach", role), "denied"),
        };
        risks.push(SecurityRisk {
            source: RiskSource::AccessAnomaly,
            severity,
            title,
            description: format!("{} path(s) were unexpectedly {} for {}", paths.len(), verb, role),
            affected_roles: vec![role.to_string()],
            affected_paths: paths,
            related_findings: Vec::new(),
        });
    }

    for v in vulnerabilities {
        risks.push(SecurityRisk {
            source: RiskSource::Vulnerability,
            severity: v.severity,
            title: format!("{} on {}", finding_title(v.vuln_type), v.resource),
            description: v.description.clone(),
            affected_roles: vec![v.role.clone()],
            affected_paths: vec![v.resource.clone()],
            related_findings: vec![v.id.clone()],
        });
    }

    risks.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.title.cmp(&b.title))
    });
    risks
}

fn finding_title(kind: FindingType) -> &'static str {
    match kind {
        FindingType::UnauthorizedAccess => "Unauthorized access",
        FindingType::PrivilegeEscalation => "Privilege escalation",
        FindingType::IsolationBreach => "Isolation breach",
        FindingType::BoundaryBypass => "Security boundary bypass",
        FindingType::Injection => "Injection",
    }
}

/// `0.7 × compliance + 0.3 × performance − 3 × risks`, clamped to 0..=100
pub fn overall_score(compliance: f64, performance: f64, risk_count: usize) -> f64 {
    let raw = COMPLIANCE_WEIGHT * compliance + PERFORMANCE_WEIGHT * performance - RISK_PENALTY * risk_count as f64;
    raw.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPosture {
    Critical,
    NeedsImprovement,
    Good,
    Excellent,
}

impl std::fmt::Display for SecurityPosture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityPosture::Critical => write!(f, "critical"),
            SecurityPosture::NeedsImprovement => write!(f, "needs_improvement"),
            SecurityPosture::Good => write!(f, "good"),
            SecurityPosture::Excellent => write!(f, "excellent"),
        }
    }
}

pub fn posture(risks: &[SecurityRisk], compliance: f64) -> SecurityPosture {
    let critical = risks.iter().any(|r| r.severity == Severity::Critical);
    let high = risks.iter().filter(|r| r.severity == Severity::High).count();

    if critical {
        SecurityPosture::Critical
    } else if high > 2 || compliance < 70.0 {
        SecurityPosture::NeedsImprovement
    } else if high > 0 || compliance < 90.0 {
        SecurityPosture::Good
    } else {
        SecurityPosture::Excellent
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            Severity::Medium => Priority::Medium,
            Severity::Low | Severity::Info => Priority::Low,
        }
    }
}

/// Shared three-step scale for impact and effort
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Magnitude {
    Low,
    Medium,
    High,
}

impl Magnitude {
    fn weight(&self) -> u32 {
        match self {
            Magnitude::Low => 1,
            Magnitude::Medium => 2,
            Magnitude::High => 3,
        }
    }
}

/// Effort grows with the number of roles and paths to touch
pub fn effort(affected_roles: usize, affected_paths: usize) -> Magnitude {
    match affected_roles + affected_paths {
        0..=2 => Magnitude::Low,
        3..=6 => Magnitude::Medium,
        _ => Magnitude::High,
    }
}

/// Impact follows severity, widened by the number of roles exposed
pub fn impact(severity: Severity, affected_roles: usize) -> Magnitude {
    if severity >= Severity::High || affected_roles >= 3 {
        Magnitude::High
    } else if severity == Severity::Medium || affected_roles == 2 {
        Magnitude::Medium
    } else {
        Magnitude::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionableInsight {
    pub id: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub priority: Priority,
    pub impact: Magnitude,
    pub effort: Magnitude,
    pub affected_roles: Vec<String>,
    pub affected_paths: Vec<String>,
    /// Higher sorts first
    pub score: u32,
}

impl ActionableInsight {
    fn new(
        title: String,
        description: String,
        recommendation: String,
        severity: Severity,
        affected_roles: Vec<String>,
        affected_paths: Vec<String>,
    ) -> Self {
        let priority = Priority::from(severity);
        let impact = impact(severity, affected_roles.len());
        let effort = effort(affected_roles.len(), affected_paths.len());
        Self {
            id: String::new(),
            title,
            description,
            recommendation,
            priority,
            impact,
            effort,
            affected_roles,
            affected_paths,
            score: weighted_score(priority, impact, effort),
        }
    }
}

/// Priority dominates, then impact, then low effort
pub fn weighted_score(priority: Priority, impact: Magnitude, effort: Magnitude) -> u32 {
    let priority = priority as u32 + 1;
    priority * 100 + impact.weight() * 10 + (4 - effort.weight())
}

fn recommendation_for(risk: &SecurityRisk, vulnerabilities: &[Vulnerability]) -> String {
    match risk.source {
        RiskSource::HierarchyViolation => {
            "Grant the higher-ranked role every permission its subordinate holds, or remove the path from the subordinate".to_string()
        }
        RiskSource::AccessPattern => {
            "Review the permission rules for these paths and restrict them to the roles that need them".to_string()
        }
        RiskSource::AccessAnomaly => {
            "Align the server-side authorization checks with the declared permission matrix".to_string()
        }
        RiskSource::Vulnerability => vulnerabilities
            .iter()
            .find(|v| risk.related_findings.contains(&v.id))
            .map(|v| v.remediation.clone())
            .unwrap_or_default(),
    }
}

/// One insight per risk plus one per kind of permission gap, sorted and numbered
pub fn build_insights(
    risks: &[SecurityRisk],
    gaps: &[PermissionGap],
    vulnerabilities: &[Vulnerability],
) -> Vec<ActionableInsight> {
    let mut insights: Vec<ActionableInsight> = risks
        .iter()
        .map(|risk| {
            ActionableInsight::new(
                risk.title.clone(),
                risk.description.clone(),
                recommendation_for(risk, vulnerabilities),
                risk.severity,
                risk.affected_roles.clone(),
                risk.affected_paths.clone(),
            )
        })
        .collect();

    let mut by_kind: BTreeMap<GapKind, (Vec<String>, Vec<String>)> = BTreeMap::new();
    for gap in gaps {
        let entry = by_kind.entry(gap.kind).or_default();
        if !entry.0.contains(&gap.role) {
            entry.0.push(gap.role.clone());
        }
        if let Some(resource) = &gap.resource {
            if !entry.1.contains(resource) {
                entry.1.push(resource.clone());
            }
        }
    }
    for (kind, (roles, paths)) in by_kind {
        let (title, recommendation, severity) = match kind {
            GapKind::Untested => (
                "Declared permissions never exercised",
                "Add the resources to the roles' seed paths so the crawl covers them",
                Severity::Low,
            ),
            GapKind::MissingAccess => (
                "Declared permissions not honoured",
                "Fix the roles' grants or update the permission rules to match intent",
                Severity::Medium,
            ),
            GapKind::UnobservedRole => (
                "Roles without crawl data",
                "Configure credentials and seed paths for every role in the hierarchy",
                Severity::Low,
            ),
        };
        insights.push(ActionableInsight::new(
            title.to_string(),
            format!("{} role(s), {} resource(s) affected", roles.len(), paths.len()),
            recommendation.to_string(),
            severity,
            roles,
            paths,
        ));
    }

    insights.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.affected_roles.cmp(&b.affected_roles))
    });
    for (i, insight) in insights.iter_mut().enumerate() {
        insight.id = format!("INS-{:03}", i + 1);
    }
    insights
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub overall_score: f64,
    pub posture: SecurityPosture,
    pub compliance_score: f64,
    pub performance_score: f64,
    pub roles_analyzed: usize,
    pub paths_analyzed: usize,
    pub total_risks: usize,
    pub critical_risks: usize,
    pub high_risks: usize,
    pub vulnerabilities: usize,
    pub rbac_tests: usize,
    pub rbac_failures: usize,
    pub security_tests: usize,
    pub injection_findings: usize,
    /// Titles of the top-ranked insights
    pub key_findings: Vec<String>,
}
