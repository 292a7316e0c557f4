// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Permission-pattern analysis: hierarchy compliance, named access patterns
//! and gaps between declared and observed permissions.

use super::comparison::ComparisonMatrix;
use crate::rbac::hierarchy::RoleHierarchy;
use crate::rbac::model::PermissionRule;
use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Path fragments of administrative surfaces
const SENSITIVE_PATTERNS: &[&str] = &[
    "/admin",
    "/dashboard",
    "/manage",
    "/settings",
    "/config",
    "/users",
    "/roles",
    "/permissions",
    "/audit",
    "/logs",
    "/system",
    "/internal",
    "/debug",
    "/api/admin",
    "/api/v1/admin",
    "/api/v2/admin",
];

/// Check if a path appears to be a sensitive admin endpoint
pub fn is_sensitive_admin_endpoint(path: &str) -> bool {
    let lower = path.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Path a lower role reaches while a higher role is refused
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyViolation {
    pub lower_role: String,
    pub higher_role: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyCompliance {
    /// Comparable (lower, higher) role pairs
    pub role_pairs: usize,
    pub total_checks: usize,
    /// Lower-role paths the higher role never probed; not counted as checks
    pub untested_checks: usize,
    pub violations: Vec<HierarchyViolation>,
    pub compliance_score: f64,
}

/// `(checks - violations) / checks * 100`, 100 when nothing was checked
pub fn compliance_score(total_checks: usize, violations: usize) -> f64 {
    if total_checks == 0 {
        return 100.0;
    }
    let violations = violations.min(total_checks);
    (total_checks - violations) as f64 / total_checks as f64 * 100.0
}

/// Every path reachable by the lower role of a pair must be reachable by the higher one
pub fn hierarchy_compliance(matrix: &ComparisonMatrix, hierarchy: &RoleHierarchy) -> HierarchyCompliance {
    let pairs = hierarchy.comparable_pairs(&matrix.roles);
    let mut total_checks = 0;
    let mut untested_checks = 0;
    let mut violations = Vec::new();

    for (lower, higher) in &pairs {
        let (Some(l), Some(h)) = (matrix.role_index(lower), matrix.role_index(higher)) else {
            continue;
        };
        for p in 0..matrix.paths.len() {
            if !matrix.access_matrix[l][p] {
                continue;
            }
            if !matrix.tested[h][p] {
                untested_checks += 1;
                continue;
            }
            total_checks += 1;
            if !matrix.access_matrix[h][p] {
                violations.push(HierarchyViolation {
                    lower_role: lower.clone(),
                    higher_role: higher.clone(),
                    path: matrix.paths[p].clone(),
                });
            }
        }
    }

    HierarchyCompliance {
        role_pairs: pairs.len(),
        total_checks,
        untested_checks,
        compliance_score: compliance_score(total_checks, violations.len()),
        violations,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    AdminOnly,
    UniversalAccess,
    PotentialEscalation,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::AdminOnly => write!(f, "admin-only"),
            PatternKind::UniversalAccess => write!(f, "universal-access"),
            PatternKind::PotentialEscalation => write!(f, "potential-escalation"),
        }
    }
}

impl PatternKind {
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            PatternKind::AdminOnly => RiskLevel::Low,
            PatternKind::UniversalAccess => RiskLevel::Medium,
            PatternKind::PotentialEscalation => RiskLevel::High,
        }
    }

    /// Universal and escalation patterns are reported as risks
    pub fn is_flagged(&self) -> bool {
        !matches!(self, PatternKind::AdminOnly)
    }
}

/// Paths sharing one access pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    pub kind: PatternKind,
    pub paths: Vec<String>,
    /// Roles granted at least one of the paths
    pub roles: Vec<String>,
    pub risk_level: RiskLevel,
    pub flagged: bool,
}

/// Roles no other analysed role outranks
fn top_roles<'a>(roles: &'a [String], hierarchy: &RoleHierarchy) -> BTreeSet<&'a str> {
    roles
        .iter()
        .filter(|r| !roles.iter().any(|other| hierarchy.outranks(other, r)))
        .map(String::as_str)
        .collect()
}

/// Classify every reachable path by the subset of roles that reach it
pub fn detect_access_patterns(matrix: &ComparisonMatrix, hierarchy: &RoleHierarchy) -> Vec<AccessPattern> {
    let ordered = !hierarchy.comparable_pairs(&matrix.roles).is_empty();
    let top = top_roles(&matrix.roles, hierarchy);

    let mut groups: Vec<(PatternKind, Vec<String>, BTreeSet<String>)> = Vec::new();
    let mut push = |kind: PatternKind, path: &str, granted: &[&str]| {
        let index = match groups.iter().position(|(k, _, _)| *k == kind) {
            Some(i) => i,
            None => {
                groups.push((kind, Vec::new(), BTreeSet::new()));
                groups.len() - 1
            }
        };
        groups[index].1.push(path.to_string());
        groups[index].2.extend(granted.iter().map(|g| g.to_string()));
    };

    for (p, path) in matrix.paths.iter().enumerate() {
        let granted = matrix.granted_roles(p);
        if granted.is_empty() {
            continue;
        }
        let universal = matrix.roles.len() > 1 && granted.len() == matrix.roles.len();
        let non_top = granted.iter().any(|g| !top.contains(g));

        if universal {
            push(PatternKind::UniversalAccess, path, &granted);
        } else if ordered && non_top && is_sensitive_admin_endpoint(path) {
            push(PatternKind::PotentialEscalation, path, &granted);
        } else if ordered && !non_top && granted.len() < matrix.roles.len() {
            push(PatternKind::AdminOnly, path, &granted);
        }
    }

    groups.sort_by_key(|(kind, _, _)| *kind);
    groups
        .into_iter()
        .map(|(kind, paths, roles)| AccessPattern {
            kind,
            paths,
            roles: roles.into_iter().collect(),
            risk_level: kind.risk_level(),
            flagged: kind.is_flagged(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Granted by the matrix but never observed for the role
    Untested,
    /// Granted by the matrix, observed denied
    MissingAccess,
    /// Role is declared in the hierarchy but produced no crawl data
    UnobservedRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGap {
    pub role: String,
    pub resource: Option<String>,
    pub kind: GapKind,
}

/// Declared grants with no matching observation
pub fn permission_gaps(
    matrix: &ComparisonMatrix,
    rules: &[PermissionRule],
    hierarchy: &RoleHierarchy,
) -> Vec<PermissionGap> {
    let mut gaps = Vec::new();
    let mut seen = BTreeSet::new();

    for role in &matrix.roles {
        for rule in rules.iter().filter(|r| r.expects_allow(role)) {
            if !seen.insert((role.clone(), rule.resource.clone())) {
                continue;
            }
            let kind = match matrix.access(role, &rule.resource) {
                None => GapKind::Untested,
                Some(false) => GapKind::MissingAccess,
                Some(true) => continue,
            };
            gaps.push(PermissionGap {
                role: role.clone(),
                resource: Some(rule.resource.clone()),
                kind,
            });
        }
    }

    for role in hierarchy.roles() {
        if matrix.role_index(role).is_none() {
            gaps.push(PermissionGap {
                role: role.to_string(),
                resource: None,
                kind: GapKind::UnobservedRole,
            });
        }
    }

    gaps
}
