// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Declarative RBAC policy model and the uniform test-result record.

use crate::types::{AccessOutcome, Evidence, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Permission Matrix
// ============================================================================

/// Privilege required by an action, drives finding severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    Read,
    Write,
    Delete,
    Admin,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionLevel::Read => write!(f, "read"),
            PermissionLevel::Write => write!(f, "write"),
            PermissionLevel::Delete => write!(f, "delete"),
            PermissionLevel::Admin => write!(f, "admin"),
        }
    }
}

impl PermissionLevel {
    /// Severity of a role reaching an action it was denied
    pub fn violation_severity(&self) -> RiskLevel {
        match self {
            PermissionLevel::Admin | PermissionLevel::Delete => RiskLevel::Critical,
            PermissionLevel::Write => RiskLevel::High,
            PermissionLevel::Read => RiskLevel::Medium,
        }
    }
}

fn default_action() -> String {
    "view".to_string()
}

/// Allow/deny policy for one resource + action pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionRule {
    /// Path of the resource, e.g. `/admin/users`
    pub resource: String,
    /// `view`, `read`, `create`, `edit`, `delete` ...
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub allowed_roles: BTreeSet<String>,
    #[serde(default)]
    pub denied_roles: BTreeSet<String>,
    #[serde(default)]
    pub permission_level: PermissionLevel,
    #[serde(default)]
    pub requires_tenant_scope: bool,
    #[serde(default)]
    pub requires_data_scope: bool,
    /// Selector of the control performing the action; derived from the action when absent
    #[serde(default)]
    pub action_selector: Option<String>,
}

impl PermissionRule {
    pub fn new(resource: &str, action: &str, level: PermissionLevel) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
            allowed_roles: BTreeSet::new(),
            denied_roles: BTreeSet::new(),
            permission_level: level,
            requires_tenant_scope: false,
            requires_data_scope: false,
            action_selector: None,
        }
    }

    pub fn allow<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn deny<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Stable identifier `resource#action`
    pub fn id(&self) -> String {
        format!("{}#{}", self.resource, self.action)
    }

    /// `role ∈ allowed ∧ role ∉ denied`
    pub fn expects_allow(&self, role: &str) -> bool {
        self.allowed_roles.contains(role) && !self.denied_roles.contains(role)
    }

    /// Allowed and denied sets must be disjoint
    pub fn overlapping_roles(&self) -> Vec<String> {
        self.allowed_roles
            .intersection(&self.denied_roles)
            .cloned()
            .collect()
    }

    /// Read-type actions are satisfied by simply loading the resource
    pub fn is_read_action(&self) -> bool {
        matches!(
            self.action.to_lowercase().as_str(),
            "view" | "read" | "list" | "get" | "access"
        )
    }
}

// ============================================================================
// Role Hierarchy
// ============================================================================

/// Node in the role hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RoleDefinition {
    pub name: String,
    /// Declared rank, checked against the inheritance edges
    pub level: u32,
    /// Roles whose capabilities this role inherits (all lower-ranked)
    #[serde(default)]
    pub inherit_from: Vec<String>,
}

impl RoleDefinition {
    pub fn new(name: &str, level: u32) -> Self {
        Self {
            name: name.to_string(),
            level,
            inherit_from: Vec::new(),
        }
    }

    pub fn inherits(mut self, parent: &str) -> Self {
        self.inherit_from.push(parent.to_string());
        self
    }
}

fn default_escalation_risk() -> RiskLevel {
    RiskLevel::High
}

/// Declared lower → higher route that must be proven blocked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EscalationPath {
    pub from_role: String,
    pub to_role: String,
    /// Names of escalation methods to attempt
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default = "default_escalation_risk")]
    pub risk_level: RiskLevel,
    /// Pages that prove `to_role` capabilities; derived from rules and seed paths when empty
    #[serde(default)]
    pub target_paths: Vec<String>,
    /// Content that only a `to_role` page renders
    #[serde(default)]
    pub success_markers: Vec<String>,
}

impl EscalationPath {
    pub fn new(from_role: &str, to_role: &str) -> Self {
        Self {
            from_role: from_role.to_string(),
            to_role: to_role.to_string(),
            methods: Vec::new(),
            risk_level: default_escalation_risk(),
            target_paths: Vec::new(),
            success_markers: Vec::new(),
        }
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_targets(mut self, paths: &[&str]) -> Self {
        self.target_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn id(&self) -> String {
        format!("{}->{}", self.from_role, self.to_role)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryType {
    Tenant,
    Role,
    Data,
    Module,
}

impl std::fmt::Display for BoundaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryType::Tenant => write!(f, "tenant"),
            BoundaryType::Role => write!(f, "role"),
            BoundaryType::Data => write!(f, "data"),
            BoundaryType::Module => write!(f, "module"),
        }
    }
}

/// Declared security perimeter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IsolationBoundary {
    pub name: String,
    pub boundary_type: BoundaryType,
    /// Names of isolation techniques to run
    #[serde(default)]
    pub test_methods: Vec<String>,
    /// Values injected by the techniques (foreign tenant ids, object ids ...)
    #[serde(default)]
    pub bypass_techniques: Vec<String>,
    /// Paths guarded by the boundary; `{tenant}` / `{id}` are substituted
    #[serde(default)]
    pub protected_paths: Vec<String>,
    /// Roles legitimately inside the boundary, not tested
    #[serde(default)]
    pub authorized_roles: BTreeSet<String>,
    /// Content proving foreign data was served; when empty any allow is a breach
    #[serde(default)]
    pub foreign_markers: Vec<String>,
}

impl IsolationBoundary {
    pub fn new(name: &str, boundary_type: BoundaryType) -> Self {
        Self {
            name: name.to_string(),
            boundary_type,
            test_methods: Vec::new(),
            bypass_techniques: Vec::new(),
            protected_paths: Vec::new(),
            authorized_roles: BTreeSet::new(),
            foreign_markers: Vec::new(),
        }
    }

    pub fn with_paths(mut self, paths: &[&str]) -> Self {
        self.protected_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.test_methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_bypass(mut self, techniques: &[&str]) -> Self {
        self.bypass_techniques = techniques.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_markers(mut self, markers: &[&str]) -> Self {
        self.foreign_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn authorize(mut self, role: &str) -> Self {
        self.authorized_roles.insert(role.to_string());
        self
    }

    /// Injected values, with a placeholder foreign identifier when none are declared
    pub fn bypass_values(&self) -> Vec<String> {
        if self.bypass_techniques.is_empty() {
            vec!["foreign-tenant".to_string()]
        } else {
            self.bypass_techniques.clone()
        }
    }
}

/// Hierarchy section of the configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HierarchyConfig {
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
    #[serde(default)]
    pub escalation_paths: Vec<EscalationPath>,
    #[serde(default)]
    pub isolation_boundaries: Vec<IsolationBoundary>,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RbacTestType {
    Permission,
    Escalation,
    Isolation,
    Boundary,
}

impl std::fmt::Display for RbacTestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RbacTestType::Permission => write!(f, "permission"),
            RbacTestType::Escalation => write!(f, "escalation"),
            RbacTestType::Isolation => write!(f, "isolation"),
            RbacTestType::Boundary => write!(f, "boundary"),
        }
    }
}

/// Uniform record shared by all four test types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RbacTestResult {
    pub test_type: RbacTestType,
    pub role: String,
    /// Rule id, escalation id, `boundary/method` or `category:resource`
    pub target: String,
    pub expected: AccessOutcome,
    pub actual: AccessOutcome,
    pub passed: bool,
    pub risk_level: RiskLevel,
    pub evidence: Evidence,
}

impl RbacTestResult {
    pub fn new(
        test_type: RbacTestType,
        role: &str,
        target: &str,
        expected: AccessOutcome,
        actual: AccessOutcome,
        risk_level: RiskLevel,
        evidence: Evidence,
    ) -> Self {
        Self {
            test_type,
            role: role.to_string(),
            target: target.to_string(),
            expected,
            actual,
            passed: expected == actual,
            risk_level,
            evidence,
        }
    }

    /// Actual behavior exceeded what was allowed
    pub fn is_violation(&self) -> bool {
        self.expected == AccessOutcome::Deny && self.actual == AccessOutcome::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expects_allow_respects_deny_list() {
        let rule = PermissionRule::new("/admin", "view", PermissionLevel::Admin)
            .allow(["super_admin", "tenant_admin"])
            .deny(["tenant_admin"]);

        assert!(rule.expects_allow("super_admin"));
        assert!(!rule.expects_allow("tenant_admin"));
        assert!(!rule.expects_allow("readonly_user"));
        assert_eq!(rule.overlapping_roles(), vec!["tenant_admin".to_string()]);
    }

    #[test]
    fn test_violation_severity() {
        assert_eq!(PermissionLevel::Admin.violation_severity(), RiskLevel::Critical);
        assert_eq!(PermissionLevel::Delete.violation_severity(), RiskLevel::Critical);
        assert_eq!(PermissionLevel::Write.violation_severity(), RiskLevel::High);
        assert_eq!(PermissionLevel::Read.violation_severity(), RiskLevel::Medium);
    }

    #[test]
    fn test_result_passed_is_derived() {
        let result = RbacTestResult::new(
            RbacTestType::Permission,
            "readonly_user",
            "/admin#view",
            AccessOutcome::Deny,
            AccessOutcome::Allow,
            RiskLevel::Critical,
            Evidence::default(),
        );
        assert!(!result.passed);
        assert!(result.is_violation());
    }

    #[test]
    fn test_rule_deserialization_defaults() {
        let rule: PermissionRule = serde_yaml::from_str(
            r#"
resource: /reports
allowed_roles: [manager]
"#,
        )
        .unwrap();
        assert_eq!(rule.action, "view");
        assert_eq!(rule.permission_level, PermissionLevel::Read);
        assert!(rule.is_read_action());
    }
}
