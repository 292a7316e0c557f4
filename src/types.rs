// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity / risk level shared by findings, rules and analysis output.
/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Risk levels use the same scale as severities
pub type RiskLevel = Severity;

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

impl Severity {
    /// Numeric weight used by scoring (0-4)
    pub fn weight(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Outcome of an access attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessOutcome {
    Allow,
    Deny,
    Error,
}

impl std::fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessOutcome::Allow => write!(f, "allow"),
            AccessOutcome::Deny => write!(f, "deny"),
            AccessOutcome::Error => write!(f, "error"),
        }
    }
}

/// Kind of recorded finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    UnauthorizedAccess,
    PrivilegeEscalation,
    IsolationBreach,
    BoundaryBypass,
    Injection,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingType::UnauthorizedAccess => write!(f, "unauthorized_access"),
            FindingType::PrivilegeEscalation => write!(f, "privilege_escalation"),
            FindingType::IsolationBreach => write!(f, "isolation_breach"),
            FindingType::BoundaryBypass => write!(f, "boundary_bypass"),
            FindingType::Injection => write!(f, "injection"),
        }
    }
}

impl FindingType {
    pub fn cwe(&self) -> &'static str {
        match self {
            FindingType::UnauthorizedAccess => "CWE-285",
            FindingType::PrivilegeEscalation => "CWE-269",
            FindingType::IsolationBreach => "CWE-639",
            FindingType::BoundaryBypass => "CWE-863",
            FindingType::Injection => "CWE-74",
        }
    }
}

/// Evidence captured alongside a probe
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Evidence {
    /// Evidence for a probe that never produced a response
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// A recorded finding where actual behavior exceeds the allowed outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    #[serde(rename = "type")]
    pub vuln_type: FindingType,
    pub severity: Severity,
    pub confidence: Confidence,
    pub category: String,
    pub role: String,
    pub resource: String,
    pub description: String,
    pub evidence: Evidence,
    pub cwe: String,
    pub remediation: String,
    pub discovered_at: String,
}

impl Vulnerability {
    pub fn new(
        vuln_type: FindingType,
        severity: Severity,
        role: &str,
        resource: &str,
        description: String,
        evidence: Evidence,
    ) -> Self {
        Self {
            id: format!("{}_{}", vuln_type, uuid::Uuid::new_v4()),
            vuln_type,
            severity,
            confidence: Confidence::High,
            category: "Authorization".to_string(),
            role: role.to_string(),
            resource: resource.to_string(),
            description,
            evidence,
            cwe: vuln_type.cwe().to_string(),
            remediation: default_remediation(vuln_type).to_string(),
            discovered_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Identity used to collapse duplicate findings
    pub fn dedup_key(&self) -> (FindingType, String, String) {
        (self.vuln_type, self.role.clone(), self.resource.clone())
    }
}

fn default_remediation(vuln_type: FindingType) -> &'static str {
    match vuln_type {
        FindingType::UnauthorizedAccess => {
            "1. Enforce the permission matrix server-side on every route\n\
             2. Deny by default and grant per role explicitly\n\
             3. Hide navigation is not access control: check on the handler"
        }
        FindingType::PrivilegeEscalation => {
            "1. Derive the effective role from the server-side session only\n\
             2. Ignore client-supplied role parameters, headers and storage values\n\
             3. Re-check privileges on every privileged action"
        }
        FindingType::IsolationBreach => {
            "1. Scope every query by the authenticated tenant\n\
             2. Never trust tenant or object identifiers from the request\n\
             3. Use indirect object references"
        }
        FindingType::BoundaryBypass => {
            "1. Require a valid session for every protected route\n\
             2. Invalidate forged or expired session tokens\n\
             3. Protect data APIs with the same checks as pages"
        }
        FindingType::Injection => {
            "1. Use parameterized queries and context-aware output encoding\n\
             2. Validate input against allow-lists\n\
             3. Never pass user input to shells or template engines"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::Critical.weight(), 4);
    }

    #[test]
    fn test_finding_type_serialization() {
        let json = serde_json::to_string(&FindingType::UnauthorizedAccess).unwrap();
        assert_eq!(json, "\"unauthorized_access\"");
        assert_eq!(FindingType::PrivilegeEscalation.to_string(), "privilege_escalation");
    }

    #[test]
    fn test_vulnerability_dedup_key() {
        let vuln = Vulnerability::new(
            FindingType::UnauthorizedAccess,
            Severity::Critical,
            "readonly_user",
            "/admin",
            "readonly_user reached /admin".to_string(),
            Evidence::default(),
        );
        assert_eq!(
            vuln.dedup_key(),
            (FindingType::UnauthorizedAccess, "readonly_user".to_string(), "/admin".to_string())
        );
        assert_eq!(vuln.cwe, "CWE-285");
    }
}
