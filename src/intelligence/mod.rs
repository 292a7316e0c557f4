// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Access Intelligence Engine
 * Turns per-role crawl, RBAC and fuzzing records into comparable, scored analysis.
 * Pure transform over collected records; never touches a live session.
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

pub mod comparison;
pub mod heatmap;
pub mod insights;
pub mod patterns;

pub use comparison::{
    AnomalyKind, CellAccess, ComparisonMatrix, ExpectedAccess, MatrixAnomaly, RuleExpectations,
};
pub use heatmap::{Heatmap, HeatmapCell, PerformanceAnalysis, RolePerformance, SlowPath};
pub use insights::{
    ActionableInsight, ExecutiveSummary, Magnitude, Priority, RiskSource, SecurityPosture, SecurityRisk,
};
pub use patterns::{
    AccessPattern, GapKind, HierarchyCompliance, HierarchyViolation, PatternKind, PermissionGap,
};

use crate::crawler::PathDiscovery;
use crate::errors::AccessResult;
use crate::fuzzer::SecurityTestResult;
use crate::rbac::{PermissionRule, RbacTestResult, RoleHierarchy};
use crate::types::{Severity, Vulnerability};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const KEY_FINDINGS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPatternAnalysis {
    pub hierarchy_compliance: HierarchyCompliance,
    pub access_patterns: Vec<AccessPattern>,
    pub permission_gaps: Vec<PermissionGap>,
    pub security_risks: Vec<SecurityRisk>,
}

/// One role's place in the declared hierarchy and what it reached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyTier {
    pub role: String,
    pub level: Option<u32>,
    /// Analysed roles this one transitively inherits from
    pub outranks: Vec<String>,
    pub accessible_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleComparison {
    pub matrix: ComparisonMatrix,
    pub common_access: Vec<String>,
    pub unique_access: BTreeMap<String, Vec<String>>,
    /// Highest level first
    pub hierarchical_access: Vec<HierarchyTier>,
    /// Cells disagreeing with the declared permission matrix
    pub security_exceptions: Vec<MatrixAnomaly>,
}

/// Complete analysis of one run; rebuilt, never mutated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceReport {
    pub permission_patterns: PermissionPatternAnalysis,
    pub role_comparison: RoleComparison,
    pub heatmap: Heatmap,
    pub performance: PerformanceAnalysis,
    pub recommendations: Vec<ActionableInsight>,
    pub executive_summary: ExecutiveSummary,
}

pub struct IntelligenceEngine {
    hierarchy: RoleHierarchy,
    rules: Vec<PermissionRule>,
    public_paths: Vec<String>,
}

impl IntelligenceEngine {
    pub fn new(hierarchy: RoleHierarchy, rules: Vec<PermissionRule>, public_paths: Vec<String>) -> Self {
        Self {
            hierarchy,
            rules,
            public_paths,
        }
    }

    /// Same records in, identical report out
    pub fn analyze(
        &self,
        discoveries: &BTreeMap<String, PathDiscovery>,
        rbac_results: &[RbacTestResult],
        security_results: &[SecurityTestResult],
        vulnerabilities: &[Vulnerability],
    ) -> AccessResult<IntelligenceReport> {
        info!("[Intel] Analyzing {} roles", discoveries.len());

        let matrix = ComparisonMatrix::from_discoveries(discoveries)?;
        debug!(
            "[Intel] Matrix: {} roles x {} paths",
            matrix.roles.len(),
            matrix.paths.len()
        );

        let compliance = patterns::hierarchy_compliance(&matrix, &self.hierarchy);
        let access_patterns = patterns::detect_access_patterns(&matrix, &self.hierarchy);
        let gaps = patterns::permission_gaps(&matrix, &self.rules, &self.hierarchy);
        let anomalies = matrix.find_anomalies(&RuleExpectations::new(&self.rules, &self.public_paths));
        let risks = insights::collect_risks(&compliance, &access_patterns, &anomalies, vulnerabilities);

        let heatmap = Heatmap::from_matrix(&matrix);
        let performance = PerformanceAnalysis::from_matrix(&matrix);
        let recommendations = insights::build_insights(&risks, &gaps, vulnerabilities);

        let overall = insights::overall_score(
            compliance.compliance_score,
            performance.performance_score,
            risks.len(),
        );
        let posture = insights::posture(&risks, compliance.compliance_score);

        let executive_summary = ExecutiveSummary {
            overall_score: overall,
            posture,
            compliance_score: compliance.compliance_score,
            performance_score: performance.performance_score,
            roles_analyzed: matrix.roles.len(),
            paths_analyzed: matrix.paths.len(),
            total_risks: risks.len(),
            critical_risks: risks.iter().filter(|r| r.severity == Severity::Critical).count(),
            high_risks: risks.iter().filter(|r| r.severity == Severity::High).count(),
            vulnerabilities: vulnerabilities.len(),
            rbac_tests: rbac_results.len(),
            rbac_failures: rbac_results.iter().filter(|r| !r.passed).count(),
            security_tests: security_results.len(),
            injection_findings: security_results.iter().filter(|r| r.vulnerable).count(),
            key_findings: recommendations
                .iter()
                .take(KEY_FINDINGS)
                .map(|i| i.title.clone())
                .collect(),
        };

        info!(
            "[Intel] Score {:.1} ({}), compliance {:.1}%, {} risks",
            overall,
            posture,
            compliance.compliance_score,
            risks.len()
        );

        let role_comparison = RoleComparison {
            common_access: matrix.common_access(),
            unique_access: matrix.unique_access(),
            hierarchical_access: self.hierarchical_access(&matrix),
            security_exceptions: anomalies,
            matrix,
        };

        Ok(IntelligenceReport {
            permission_patterns: PermissionPatternAnalysis {
                hierarchy_compliance: compliance,
                access_patterns,
                permission_gaps: gaps,
                security_risks: risks,
            },
            role_comparison,
            heatmap,
            performance,
            recommendations,
            executive_summary,
        })
    }

    fn hierarchical_access(&self, matrix: &ComparisonMatrix) -> Vec<HierarchyTier> {
        let mut tiers: Vec<HierarchyTier> = matrix
            .roles
            .iter()
            .enumerate()
            .map(|(r, role)| HierarchyTier {
                role: role.clone(),
                level: self.hierarchy.level(role),
                outranks: matrix
                    .roles
                    .iter()
                    .filter(|other| self.hierarchy.outranks(role, other))
                    .cloned()
                    .collect(),
                accessible_paths: matrix.accessible_paths(r).into_iter().map(str::to_string).collect(),
            })
            .collect();
        tiers.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.role.cmp(&b.role)));
        tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::comparison::tests::discoveries;
    use crate::rbac::{PermissionLevel, RoleDefinition};

    fn engine() -> IntelligenceEngine {
        let hierarchy = RoleHierarchy::build(&[
            RoleDefinition::new("readonly_user", 1),
            RoleDefinition::new("wms_user", 2).inherits("readonly_user"),
            RoleDefinition::new("tenant_admin", 3).inherits("wms_user"),
        ])
        .unwrap();
        let rules = vec![PermissionRule::new("/admin", "view", PermissionLevel::Admin).allow(["tenant_admin"])];
        IntelligenceEngine::new(hierarchy, rules, vec!["/".to_string()])
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let d = discoveries(&[
            ("readonly_user", vec![("/", true), ("/admin", true), ("/reports", true)]),
            ("wms_user", vec![("/", true), ("/admin", false), ("/reports", false)]),
            ("tenant_admin", vec![("/", true), ("/admin", true), ("/reports", true)]),
        ]);
        let engine = engine();
        let first = engine.analyze(&d, &[], &[], &[]).unwrap();
        let second = engine.analyze(&d, &[], &[], &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_report_sections_consistent() {
        let d = discoveries(&[
            ("readonly_user", vec![("/", true), ("/admin", true)]),
            ("wms_user", vec![("/", true), ("/admin", false)]),
            ("tenant_admin", vec![("/", true), ("/admin", true)]),
        ]);
        let report = engine().analyze(&d, &[], &[], &[]).unwrap();

        // readonly_user reaches /admin but wms_user does not
        let compliance = &report.permission_patterns.hierarchy_compliance;
        assert_eq!(compliance.violations.len(), 1);
        assert!(compliance.compliance_score < 100.0);

        let exceptions = &report.role_comparison.security_exceptions;
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].role, "readonly_user");
        assert_eq!(exceptions[0].kind, AnomalyKind::UnexpectedlyGranted);

        assert_eq!(report.role_comparison.hierarchical_access[0].role, "tenant_admin");
        assert_eq!(
            report.role_comparison.hierarchical_access[0].outranks,
            vec!["readonly_user", "wms_user"]
        );
        assert_eq!(report.role_comparison.common_access, vec!["/"]);
        assert_eq!(report.heatmap.cells.len(), 3);
        assert_eq!(report.executive_summary.roles_analyzed, 3);
        assert!(report.recommendations.iter().all(|i| i.id.starts_with("INS-")));
    }

    #[test]
    fn test_empty_input_yields_clean_report() {
        let report = engine().analyze(&BTreeMap::new(), &[], &[], &[]).unwrap();
        assert_eq!(report.permission_patterns.hierarchy_compliance.compliance_score, 100.0);
        assert_eq!(report.executive_summary.overall_score, 100.0);
        assert_eq!(report.executive_summary.posture, SecurityPosture::Excellent);
        // every hierarchy role lacks crawl data
        assert_eq!(report.permission_patterns.permission_gaps.len(), 3);
    }
}
