// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Assessment Orchestration Tests
 * Crawl, RBAC validation, fuzzing and intelligence in one run
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use lonkero_access::config::AppConfig;
use lonkero_access::driver::{ScriptedDriver, ScriptedResponse};
use lonkero_access::fuzzer::{PayloadCategory, PayloadSet};
use lonkero_access::rbac::{EscalationPath, PermissionLevel, PermissionRule, RoleDefinition};
use lonkero_access::role::{LoginCredentials, Role};
use lonkero_access::{AccessError, Assessment, FindingType, Severity};
use std::sync::Arc;
use tempfile::TempDir;

const REPORTS_PAGE: &str = r#"
    <h1>Reports</h1>
    <form action="/reports" method="get">
        <input type="text" name="filter">
        <button type="submit">Filter</button>
    </form>
"#;

fn roles() -> Vec<Role> {
    vec![
        Role::new("readonly_user")
            .with_credentials(LoginCredentials::bearer("ro"))
            .with_seed_paths(["/dashboard"]),
        Role::new("wms_user")
            .with_credentials(LoginCredentials::bearer("wms"))
            .with_seed_paths(["/dashboard"]),
        Role::new("tenant_admin")
            .with_credentials(LoginCredentials::bearer("admin"))
            .with_seed_paths(["/dashboard", "/admin"]),
    ]
}

fn config(evidence: &TempDir) -> AppConfig {
    let mut config = AppConfig::new("https://wms.test", roles());
    config.crawler.retry_attempts = 2;
    config.crawler.retry_delay_ms = 10;
    config.crawler.navigation_timeout_ms = 1000;
    config.batch.cooldown_ms = 0;
    config.resources.acquire_timeout_secs = 5;
    config.output.screenshot_dir = evidence.path().join("evidence");
    config.target.public_paths = vec!["/login".to_string()];
    config.permission_rules = vec![
        PermissionRule::new("/admin", "view", PermissionLevel::Admin).allow(["tenant_admin"]),
        PermissionRule::new("/reports", "view", PermissionLevel::Read)
            .allow(["readonly_user", "wms_user", "tenant_admin"]),
    ];
    config.hierarchy.roles = vec![
        RoleDefinition::new("readonly_user", 1),
        RoleDefinition::new("wms_user", 2).inherits("readonly_user"),
        RoleDefinition::new("tenant_admin", 3).inherits("wms_user"),
    ];
    config.hierarchy.escalation_paths = vec![EscalationPath::new("wms_user", "tenant_admin")];
    config.fuzzer.payload_sets = vec![PayloadSet::new(
        "sqli-basic",
        PayloadCategory::Sqli,
        Severity::Critical,
        &["' OR '1'='1"],
    )];
    config
}

/// readonly_user slips into /admin, wms_user is refused
fn scripted_app() -> ScriptedDriver {
    let driver = ScriptedDriver::new("https://wms.test");
    driver
        .route(None, "/dashboard", |req| {
            if req.anonymous {
                ScriptedResponse::redirect("/login")
            } else {
                ScriptedResponse::ok(r#"<nav><a href="/reports">Reports</a></nav>"#)
            }
        })
        .route(None, "/reports", |req| {
            if req.anonymous {
                ScriptedResponse::redirect("/login")
            } else {
                ScriptedResponse::ok(REPORTS_PAGE)
            }
        })
        .page(None, "/login", "<form><input type=\"password\" name=\"password\"></form>")
        .route(None, "/admin*", |req| {
            if req.role == "wms_user" || req.anonymous {
                ScriptedResponse::status(403, "<h1>Forbidden</h1>")
            } else {
                ScriptedResponse::ok("<h1>Admin console</h1>")
            }
        });
    driver
}

#[tokio::test]
async fn test_full_assessment_run() {
    let evidence = TempDir::new().unwrap();
    let driver = scripted_app();
    let assessment = Assessment::new(Arc::new(driver.clone()), config(&evidence));

    let report = assessment.run().await.unwrap();

    assert_eq!(report.target, "https://wms.test");
    assert_eq!(report.crawl_statistics.total_roles, 3);
    assert_eq!(report.discoveries.len(), 3);

    // cross-role probing put /admin in every row
    for discovery in report.discoveries.values() {
        assert!(discovery.result("/admin").is_some(), "{} never probed /admin", discovery.role);
    }
    assert!(!report.discoveries["wms_user"].result("/admin").unwrap().accessible);
    assert!(report.discoveries["readonly_user"].result("/admin").unwrap().accessible);

    let unauthorized: Vec<_> = report
        .vulnerabilities
        .iter()
        .filter(|v| v.vuln_type == FindingType::UnauthorizedAccess)
        .collect();
    assert_eq!(unauthorized.len(), 1);
    assert_eq!(unauthorized[0].role, "readonly_user");
    assert_eq!(unauthorized[0].resource, "/admin");
    assert_eq!(report.vulnerabilities[0].severity, Severity::Critical);
    assert_eq!(
        report
            .vulnerabilities
            .iter()
            .filter(|v| v.resource == "/admin")
            .count(),
        1
    );
    assert!(report
        .vulnerabilities
        .windows(2)
        .all(|w| w[0].severity >= w[1].severity));

    assert_eq!(report.rbac.escalation_results.len(), 1);
    assert!(report.rbac.escalation_results[0].blocked);

    assert_eq!(report.fuzzing.len(), 3);
    assert!(report.fuzzing.values().all(|f| f.statistics.tests_executed > 0));

    let intel = &report.intelligence;
    assert_eq!(intel.executive_summary.roles_analyzed, 3);
    assert_eq!(intel.executive_summary.vulnerabilities, report.vulnerabilities.len());
    assert!(intel.permission_patterns.hierarchy_compliance.compliance_score < 100.0);
    assert!(intel
        .permission_patterns
        .hierarchy_compliance
        .violations
        .iter()
        .any(|v| v.lower_role == "readonly_user" && v.higher_role == "wms_user" && v.path == "/admin"));
    assert!(!intel.recommendations.is_empty());

    // every session was closed when the run ended
    assert_eq!(driver.sessions_opened(), driver.sessions_closed());
    assert_eq!(driver.open_pages(), 0);
}

#[tokio::test]
async fn test_report_written_as_json() {
    let evidence = TempDir::new().unwrap();
    let mut config = config(&evidence);
    config.fuzzer.enabled = false;

    let report = Assessment::new(Arc::new(scripted_app()), config)
        .run()
        .await
        .unwrap();
    assert!(report.fuzzing.is_empty());
    assert_eq!(report.intelligence.executive_summary.security_tests, 0);

    let out = evidence.path().join("reports").join("assessment.json");
    report.write_json(&out, true).unwrap();

    let raw = std::fs::read_to_string(&out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["target"], "https://wms.test");
    assert!(json["crawlStatistics"]["totalRoles"].is_number());
    assert!(json["intelligence"]["roleComparison"]["matrix"]["roles"].is_array());
    assert!(json["intelligence"]["executiveSummary"]["overallScore"].is_number());
    assert!(json["vulnerabilities"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["type"] == "unauthorized_access"));
}

#[tokio::test]
async fn test_failed_login_aborts_and_closes_sessions() {
    let evidence = TempDir::new().unwrap();
    let driver = scripted_app();
    driver.fail_login("tenant_admin");

    let err = Assessment::new(Arc::new(driver.clone()), config(&evidence))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, AccessError::SessionUnavailable { ref role, .. } if role == "tenant_admin"));
    assert_eq!(driver.sessions_opened(), driver.sessions_closed());
}
