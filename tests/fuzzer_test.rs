// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Payload Fuzzer Tests
 * Form and API injection against scripted pages, detection and evidence
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use lonkero_access::config::{AppConfig, ResourceLimits};
use lonkero_access::driver::{NetworkExchange, ScriptedDriver, ScriptedResponse};
use lonkero_access::errors::AccessError;
use lonkero_access::events::{EventKind, EventLedger};
use lonkero_access::fuzzer::{FuzzerEngine, PayloadCategory, PayloadSet, SurfaceKind};
use lonkero_access::role::{LoginCredentials, Role};
use lonkero_access::session_pool::SessionPool;
use lonkero_access::types::{FindingType, Severity};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SEARCH_PAGE: &str = r#"
    <html><body>
    <form action="/search" method="get">
        <input type="text" name="q">
        <button type="submit">Search</button>
    </form>
    </body></html>
"#;

fn config(roles: Vec<Role>, sets: Vec<PayloadSet>, evidence: &TempDir) -> AppConfig {
    let mut config = AppConfig::new("https://wms.test", roles);
    config.crawler.retry_attempts = 2;
    config.crawler.retry_delay_ms = 10;
    config.batch.cooldown_ms = 0;
    config.fuzzer.payload_sets = sets;
    config.output.screenshot_dir = evidence.path().to_path_buf();
    config
}

fn engine(driver: &ScriptedDriver, config: &AppConfig) -> FuzzerEngine {
    let pool = SessionPool::new(
        Arc::new(driver.clone()),
        &config.roles,
        ResourceLimits {
            acquire_timeout_secs: 5,
            ..ResourceLimits::default()
        },
        Arc::new(EventLedger::default()),
    );
    FuzzerEngine::new(Arc::new(pool), config)
}

fn search_role() -> Role {
    Role::new("wms_user")
        .with_credentials(LoginCredentials::bearer("wms-token"))
        .with_seed_paths(["/search"])
}

#[tokio::test]
async fn test_sql_error_after_injection_is_critical() {
    let evidence = TempDir::new().unwrap();
    let sets = vec![PayloadSet::new(
        "sqli-basic",
        PayloadCategory::Sqli,
        Severity::Critical,
        &["' OR '1'='1"],
    )];
    let mut config = config(vec![search_role()], sets, &evidence);
    config.fuzzer.api_fuzzing = false;

    let driver = ScriptedDriver::new("https://wms.test");
    driver.route(None, "/search", |req| match req.param("q") {
        Some(q) if q.contains("' OR '1'='1") => {
            ScriptedResponse::status(500, "<pre>SQL syntax error near ''1'='1'</pre>")
        }
        _ => ScriptedResponse::ok(SEARCH_PAGE),
    });

    let report = engine(&driver, &config).fuzz_role("wms_user", None).await.unwrap();

    assert_eq!(report.statistics.forms_discovered, 1);
    assert_eq!(report.statistics.tests_executed, 1);
    assert_eq!(report.statistics.vulnerable, 1);

    let result = &report.results[0];
    assert!(result.vulnerable);
    assert!(!result.ambiguous);
    assert_eq!(result.surface, SurfaceKind::Form);
    assert_eq!(result.category, PayloadCategory::Sqli);
    assert_eq!(result.risk_level, Some(Severity::Critical));
    assert_eq!(result.fields, vec!["q".to_string()]);
    assert_eq!(result.payload, "' OR '1'='1");
    assert!(result
        .evidence
        .response_snippet
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
        .contains("sql syntax"));

    let json = serde_json::to_value(result).unwrap();
    assert_eq!(json["category"], "sqli");
    assert_eq!(json["riskLevel"], "critical");

    let vulns = report.vulnerabilities();
    assert_eq!(vulns.len(), 1);
    assert_eq!(vulns[0].vuln_type, FindingType::Injection);
    assert_eq!(vulns[0].severity, Severity::Critical);
    assert_eq!(vulns[0].role, "wms_user");

    let submitted = driver
        .requests_for("wms_user")
        .into_iter()
        .filter(|r| r.contains_value("' OR '1'='1"))
        .count();
    assert_eq!(submitted, 1);
}

#[tokio::test]
async fn test_indicator_already_in_baseline_is_ambiguous() {
    let evidence = TempDir::new().unwrap();
    let sets = vec![PayloadSet::new(
        "sqli-basic",
        PayloadCategory::Sqli,
        Severity::Critical,
        &["' OR 1=1--"],
    )];
    let mut config = config(vec![search_role()], sets, &evidence);
    config.fuzzer.api_fuzzing = false;

    // the help text always mentions SQL syntax
    let page = SEARCH_PAGE.replace("<body>", "<body><p>Tip: SQL syntax is not supported here</p>");
    let driver = ScriptedDriver::new("https://wms.test");
    driver.page(None, "/search", &page);

    let report = engine(&driver, &config).fuzz_role("wms_user", None).await.unwrap();

    assert_eq!(report.statistics.tests_executed, 1);
    assert_eq!(report.statistics.vulnerable, 0);
    assert_eq!(report.statistics.ambiguous, 1);
    assert!(report.results[0].ambiguous);
    assert_eq!(report.results[0].risk_level, None);
    assert!(report.vulnerabilities().is_empty());
}

#[tokio::test]
async fn test_api_endpoint_from_traffic_is_fuzzed() {
    let evidence = TempDir::new().unwrap();
    let role = Role::new("wms_user")
        .with_credentials(LoginCredentials::bearer("wms-token"))
        .with_seed_paths(["/api/orders?status=open"]);
    let sets = vec![PayloadSet::new(
        "cmdi-basic",
        PayloadCategory::Cmdi,
        Severity::Critical,
        &["; id"],
    )];
    let config = config(vec![role], sets, &evidence);

    let driver = ScriptedDriver::new("https://wms.test");
    driver.route(None, "/api/orders", |req| match req.param("status") {
        Some(s) if s.contains("; id") => {
            ScriptedResponse::json(serde_json::json!({"error": "uid=33(www-data) gid=33(www-data)"}))
        }
        _ => ScriptedResponse::json(serde_json::json!({"orders": []})),
    });

    let report = engine(&driver, &config).fuzz_role("wms_user", None).await.unwrap();

    assert!(report.forms.is_empty());
    assert_eq!(report.api_endpoints.len(), 1);
    assert_eq!(report.api_endpoints[0].path, "/api/orders");
    assert_eq!(report.api_endpoints[0].parameters, vec!["status".to_string()]);

    let vulnerable: Vec<_> = report.vulnerable_results().collect();
    assert_eq!(vulnerable.len(), 1);
    assert_eq!(vulnerable[0].surface, SurfaceKind::Api);
    assert_eq!(vulnerable[0].category, PayloadCategory::Cmdi);
    assert_eq!(vulnerable[0].risk_level, Some(Severity::Critical));

    // every fuzz request carried the role's own credentials
    assert!(driver
        .requests_for("wms_user")
        .iter()
        .all(|r| r.header("authorization") == Some("Bearer wms-token")));
}

#[tokio::test]
async fn test_traffic_before_fuzzing_is_not_an_api_surface() {
    let evidence = TempDir::new().unwrap();
    let role = Role::new("wms_user")
        .with_credentials(LoginCredentials::bearer("wms-token"))
        .with_seed_paths(["/api/orders?status=open"]);
    let sets = vec![PayloadSet::new(
        "cmdi-basic",
        PayloadCategory::Cmdi,
        Severity::Critical,
        &["; id"],
    )];
    let config = config(vec![role], sets, &evidence);

    let driver = ScriptedDriver::new("https://wms.test");
    driver
        .respond(None, "/api/orders", ScriptedResponse::json(serde_json::json!({"orders": []})))
        .respond(None, "/api/users/*", ScriptedResponse::json(serde_json::json!({"ok": true})));

    // forged requests left behind by the access-control stage
    let ledger = Arc::new(EventLedger::default());
    for (method, url, body) in [
        ("POST", "https://wms.test/api/users/7", Some(r#"{"role":"admin","isAdmin":true}"#)),
        ("GET", "https://wms.test/api/users/7?tenant=acme", None),
    ] {
        ledger.record(
            "wms_user",
            EventKind::Network(NetworkExchange {
                method: method.to_string(),
                url: url.to_string(),
                status: 200,
                content_type: Some("application/json".to_string()),
                request_body: body.map(str::to_string),
            }),
        );
    }
    let pool = SessionPool::new(
        Arc::new(driver.clone()),
        &config.roles,
        ResourceLimits {
            acquire_timeout_secs: 5,
            ..ResourceLimits::default()
        },
        ledger,
    );

    let report = FuzzerEngine::new(Arc::new(pool), &config)
        .fuzz_role("wms_user", None)
        .await
        .unwrap();

    assert_eq!(report.api_endpoints.len(), 1);
    assert_eq!(report.api_endpoints[0].path, "/api/orders");
    assert!(!driver
        .requests_for("wms_user")
        .iter()
        .any(|r| r.path.starts_with("/api/users")));
}

#[tokio::test]
async fn test_login_failure_aborts_campaign() {
    let evidence = TempDir::new().unwrap();
    let roles = vec![
        search_role(),
        Role::new("broken")
            .with_credentials(LoginCredentials::bearer("x"))
            .with_seed_paths(["/search"]),
    ];
    let sets = vec![PayloadSet::new(
        "xss-basic",
        PayloadCategory::Xss,
        Severity::High,
        &["<script>alert('lonkero')</script>"],
    )];
    let mut config = config(roles, sets, &evidence);
    config.fuzzer.api_fuzzing = false;

    let driver = ScriptedDriver::new("https://wms.test");
    driver.page(None, "/search", SEARCH_PAGE).fail_login("broken");

    let roles = vec!["wms_user".to_string(), "broken".to_string()];
    let err = engine(&driver, &config)
        .fuzz_roles(&roles, &Default::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, AccessError::SessionUnavailable { ref role, .. } if role == "broken"));
}

#[tokio::test]
async fn test_escaped_output_is_clean() {
    let evidence = TempDir::new().unwrap();
    let sets = vec![PayloadSet::new(
        "xss-basic",
        PayloadCategory::Xss,
        Severity::High,
        &["<script>alert('lonkero')</script>"],
    )];
    let mut config = config(vec![search_role()], sets, &evidence);
    config.fuzzer.api_fuzzing = false;

    let driver = ScriptedDriver::new("https://wms.test");
    driver.route(None, "/search", |req| match req.param("q") {
        Some(_) => ScriptedResponse::ok("<p>No results for &lt;script&gt;alert('lonkero')&lt;/script&gt;</p>"),
        None => ScriptedResponse::ok(SEARCH_PAGE),
    });

    let report = engine(&driver, &config).fuzz_role("wms_user", None).await.unwrap();

    assert_eq!(report.statistics.tests_executed, 1);
    assert_eq!(report.statistics.vulnerable, 0);
    assert_eq!(report.statistics.ambiguous, 0);
    assert!(!report.results[0].vulnerable);
}

#[tokio::test]
async fn test_more_roles_than_sessions_all_fuzzed() {
    let evidence = TempDir::new().unwrap();
    let roles: Vec<Role> = (0..6)
        .map(|i| {
            Role::new(&format!("r{}", i))
                .with_credentials(LoginCredentials::bearer("t"))
                .with_seed_paths(["/search"])
        })
        .collect();
    let names: Vec<String> = roles.iter().map(|r| r.name.clone()).collect();
    let sets = vec![PayloadSet::new(
        "sqli-basic",
        PayloadCategory::Sqli,
        Severity::Critical,
        &["' OR '1'='1"],
    )];
    let mut config = config(roles, sets, &evidence);
    config.fuzzer.api_fuzzing = false;

    let driver = ScriptedDriver::new("https://wms.test");
    driver.route(None, "/search", |_| {
        ScriptedResponse::ok(SEARCH_PAGE).with_delay(Duration::from_millis(100))
    });

    // four sessions by default, six roles to serve
    let reports = engine(&driver, &config)
        .fuzz_roles(&names, &Default::default())
        .await
        .unwrap();

    assert_eq!(reports.len(), 6);
    assert!(reports.values().all(|r| r.statistics.tests_executed == 1));
    assert!(driver.sessions_opened() >= 6);
}
