// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - HTTP Driver Tests
 * Form login, bearer sessions, anonymous requests, form submission and a
 * per-role crawl against a mock server
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use lonkero_access::config::{AppConfig, ResourceLimits};
use lonkero_access::crawler::RoleCrawler;
use lonkero_access::driver::{Driver, HttpDriver, NavigationOptions};
use lonkero_access::errors::DriverError;
use lonkero_access::events::EventLedger;
use lonkero_access::role::{LoginCredentials, Role};
use lonkero_access::session_pool::SessionPool;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const LOGIN_PAGE: &str = r#"
    <html><body>
    <form action="/login" method="post">
        <input type="text" name="username">
        <input type="password" name="password">
        <input type="hidden" name="csrf" value="tok-1">
        <button type="submit">Sign in</button>
    </form>
    </body></html>
"#;

fn options() -> NavigationOptions {
    NavigationOptions::with_timeout(Duration::from_secs(5))
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_form_login_keeps_session_cookie() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=reader"))
        .and(body_string_contains("csrf=tok-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc123; Path=/")
                .set_body_string("<h1>Welcome</h1>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Dashboard</h1>"))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let driver = HttpDriver::new(&server.uri());
    let role = Role::new("readonly_user").with_credentials(LoginCredentials::new("reader", "s3cret"));
    let session = driver.open_session(&role).await.unwrap();
    let mut page = session.new_page().await.unwrap();

    let response = page.goto("/dashboard", &options()).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("Dashboard"));

    // anonymous requests never carry the role's cookies
    let anonymous = page.goto("/dashboard", &options().anonymous()).await.unwrap();
    assert_eq!(anonymous.status, 401);
}

#[tokio::test]
async fn test_rejected_login_fails_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;

    let driver = HttpDriver::new(&server.uri());
    let role = Role::new("tenant_admin").with_credentials(LoginCredentials::new("admin", "wrong"));

    match driver.open_session(&role).await {
        Err(DriverError::LoginFailed { role, .. }) => assert_eq!(role, "tenant_admin"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("login should have failed"),
    }
}

#[tokio::test]
async fn test_bearer_role_skips_form_login() {
    let server = MockServer::start().await;

    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer t0k3n"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"role": "wms_user"})))
        .expect(1)
        .mount(&server)
        .await;

    let driver = HttpDriver::new(&server.uri());
    let role = Role::new("wms_user")
        .with_credentials(LoginCredentials::bearer("t0k3n"))
        .with_header("X-Tenant", "acme");
    let session = driver.open_session(&role).await.unwrap();
    let mut page = session.new_page().await.unwrap();

    let response = page.goto("/api/me", &options()).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.content_type().unwrap_or_default().contains("json"));
}

#[tokio::test]
async fn test_click_submits_filled_form() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>3 results for widgets</p>"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form action="/search" method="get"><input name="q"><button type="submit">Go</button></form>"#,
        ))
        .mount(&server)
        .await;

    let driver = HttpDriver::new(&server.uri());
    let session = driver.open_session(&Role::new("guest")).await.unwrap();
    let mut page = session.new_page().await.unwrap();

    page.goto("/search", &options()).await.unwrap();
    page.fill("[name=\"q\"]", "widgets").await.unwrap();
    let response = page
        .click("button[type=\"submit\"]", Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert!(response.body.contains("3 results"));
    assert!(page.content().await.unwrap().contains("3 results"));

    let missing = page.fill("[name=\"nope\"]", "x").await;
    assert!(matches!(missing, Err(DriverError::ElementNotFound { .. })));
}

#[tokio::test]
async fn test_crawl_follows_links_per_role() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<nav><a href="/orders">Orders</a><a href="/admin">Admin</a></nav>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Orders</h1>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let roles = vec![Role::new("wms_user")
        .with_credentials(LoginCredentials::bearer("wms"))
        .with_seed_paths(["/dashboard"])];
    let mut config = AppConfig::new(&server.uri(), roles);
    config.crawler.retry_attempts = 1;
    config.crawler.retry_delay_ms = 10;
    config.crawler.screenshots = false;
    config.batch.cooldown_ms = 0;

    let pool = SessionPool::new(
        Arc::new(HttpDriver::new(&server.uri())),
        &config.roles,
        ResourceLimits {
            acquire_timeout_secs: 5,
            ..ResourceLimits::default()
        },
        Arc::new(EventLedger::default()),
    );
    let pool = Arc::new(pool);
    let crawler = RoleCrawler::new(pool.clone(), &config).unwrap();

    let discovery = crawler.discover("wms_user").await.unwrap();
    pool.shutdown().await;

    assert_eq!(discovery.results.len(), 3);
    assert_eq!(
        discovery.accessible_paths(),
        vec!["/dashboard".to_string(), "/orders".to_string()]
    );
    let admin = discovery.result("/admin").unwrap();
    assert!(!admin.accessible);
    assert_eq!(admin.status_code, Some(403));
    assert_eq!(discovery.coverage.accessible_paths, 2);
    assert_eq!(discovery.coverage.total_paths, 3);
}
