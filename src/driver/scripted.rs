// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! In-memory driver serving scripted responses per role and path.
//!
//! Used by the test-suite and for dry runs: every request is recorded, every
//! response comes from a registered responder. Routes registered for a role
//! win over routes registered for any role; unmatched paths answer 404.

use super::form::{ensure_selector, resolve_click};
use super::{
    ApiRequest, BrowserSession, ConsoleMessage, Driver, NavigationOptions, NetworkExchange, Page,
    PageObserver, PageResponse,
};
use crate::errors::{DriverError, DriverResult};
use crate::role::Role;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MAX_REDIRECTS: usize = 5;

/// A request as seen by a scripted responder
#[derive(Debug, Clone, Default)]
pub struct ScriptedRequest {
    pub role: String,
    pub method: String,
    pub url: String,
    /// Path without query
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Submitted form fields
    pub fields: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Lowercased header names
    pub headers: BTreeMap<String, String>,
    pub anonymous: bool,
    /// Scripts evaluated on the page before this request
    pub scripts: Vec<String>,
}

impl ScriptedRequest {
    /// Form field first, then query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .or_else(|| self.query.get(name))
            .map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Every user-controlled value carried by the request
    pub fn values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self
            .query
            .values()
            .chain(self.fields.values())
            .map(String::as_str)
            .collect();
        if let Some(body) = &self.body {
            values.push(body);
        }
        values
    }

    pub fn contains_value(&self, needle: &str) -> bool {
        self.values().iter().any(|v| v.contains(needle))
    }
}

/// Canned response returned by a responder
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    /// Redirect target (path or URL), followed like a browser would
    pub redirect_to: Option<String>,
    pub console: Vec<ConsoleMessage>,
    pub delay: Option<Duration>,
    pub error: Option<DriverError>,
}

impl ScriptedResponse {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        Self {
            status,
            body: body.into(),
            headers,
            redirect_to: None,
            console: Vec::new(),
            delay: None,
            error: None,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok(value.to_string()).with_header("content-type", "application/json")
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            redirect_to: Some(location.to_string()),
            ..Self::status(302, "")
        }
    }

    pub fn not_found() -> Self {
        Self::status(404, "<html><body><h1>Not Found</h1></body></html>")
    }

    pub fn failure(error: DriverError) -> Self {
        Self {
            error: Some(error),
            ..Self::status(0, "")
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_console(mut self, level: &str, text: &str) -> Self {
        self.console.push(ConsoleMessage {
            level: level.to_string(),
            text: text.to_string(),
        });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = Arc<dyn Fn(&ScriptedRequest) -> ScriptedResponse + Send + Sync>;

struct Route {
    role: Option<String>,
    path: String,
    responder: Responder,
}

impl Route {
    fn matches_path(&self, path: &str) -> bool {
        match self.path.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.path == path,
        }
    }
}

#[derive(Default)]
struct Shared {
    base_url: String,
    routes: RwLock<Vec<Route>>,
    login_failures: RwLock<BTreeSet<String>>,
    requests: Mutex<Vec<ScriptedRequest>>,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    open_pages: AtomicUsize,
    peak_pages: AtomicUsize,
}

impl Shared {
    fn responder_for(&self, role: &str, path: &str) -> Option<Responder> {
        let routes = self.routes.read();
        let specific = routes
            .iter()
            .rev()
            .find(|r| r.role.as_deref() == Some(role) && r.matches_path(path));
        let any = || {
            routes
                .iter()
                .rev()
                .find(|r| r.role.is_none() && r.matches_path(path))
        };
        specific.or_else(any).map(|r| r.responder.clone())
    }

    fn page_opened(&self) {
        let open = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_pages.fetch_max(open, Ordering::SeqCst);
    }

    fn page_closed(&self) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic driver for tests and dry runs
#[derive(Clone)]
pub struct ScriptedDriver {
    shared: Arc<Shared>,
}

impl ScriptedDriver {
    pub fn new(base_url: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                base_url: base_url.trim_end_matches('/').to_string(),
                ..Shared::default()
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.shared.base_url
    }

    /// Register a responder for `path` (`/api/*` matches by prefix); `role = None` matches any role
    pub fn route<F>(&self, role: Option<&str>, path: &str, responder: F) -> &Self
    where
        F: Fn(&ScriptedRequest) -> ScriptedResponse + Send + Sync + 'static,
    {
        self.shared.routes.write().push(Route {
            role: role.map(str::to_string),
            path: path.to_string(),
            responder: Arc::new(responder),
        });
        self
    }

    /// Register a fixed response
    pub fn respond(&self, role: Option<&str>, path: &str, response: ScriptedResponse) -> &Self {
        self.route(role, path, move |_| response.clone())
    }

    /// Register a 200 HTML page
    pub fn page(&self, role: Option<&str>, path: &str, html: &str) -> &Self {
        self.respond(role, path, ScriptedResponse::ok(html))
    }

    /// Make session creation fail for `role`
    pub fn fail_login(&self, role: &str) -> &Self {
        self.shared.login_failures.write().insert(role.to_string());
        self
    }

    /// Every request served so far, in order
    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.shared.requests.lock().clone()
    }

    pub fn requests_for(&self, role: &str) -> Vec<ScriptedRequest> {
        self.shared
            .requests
            .lock()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.shared.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.shared.open_pages.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open pages observed
    pub fn peak_open_pages(&self) -> usize {
        self.shared.peak_pages.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn open_session(&self, role: &Role) -> DriverResult<Arc<dyn BrowserSession>> {
        if self.shared.login_failures.read().contains(&role.name) {
            return Err(DriverError::LoginFailed {
                role: role.name.clone(),
                reason: "scripted login failure".to_string(),
            });
        }
        self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            shared: self.shared.clone(),
            role: role.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedSession {
    shared: Arc<Shared>,
    role: Role,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::SessionClosed);
        }
        self.shared.page_opened();
        Ok(Box::new(ScriptedPage {
            shared: self.shared.clone(),
            role: self.role.clone(),
            current_url: None,
            html: String::new(),
            fills: Vec::new(),
            scripts: Vec::new(),
            observers: Vec::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.sessions_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct ScriptedPage {
    shared: Arc<Shared>,
    role: Role,
    current_url: Option<String>,
    html: String,
    fills: Vec<(String, String)>,
    scripts: Vec<String>,
    observers: Vec<Arc<dyn PageObserver>>,
    closed: bool,
}

struct Dispatch<'a> {
    method: &'a str,
    url: String,
    fields: Vec<(String, String)>,
    body: Option<String>,
    headers: &'a [(String, String)],
    anonymous: bool,
    timeout: Duration,
}

impl ScriptedPage {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn build_request(&self, dispatch: &Dispatch<'_>, url: &str) -> ScriptedRequest {
        let absolute = super::resolve_url(&self.shared.base_url, url);
        let (path, query) = match url::Url::parse(&absolute) {
            Ok(parsed) => (
                parsed.path().to_string(),
                parsed.query_pairs().into_owned().collect(),
            ),
            Err(_) => (url.to_string(), BTreeMap::new()),
        };

        let mut headers = BTreeMap::new();
        if !dispatch.anonymous {
            for (k, v) in &self.role.headers {
                headers.insert(k.to_lowercase(), v.clone());
            }
            if let Some(token) = self.role.credentials.as_ref().and_then(|c| c.token.as_ref()) {
                headers.insert("authorization".to_string(), format!("Bearer {}", token));
            }
        }
        for (k, v) in dispatch.headers {
            headers.insert(k.to_lowercase(), v.clone());
        }

        ScriptedRequest {
            role: self.role.name.clone(),
            method: dispatch.method.to_uppercase(),
            url: absolute,
            path,
            query,
            fields: dispatch.fields.iter().cloned().collect(),
            body: dispatch.body.clone(),
            headers,
            anonymous: dispatch.anonymous,
            scripts: self.scripts.clone(),
        }
    }

    async fn dispatch(&mut self, dispatch: Dispatch<'_>) -> DriverResult<PageResponse> {
        self.ensure_open()?;
        let started = Instant::now();
        let mut target = dispatch.url.clone();
        let mut method = dispatch.method.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let request = self.build_request(
                &Dispatch {
                    method: &method,
                    url: target.clone(),
                    fields: dispatch.fields.clone(),
                    body: dispatch.body.clone(),
                    headers: dispatch.headers,
                    anonymous: dispatch.anonymous,
                    timeout: dispatch.timeout,
                },
                &target,
            );
            self.shared.requests.lock().push(request.clone());

            let response = match self.shared.responder_for(&request.role, &request.path) {
                Some(responder) => responder(&request),
                None => ScriptedResponse::not_found(),
            };

            if let Some(delay) = response.delay {
                if tokio::time::timeout(dispatch.timeout, tokio::time::sleep(delay))
                    .await
                    .is_err()
                {
                    return Err(DriverError::Timeout {
                        url: request.url,
                        timeout: dispatch.timeout,
                    });
                }
            }

            if let Some(err) = response.error {
                return Err(err);
            }

            for observer in &self.observers {
                for message in &response.console {
                    observer.on_console(message.clone());
                }
                observer.on_network(NetworkExchange {
                    method: request.method.clone(),
                    url: request.url.clone(),
                    status: response.status,
                    content_type: response.headers.get("content-type").cloned(),
                    request_body: request.body.clone().or_else(|| {
                        (!request.fields.is_empty()).then(|| {
                            request
                                .fields
                                .iter()
                                .map(|(k, v)| format!("{}={}", k, v))
                                .collect::<Vec<_>>()
                                .join("&")
                        })
                    }),
                });
            }

            if let Some(location) = &response.redirect_to {
                target = super::resolve_url(&request.url, location);
                method = "GET".to_string();
                continue;
            }

            return Ok(PageResponse {
                status: response.status,
                url: request.url,
                headers: response.headers,
                body: response.body,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        Err(DriverError::Request {
            url: dispatch.url,
            reason: "too many redirects".to_string(),
        })
    }

    fn load(&mut self, response: &PageResponse) {
        self.current_url = Some(response.url.clone());
        self.html = response.body.clone();
        self.fills.clear();
    }
}

#[async_trait]
impl Page for ScriptedPage {
    fn subscribe(&mut self, observer: Arc<dyn PageObserver>) {
        self.observers.push(observer);
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }

    async fn goto(&mut self, url: &str, options: &NavigationOptions) -> DriverResult<PageResponse> {
        let response = self
            .dispatch(Dispatch {
                method: "GET",
                url: url.to_string(),
                fields: Vec::new(),
                body: None,
                headers: &options.extra_headers,
                anonymous: options.anonymous,
                timeout: options.timeout,
            })
            .await?;
        self.load(&response);
        Ok(response)
    }

    async fn content(&mut self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.html.clone())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> DriverResult<()> {
        self.ensure_open()?;
        ensure_selector(&self.html, selector)?;
        self.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> DriverResult<Option<PageResponse>> {
        self.ensure_open()?;
        let page_url = self
            .current_url
            .clone()
            .unwrap_or_else(|| self.shared.base_url.clone());
        let Some(submission) = resolve_click(&self.html, &page_url, selector, &self.fills)? else {
            return Ok(None);
        };

        let is_get = submission.method == "GET";
        let response = self
            .dispatch(Dispatch {
                method: &submission.method,
                url: if is_get { submission.get_url() } else { submission.url.clone() },
                fields: if is_get { Vec::new() } else { submission.fields.clone() },
                body: None,
                headers: &[],
                anonymous: false,
                timeout,
            })
            .await?;
        self.load(&response);
        Ok(Some(response))
    }

    async fn fetch(&mut self, request: &ApiRequest) -> DriverResult<PageResponse> {
        self.dispatch(Dispatch {
            method: &request.method,
            url: request.url.clone(),
            fields: Vec::new(),
            body: request.body.clone(),
            headers: &request.headers,
            anonymous: false,
            timeout: request.timeout,
        })
        .await
    }

    async fn evaluate(&mut self, script: &str) -> DriverResult<serde_json::Value> {
        self.ensure_open()?;
        self.scripts.push(script.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        self.ensure_open()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DriverError::Other(e.to_string()))?;
        }
        tokio::fs::write(path, self.html.as_bytes())
            .await
            .map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.shared.page_closed();
        }
        Ok(())
    }
}

impl Drop for ScriptedPage {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.page_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> Role {
        Role::new(name)
    }

    #[tokio::test]
    async fn test_role_specific_route_wins() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .page(None, "/admin", "<h1>Access denied</h1>")
            .page(Some("admin"), "/admin", "<h1>Admin</h1>");

        let session = driver.open_session(&role("admin")).await.unwrap();
        let mut page = session.new_page().await.unwrap();
        let resp = page.goto("/admin", &NavigationOptions::default()).await.unwrap();
        assert_eq!(resp.body, "<h1>Admin</h1>");

        let session = driver.open_session(&role("user")).await.unwrap();
        let mut page = session.new_page().await.unwrap();
        let resp = page.goto("/admin", &NavigationOptions::default()).await.unwrap();
        assert!(resp.body.contains("denied"));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .respond(None, "/settings", ScriptedResponse::redirect("/login"))
            .page(None, "/login", "<form></form>");

        let session = driver.open_session(&role("user")).await.unwrap();
        let mut page = session.new_page().await.unwrap();
        let resp = page.goto("/settings", &NavigationOptions::default()).await.unwrap();
        assert_eq!(resp.url, "https://app.test/login");
        assert_eq!(resp.status, 200);
        assert_eq!(page.current_url().as_deref(), Some("https://app.test/login"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_beyond_timeout_fails() {
        let driver = ScriptedDriver::new("https://app.test");
        driver.respond(
            None,
            "/slow",
            ScriptedResponse::ok("late").with_delay(Duration::from_secs(10)),
        );

        let session = driver.open_session(&role("user")).await.unwrap();
        let mut page = session.new_page().await.unwrap();
        let err = page
            .goto("/slow", &NavigationOptions::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_form_submission_reaches_responder() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .page(
                None,
                "/search",
                r#"<form action="/results" method="post"><input name="q"><button type="submit">Go</button></form>"#,
            )
            .route(None, "/results", |req| {
                ScriptedResponse::ok(format!("results for {}", req.param("q").unwrap_or_default()))
            });

        let session = driver.open_session(&role("user")).await.unwrap();
        let mut page = session.new_page().await.unwrap();
        page.goto("/search", &NavigationOptions::default()).await.unwrap();
        page.fill("[name=\"q\"]", "widgets").await.unwrap();
        let resp = page
            .click("button[type=\"submit\"]", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resp.body, "results for widgets");
        let last = driver.requests().pop().unwrap();
        assert_eq!(last.method, "POST");
        assert_eq!(last.fields.get("q").map(String::as_str), Some("widgets"));
    }

    #[tokio::test]
    async fn test_login_failure_and_page_accounting() {
        let driver = ScriptedDriver::new("https://app.test");
        driver.fail_login("locked");
        assert!(matches!(
            driver.open_session(&role("locked")).await,
            Err(DriverError::LoginFailed { .. })
        ));

        let session = driver.open_session(&role("user")).await.unwrap();
        let first = session.new_page().await.unwrap();
        let mut second = session.new_page().await.unwrap();
        assert_eq!(driver.open_pages(), 2);
        second.close().await.unwrap();
        drop(first);
        assert_eq!(driver.open_pages(), 0);
        assert_eq!(driver.peak_open_pages(), 2);

        session.close().await.unwrap();
        assert_eq!(driver.sessions_closed(), 1);
        assert!(session.new_page().await.is_err());
    }
}
