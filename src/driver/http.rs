// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP-level driver built on reqwest.
//!
//! Each session owns its own cookie store, so roles never share state.
//! There is no script engine: forms are submitted by emulating what the
//! browser would send, and `evaluate` reports `Unsupported`.

use super::form::{ensure_selector, resolve_click};
use super::{
    resolve_url, ApiRequest, BrowserSession, Driver, NavigationOptions, NetworkExchange, Page,
    PageObserver, PageResponse,
};
use crate::errors::{DriverError, DriverResult};
use crate::role::{LoginCredentials, Role};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Maximum response body size (10MB) to prevent memory exhaustion
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Driver speaking plain HTTP with a per-role cookie jar
#[derive(Debug, Clone)]
pub struct HttpDriver {
    base_url: String,
    login_timeout: Duration,
    max_body_size: usize,
    accept_invalid_certs: bool,
}

impl HttpDriver {
    pub fn new(base_url: &str) -> Self {
        // Only for dev/testing against self-signed certificates
        let accept_invalid_certs = std::env::var("ACCEPT_INVALID_CERTS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);
        if accept_invalid_certs {
            warn!("[HttpDriver] Certificate validation is DISABLED (ACCEPT_INVALID_CERTS=true)");
        }

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_timeout: Duration::from_secs(30),
            max_body_size: MAX_BODY_SIZE,
            accept_invalid_certs,
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    fn build_client(&self, cookies: bool, headers: HeaderMap) -> DriverResult<Client> {
        Client::builder()
            .cookie_store(cookies)
            .default_headers(headers)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DriverError::Other(format!("Failed to create HTTP client: {}", e)))
    }

    fn role_headers(role: &Role) -> DriverResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &role.headers {
            insert_header(&mut headers, name, value)?;
        }
        if let Some(token) = role.credentials.as_ref().and_then(|c| c.token.as_ref()) {
            insert_header(&mut headers, "Authorization", &format!("Bearer {}", token))?;
        }
        Ok(headers)
    }

    /// Form login: load the login page, fill the credential fields, submit
    async fn login(&self, client: &Client, role: &Role, creds: &LoginCredentials) -> DriverResult<()> {
        let login_url = resolve_url(
            &self.base_url,
            creds.login_url.as_deref().unwrap_or("/login"),
        );
        info!("[HttpDriver] Logging in role '{}' via {}", role.name, login_url);

        let login_page = client
            .get(&login_url)
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&login_url, self.login_timeout, e))?;
        let page_url = login_page.url().to_string();
        let html = login_page.text().await.unwrap_or_default();

        let user_selector = format!("[name=\"{}\"]", creds.username_field);
        let pass_selector = format!("[name=\"{}\"]", creds.password_field);
        let fills = vec![
            (user_selector, creds.username.clone()),
            (pass_selector.clone(), creds.password.clone()),
        ];

        // Clicking the password input resolves to its enclosing form
        let submission = match resolve_click(&html, &page_url, &pass_selector, &fills) {
            Ok(Some(submission)) => submission,
            _ => {
                debug!("[HttpDriver] No login form found, posting credentials directly");
                super::form::Submission {
                    method: "POST".to_string(),
                    url: login_url.clone(),
                    fields: vec![
                        (creds.username_field.clone(), creds.username.clone()),
                        (creds.password_field.clone(), creds.password.clone()),
                    ],
                }
            }
        };

        let method = Method::from_bytes(submission.method.as_bytes()).unwrap_or(Method::POST);
        let request = if method == Method::GET {
            client.get(submission.get_url())
        } else {
            client.request(method, &submission.url).form(&submission.fields)
        };
        let response = request
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&submission.url, self.login_timeout, e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(DriverError::LoginFailed {
                role: role.name.clone(),
                reason: format!("login returned HTTP {}", status),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if ensure_selector(&body, &format!("input[type=\"password\"][name=\"{}\"]", creds.password_field)).is_ok() {
            return Err(DriverError::LoginFailed {
                role: role.name.clone(),
                reason: "login form shown again after submit".to_string(),
            });
        }

        info!("[HttpDriver] Role '{}' authenticated", role.name);
        Ok(())
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> DriverResult<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| DriverError::Other(format!("invalid header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| DriverError::Other(format!("invalid header value: {}", e)))?;
    headers.insert(name, value);
    Ok(())
}

fn map_reqwest_error(url: &str, timeout: Duration, err: reqwest::Error) -> DriverError {
    if err.is_timeout() {
        DriverError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        DriverError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Driver for HttpDriver {
    async fn open_session(&self, role: &Role) -> DriverResult<Arc<dyn BrowserSession>> {
        let client = self.build_client(true, Self::role_headers(role)?)?;
        let anonymous = self.build_client(false, HeaderMap::new())?;

        if let Some(creds) = &role.credentials {
            if creds.token.is_none() {
                self.login(&client, role, creds).await?;
            }
        }

        Ok(Arc::new(HttpSession {
            client,
            anonymous,
            base_url: self.base_url.clone(),
            max_body_size: self.max_body_size,
            closed: AtomicBool::new(false),
        }))
    }
}

struct HttpSession {
    client: Client,
    anonymous: Client,
    base_url: String,
    max_body_size: usize,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::SessionClosed);
        }
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            anonymous: self.anonymous.clone(),
            base_url: self.base_url.clone(),
            max_body_size: self.max_body_size,
            current_url: None,
            html: String::new(),
            fills: Vec::new(),
            observers: Vec::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Raw(String),
}

struct HttpPage {
    client: Client,
    anonymous: Client,
    base_url: String,
    max_body_size: usize,
    current_url: Option<String>,
    html: String,
    fills: Vec<(String, String)>,
    observers: Vec<Arc<dyn PageObserver>>,
    closed: bool,
}

impl HttpPage {
    async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: RequestBody,
        anonymous: bool,
        timeout: Duration,
    ) -> DriverResult<PageResponse> {
        if self.closed {
            return Err(DriverError::SessionClosed);
        }

        let url = resolve_url(&self.base_url, url);
        let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            DriverError::Request {
                url: url.clone(),
                reason: format!("invalid method {}", method),
            }
        })?;
        let client = if anonymous { &self.anonymous } else { &self.client };

        let mut builder = client.request(method.clone(), &url).timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request_body = match body {
            RequestBody::Empty => None,
            RequestBody::Form(fields) => {
                let encoded = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&");
                builder = builder.form(&fields);
                Some(encoded)
            }
            RequestBody::Raw(raw) => {
                builder = builder.body(raw.clone());
                Some(raw)
            }
        };

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, timeout, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&url, timeout, e))?;
        let body = if bytes.len() > self.max_body_size {
            debug!("[HttpDriver] Truncating {} byte body from {}", bytes.len(), url);
            String::from_utf8_lossy(&bytes[..self.max_body_size]).to_string()
        } else {
            String::from_utf8_lossy(&bytes).to_string()
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let exchange = NetworkExchange {
            method: method.to_string(),
            url: final_url.clone(),
            status,
            content_type: response_headers.get("content-type").cloned(),
            request_body,
        };
        for observer in &self.observers {
            observer.on_network(exchange.clone());
        }

        Ok(PageResponse {
            status,
            url: final_url,
            headers: response_headers,
            body,
            duration_ms,
        })
    }

    fn load(&mut self, response: &PageResponse) {
        self.current_url = Some(response.url.clone());
        self.html = response.body.clone();
        self.fills.clear();
    }
}

#[async_trait]
impl Page for HttpPage {
    fn subscribe(&mut self, observer: Arc<dyn PageObserver>) {
        self.observers.push(observer);
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }

    async fn goto(&mut self, url: &str, options: &NavigationOptions) -> DriverResult<PageResponse> {
        let response = self
            .send(
                "GET",
                url,
                &options.extra_headers,
                RequestBody::Empty,
                options.anonymous,
                options.timeout,
            )
            .await?;
        self.load(&response);
        Ok(response)
    }

    async fn content(&mut self) -> DriverResult<String> {
        Ok(self.html.clone())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> DriverResult<()> {
        ensure_selector(&self.html, selector)?;
        self.fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> DriverResult<Option<PageResponse>> {
        let page_url = self
            .current_url
            .clone()
            .unwrap_or_else(|| self.base_url.clone());
        let Some(submission) = resolve_click(&self.html, &page_url, selector, &self.fills)? else {
            return Ok(None);
        };

        let response = if submission.method == "GET" {
            self.send("GET", &submission.get_url(), &[], RequestBody::Empty, false, timeout)
                .await?
        } else {
            self.send(
                &submission.method,
                &submission.url,
                &[],
                RequestBody::Form(submission.fields.clone()),
                false,
                timeout,
            )
            .await?
        };
        self.load(&response);
        Ok(Some(response))
    }

    async fn fetch(&mut self, request: &ApiRequest) -> DriverResult<PageResponse> {
        let body = match &request.body {
            Some(raw) => RequestBody::Raw(raw.clone()),
            None => RequestBody::Empty,
        };
        self.send(
            &request.method,
            &request.url,
            &request.headers,
            body,
            false,
            request.timeout,
        )
        .await
    }

    async fn evaluate(&mut self, _script: &str) -> DriverResult<serde_json::Value> {
        Err(DriverError::Unsupported(
            "script evaluation requires a browser driver".to_string(),
        ))
    }

    /// Writes an HTML snapshot of the current document
    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
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
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_headers_include_bearer_token() {
        let role = Role::new("api_user")
            .with_credentials(LoginCredentials::bearer("abc123"))
            .with_header("X-Client", "lonkero");
        let headers = HttpDriver::role_headers(&role).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc123");
        assert_eq!(headers.get("x-client").unwrap(), "lonkero");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let role = Role::new("bad").with_header("X-Bad", "line\nbreak");
        assert!(HttpDriver::role_headers(&role).is_err());
    }

    #[test]
    fn test_base_url_normalized() {
        let driver = HttpDriver::new("https://app.test/");
        assert_eq!(driver.base_url, "https://app.test");
    }
}
