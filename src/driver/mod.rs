// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Browser-automation driver capability.
//!
//! The assessment engine never talks to a browser directly. It consumes these
//! traits: open an isolated session per role, open pages in it, navigate,
//! fill and submit, query the rendered DOM and observe console / network
//! traffic. `HttpDriver` implements them over reqwest, `ScriptedDriver`
//! implements them in memory for tests.

pub mod form;
pub mod http;
pub mod scripted;

pub use http::HttpDriver;
pub use scripted::{ScriptedDriver, ScriptedResponse};

use crate::errors::DriverResult;
use crate::role::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    DomContentLoaded,
    #[default]
    Load,
    NetworkIdle,
}

/// Per-navigation options
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOptions {
    pub timeout: Duration,
    pub wait_until: WaitCondition,
    pub extra_headers: Vec<(String, String)>,
    /// Send the request without the session's cookies and credentials
    pub anonymous: bool,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_until: WaitCondition::Load,
            extra_headers: Vec::new(),
            anonymous: false,
        }
    }
}

impl NavigationOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn wait_until(mut self, condition: WaitCondition) -> Self {
        self.wait_until = condition;
        self
    }
}

/// Response observed for a navigation, submit or fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    /// URL after redirects
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

impl PageResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Non-navigation request issued from a page context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(url: &str, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn with_json_body(mut self, method: &str, body: String) -> Self {
        self.method = method.to_uppercase();
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        self.body = Some(body);
        self
    }
}

/// Console message emitted by a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleMessage {
    /// `log`, `warning`, `error`, `pageerror` ...
    pub level: String,
    pub text: String,
}

/// One observed request/response pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkExchange {
    pub method: String,
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub request_body: Option<String>,
}

impl NetworkExchange {
    pub fn summary(&self) -> String {
        format!("{} {} -> {}", self.method, self.url, self.status)
    }
}

/// Hook registered on a page for console and network events
pub trait PageObserver: Send + Sync {
    fn on_console(&self, message: ConsoleMessage);
    fn on_network(&self, exchange: NetworkExchange);
}

/// Opens one isolated session per role
#[async_trait]
pub trait Driver: Send + Sync {
    async fn open_session(&self, role: &Role) -> DriverResult<Arc<dyn BrowserSession>>;
}

/// Isolated browsing context (cookie jar, storage) belonging to one role
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>>;
    async fn close(&self) -> DriverResult<()>;
}

/// A single tab inside a session
#[async_trait]
pub trait Page: Send {
    /// Register a console / network observer
    fn subscribe(&mut self, observer: Arc<dyn PageObserver>);

    /// URL of the currently loaded document
    fn current_url(&self) -> Option<String>;

    async fn goto(&mut self, url: &str, options: &NavigationOptions) -> DriverResult<PageResponse>;

    /// Serialized DOM of the current document
    async fn content(&mut self) -> DriverResult<String>;

    async fn fill(&mut self, selector: &str, value: &str) -> DriverResult<()>;

    /// Click an element; returns the response when the click navigates
    async fn click(&mut self, selector: &str, timeout: Duration) -> DriverResult<Option<PageResponse>>;

    async fn fetch(&mut self, request: &ApiRequest) -> DriverResult<PageResponse>;

    async fn evaluate(&mut self, script: &str) -> DriverResult<serde_json::Value>;

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Resolve a path or absolute URL against a base URL
pub fn resolve_url(base_url: &str, target: &str) -> String {
    match url::Url::parse(base_url).and_then(|base| base.join(target)) {
        Ok(joined) => joined.to_string(),
        Err(_) => format!("{}{}", base_url.trim_end_matches('/'), target),
    }
}

/// Path plus query of a URL, used as the canonical key for a probed page
pub fn url_path(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        },
        Err(_) => raw.to_string(),
    }
}
