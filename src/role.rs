// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role definitions used to drive isolated browsing sessions.
//!
//! A role is loaded once from configuration and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Login credentials for automatic authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoginCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Login form URL (relative paths resolve against the base URL)
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default = "default_username_field")]
    pub username_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
    /// Pre-issued bearer token, used instead of a form login when present
    #[serde(default)]
    pub token: Option<String>,
}

fn default_username_field() -> String {
    "username".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

impl LoginCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            login_url: None,
            username_field: default_username_field(),
            password_field: default_password_field(),
            token: None,
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::new("", "")
        }
    }

    pub fn with_login_url(mut self, url: &str) -> Self {
        self.login_url = Some(url.to_string());
        self
    }
}

/// A named identity with declared permissions and seed paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Credential reference; `None` means an anonymous session
    #[serde(default)]
    pub credentials: Option<LoginCredentials>,
    /// Declared permissions, wildcardable (`"wms:*"`, `"*"`)
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Paths the role is expected to reach, in crawl order
    #[serde(default)]
    pub seed_paths: Vec<String>,
    /// Extra headers sent with every request of this role
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Role {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            credentials: None,
            permissions: BTreeSet::new(),
            seed_paths: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: LoginCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    pub fn with_seed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Check a permission against the declared, possibly wildcarded, set
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| permission_matches(granted, permission))
    }

    /// Entry page used when nothing else is known about the role
    pub fn entry_path(&self) -> &str {
        self.seed_paths.first().map(String::as_str).unwrap_or("/")
    }
}

/// `"wms:*"` grants `"wms:read"` and `"wms:orders:write"`, `"*"` grants everything
pub fn permission_matches(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }
    match granted.strip_suffix('*') {
        Some(prefix) => requested.starts_with(prefix),
        None => false,
    }
}
