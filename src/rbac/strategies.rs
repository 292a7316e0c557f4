// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Pluggable escalation methods and isolation-bypass techniques.
//!
//! Configuration names methods by string (`parameter_tampering`,
//! `header_injection`, ...). The registry maps those names to
//! implementations; callers can register their own under new names. Every
//! built-in drives the real page and reports what the application did.

use super::model::{BoundaryType, EscalationPath, IsolationBoundary};
use super::probe::{AccessProber, ContentSignals, ProbeOutcome};
use crate::driver::NavigationOptions;
use crate::session_pool::PageLease;
use crate::types::AccessOutcome;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One escalation attempt from `path.from_role` towards `target`
pub struct EscalationAttempt<'a> {
    pub prober: &'a AccessProber,
    pub path: &'a EscalationPath,
    /// Page that proves `to_role` capabilities
    pub target: &'a str,
    pub signals: &'a ContentSignals,
    /// Per-navigation timeout
    pub timeout: Duration,
}

impl EscalationAttempt<'_> {
    pub fn options(&self) -> NavigationOptions {
        NavigationOptions::with_timeout(self.timeout)
    }
}

#[async_trait]
pub trait EscalationMethod: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome;
}

/// One bypass attempt against an isolation boundary
pub struct IsolationAttempt<'a> {
    pub prober: &'a AccessProber,
    pub boundary: &'a IsolationBoundary,
    pub path: &'a str,
    /// Foreign identifier (tenant, user, module) pushed at the boundary
    pub bypass: &'a str,
    pub signals: &'a ContentSignals,
    pub timeout: Duration,
}

impl IsolationAttempt<'_> {
    pub fn options(&self) -> NavigationOptions {
        NavigationOptions::with_timeout(self.timeout)
    }
}

#[async_trait]
pub trait IsolationTechnique: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, page: &mut PageLease, attempt: &IsolationAttempt<'_>) -> ProbeOutcome;
}

fn with_query(path: &str, name: &str, value: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        path,
        separator,
        name,
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
    )
}

/// Replace `{placeholder}` segments with `value`
pub fn substitute_placeholders(path: &str, value: &str) -> Option<String> {
    if !path.contains('{') {
        return None;
    }
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Swap the last identifier-looking segment for `value`, or append it
pub fn substitute_identifier(path: &str, value: &str) -> String {
    if let Some(substituted) = substitute_placeholders(path, value) {
        return substituted;
    }
    let (base, query) = match path.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (path, None),
    };
    let mut segments: Vec<&str> = base.split('/').collect();
    let id_position = segments.iter().rposition(|s| {
        !s.is_empty()
            && (s.chars().all(|c| c.is_ascii_digit())
                || (s.len() >= 32 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')))
    });
    let swapped = match id_position {
        Some(i) => {
            segments[i] = value;
            segments.join("/")
        }
        None => format!("{}/{}", base.trim_end_matches('/'), value),
    };
    match query {
        Some(q) => format!("{}?{}", swapped, q),
        None => swapped,
    }
}

// ============================================================================
// Escalation methods
// ============================================================================

/// Open the privileged page directly (forced browsing)
pub struct DirectNavigation;

#[async_trait]
impl EscalationMethod for DirectNavigation {
    fn name(&self) -> &str {
        "direct_navigation"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        attempt
            .prober
            .navigate(page, attempt.target, attempt.options(), attempt.signals)
            .await
    }
}

/// Client-controlled role parameters on the privileged page
pub struct ParameterTampering;

impl ParameterTampering {
    fn parameters(to_role: &str) -> Vec<(&'static str, String)> {
        vec![
            ("role", to_role.to_string()),
            ("role", "admin".to_string()),
            ("user_role", to_role.to_string()),
            ("is_admin", "true".to_string()),
            ("isAdmin", "true".to_string()),
            ("access_level", "admin".to_string()),
        ]
    }
}

#[async_trait]
impl EscalationMethod for ParameterTampering {
    fn name(&self) -> &str {
        "parameter_tampering"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        let mut outcomes = Vec::new();
        for (name, value) in Self::parameters(&attempt.path.to_role) {
            let target = with_query(attempt.target, name, &value);
            let outcome = attempt
                .prober
                .navigate(page, &target, attempt.options(), attempt.signals)
                .await;
            let allowed = outcome.allowed();
            outcomes.push(outcome);
            if allowed {
                break;
            }
        }
        ProbeOutcome::strongest(outcomes).unwrap_or_else(|| ProbeOutcome::error("no parameters tried"))
    }
}

/// Role headers and front-proxy routing headers
pub struct HeaderInjection;

#[async_trait]
impl EscalationMethod for HeaderInjection {
    fn name(&self) -> &str {
        "header_injection"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        let to_role = attempt.path.to_role.as_str();
        let role_headers = attempt.options()
            .header("X-Role", to_role)
            .header("X-User-Role", to_role)
            .header("X-Forwarded-Role", to_role);
        let direct = attempt
            .prober
            .navigate(page, attempt.target, role_headers, attempt.signals)
            .await;
        if direct.allowed() || attempt.path.success_markers.is_empty() {
            return direct;
        }

        // Routing headers land on "/", so only the privileged content proves access
        let routed = attempt
            .prober
            .navigate(
                page,
                "/",
                attempt.options()
                    .header("X-Original-URL", attempt.target)
                    .header("X-Rewrite-URL", attempt.target),
                &ContentSignals::strict(&attempt.path.success_markers),
            )
            .await;
        ProbeOutcome::strongest(vec![direct, routed]).unwrap_or_else(|| ProbeOutcome::error("no attempt made"))
    }
}

/// Rewrite client-side role state, then reload the privileged page
pub struct StorageManipulation;

impl StorageManipulation {
    fn script(to_role: &str) -> String {
        let role = serde_json::Value::String(to_role.to_string()).to_string();
        format!(
            "localStorage.setItem('role', {role}); \
             localStorage.setItem('userRole', {role}); \
             sessionStorage.setItem('role', {role}); \
             document.cookie = 'role=' + {role} + '; path=/';",
            role = role
        )
    }
}

#[async_trait]
impl EscalationMethod for StorageManipulation {
    fn name(&self) -> &str {
        "storage_manipulation"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        let landing = attempt
            .prober
            .navigate(page, "/", attempt.options(), &ContentSignals::none())
            .await;
        if landing.actual == AccessOutcome::Error {
            return landing;
        }
        if let Err(e) = page.evaluate(&Self::script(&attempt.path.to_role)).await {
            return ProbeOutcome::error(format!("storage manipulation not possible: {}", e));
        }
        attempt
            .prober
            .navigate(page, attempt.target, attempt.options(), attempt.signals)
            .await
    }
}

/// Submit role fields to the privileged endpoint, then check the page
pub struct MassAssignment;

#[async_trait]
impl EscalationMethod for MassAssignment {
    fn name(&self) -> &str {
        "mass_assignment"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        let to_role = attempt.path.to_role.as_str();
        let body = serde_json::json!({
            "role": to_role,
            "roles": [to_role],
            "is_admin": true,
            "isAdmin": true,
        })
        .to_string();
        let request = attempt
            .prober
            .api_request("POST", attempt.target)
            .with_json_body("POST", body);
        let submitted = attempt
            .prober
            .request(page, attempt.target, request, &ContentSignals::none())
            .await;

        let after = attempt
            .prober
            .navigate(page, attempt.target, attempt.options(), attempt.signals)
            .await;
        if after.actual == AccessOutcome::Error {
            return submitted;
        }
        after
    }
}

/// Path normalisation tricks on the privileged URL
pub struct PathManipulation;

impl PathManipulation {
    pub fn variants(target: &str) -> Vec<String> {
        let trimmed = target.trim_start_matches('/');
        let mut variants = vec![
            format!("/{}/", trimmed.trim_end_matches('/')),
            format!("//{}", trimmed),
            format!("/./{}", trimmed),
            format!("/{};/", trimmed.trim_end_matches('/')),
            format!("/{}", trimmed.to_uppercase()),
        ];
        if let Some(first) = trimmed.chars().next() {
            variants.push(format!(
                "/%{:02X}{}",
                first as u32,
                &trimmed[first.len_utf8()..]
            ));
        }
        variants.retain(|v| v != target);
        variants.dedup();
        variants
    }
}

#[async_trait]
impl EscalationMethod for PathManipulation {
    fn name(&self) -> &str {
        "path_manipulation"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &EscalationAttempt<'_>) -> ProbeOutcome {
        let mut outcomes = Vec::new();
        for variant in Self::variants(attempt.target) {
            let outcome = attempt
                .prober
                .navigate(page, &variant, attempt.options(), attempt.signals)
                .await;
            let allowed = outcome.allowed();
            outcomes.push(outcome);
            if allowed {
                break;
            }
        }
        ProbeOutcome::strongest(outcomes).unwrap_or_else(|| ProbeOutcome::error("no path variants"))
    }
}

// ============================================================================
// Isolation techniques
// ============================================================================

fn scope_parameters(boundary_type: BoundaryType) -> &'static [&'static str] {
    match boundary_type {
        BoundaryType::Tenant => &["tenant_id", "tenantId", "org_id", "organization"],
        BoundaryType::Data => &["user_id", "owner_id", "account_id", "id"],
        BoundaryType::Role => &["role", "as_role"],
        BoundaryType::Module => &["module", "feature"],
    }
}

fn scope_headers(boundary_type: BoundaryType) -> &'static [&'static str] {
    match boundary_type {
        BoundaryType::Tenant => &["X-Tenant-ID", "X-Organization-ID"],
        BoundaryType::Data => &["X-User-ID", "X-Account-ID"],
        BoundaryType::Role => &["X-Role"],
        BoundaryType::Module => &["X-Module"],
    }
}

/// Open the protected page, placeholders filled with the foreign identifier
pub struct DirectAccess;

#[async_trait]
impl IsolationTechnique for DirectAccess {
    fn name(&self) -> &str {
        "direct_access"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &IsolationAttempt<'_>) -> ProbeOutcome {
        let path = substitute_placeholders(attempt.path, attempt.bypass)
            .unwrap_or_else(|| attempt.path.to_string());
        attempt.prober.navigate(page, &path, attempt.options(), attempt.signals).await
    }
}

/// Scope parameters pointing at the foreign identifier
pub struct ParameterInjection;

#[async_trait]
impl IsolationTechnique for ParameterInjection {
    fn name(&self) -> &str {
        "parameter_injection"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &IsolationAttempt<'_>) -> ProbeOutcome {
        let base = substitute_placeholders(attempt.path, attempt.bypass)
            .unwrap_or_else(|| attempt.path.to_string());
        let mut outcomes = Vec::new();
        for param in scope_parameters(attempt.boundary.boundary_type) {
            let target = with_query(&base, param, attempt.bypass);
            let outcome = attempt.prober.navigate(page, &target, attempt.options(), attempt.signals).await;
            let allowed = outcome.allowed();
            outcomes.push(outcome);
            if allowed {
                break;
            }
        }
        ProbeOutcome::strongest(outcomes).unwrap_or_else(|| ProbeOutcome::error("no parameters tried"))
    }
}

/// Scope headers pointing at the foreign identifier
pub struct ScopeHeaderInjection;

#[async_trait]
impl IsolationTechnique for ScopeHeaderInjection {
    fn name(&self) -> &str {
        "header_injection"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &IsolationAttempt<'_>) -> ProbeOutcome {
        let path = substitute_placeholders(attempt.path, attempt.bypass)
            .unwrap_or_else(|| attempt.path.to_string());
        let mut opts = attempt.options();
        for header in scope_headers(attempt.boundary.boundary_type) {
            opts = opts.header(header, attempt.bypass);
        }
        attempt.prober.navigate(page, &path, opts, attempt.signals).await
    }
}

/// Swap the resource identifier in the path (IDOR-style)
pub struct IdSubstitution;

#[async_trait]
impl IsolationTechnique for IdSubstitution {
    fn name(&self) -> &str {
        "id_substitution"
    }

    async fn attempt(&self, page: &mut PageLease, attempt: &IsolationAttempt<'_>) -> ProbeOutcome {
        let path = substitute_identifier(attempt.path, attempt.bypass);
        attempt.prober.navigate(page, &path, attempt.options(), attempt.signals).await
    }
}

// ============================================================================
// Registry
// ============================================================================

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Name -> implementation lookup for both strategy kinds
#[derive(Clone)]
pub struct StrategyRegistry {
    escalation: BTreeMap<String, Arc<dyn EscalationMethod>>,
    isolation: BTreeMap<String, Arc<dyn IsolationTechnique>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            escalation: BTreeMap::new(),
            isolation: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register_escalation(Arc::new(DirectNavigation))
            .register_escalation(Arc::new(ParameterTampering))
            .register_escalation(Arc::new(HeaderInjection))
            .register_escalation(Arc::new(StorageManipulation))
            .register_escalation(Arc::new(MassAssignment))
            .register_escalation(Arc::new(PathManipulation))
            .register_isolation(Arc::new(DirectAccess))
            .register_isolation(Arc::new(ParameterInjection))
            .register_isolation(Arc::new(ScopeHeaderInjection))
            .register_isolation(Arc::new(IdSubstitution));
        registry
    }

    pub fn register_escalation(&mut self, method: Arc<dyn EscalationMethod>) -> &mut Self {
        self.escalation.insert(normalize(method.name()), method);
        self
    }

    pub fn register_isolation(&mut self, technique: Arc<dyn IsolationTechnique>) -> &mut Self {
        self.isolation.insert(normalize(technique.name()), technique);
        self
    }

    pub fn escalation(&self, name: &str) -> Option<Arc<dyn EscalationMethod>> {
        self.escalation.get(&normalize(name)).cloned()
    }

    pub fn isolation(&self, name: &str) -> Option<Arc<dyn IsolationTechnique>> {
        self.isolation.get(&normalize(name)).cloned()
    }

    pub fn escalation_names(&self) -> Vec<String> {
        self.escalation.keys().cloned().collect()
    }

    pub fn isolation_names(&self) -> Vec<String> {
        self.isolation.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_normalizes_names() {
        let registry = StrategyRegistry::with_builtins();
        assert!(registry.escalation("Parameter-Tampering").is_some());
        assert!(registry.escalation("header injection").is_some());
        assert!(registry.isolation("id_substitution").is_some());
        assert!(registry.escalation("quantum_tunnelling").is_none());
        assert_eq!(registry.escalation_names().len(), 6);
        assert_eq!(registry.isolation_names().len(), 4);
    }

    #[test]
    fn test_placeholder_substitution() {
        assert_eq!(
            substitute_placeholders("/tenants/{tenant}/orders", "t-999").as_deref(),
            Some("/tenants/t-999/orders")
        );
        assert_eq!(substitute_placeholders("/orders", "x"), None);
    }

    #[test]
    fn test_identifier_substitution() {
        assert_eq!(substitute_identifier("/orders/42", "43"), "/orders/43");
        assert_eq!(substitute_identifier("/orders/42/items?page=2", "7"), "/orders/7/items?page=2");
        assert_eq!(substitute_identifier("/orders", "t-2"), "/orders/t-2");
        assert_eq!(substitute_identifier("/t/{tenant}", "t-2"), "/t/t-2");
    }

    #[test]
    fn test_query_encoding() {
        assert_eq!(with_query("/admin", "role", "tenant admin"), "/admin?role=tenant+admin");
        assert_eq!(with_query("/admin?x=1", "is_admin", "true"), "/admin?x=1&is_admin=true");
    }

    #[test]
    fn test_path_variants() {
        let variants = PathManipulation::variants("/admin");
        assert!(variants.contains(&"/admin/".to_string()));
        assert!(variants.contains(&"//admin".to_string()));
        assert!(variants.contains(&"/ADMIN".to_string()));
        assert!(variants.contains(&"/%61dmin".to_string()));
        assert!(!variants.contains(&"/admin".to_string()));
    }

    #[test]
    fn test_storage_script_quotes_role() {
        let script = StorageManipulation::script("tenant'admin");
        assert!(script.contains("\"tenant'admin\""));
    }
}
