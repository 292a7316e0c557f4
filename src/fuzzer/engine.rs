// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Payload Fuzzer
 * Injects categorized payloads into the forms and API endpoints a role can
 * reach and classifies what comes back
 *
 * A failing fill or submit only costs the payload under test; the campaign
 * carries on with the next one.
 */

use super::detection::{DetectionEngine, DetectionInput, DetectionMatch, Verdict};
use super::payloads::{PayloadCategory, PayloadSet};
use super::surface::{enumerate_api_endpoints, extract_forms, ApiEndpoint, DiscoveredForm, FormInput, FILLER_VALUE};
use crate::config::AppConfig;
use crate::crawler::PathDiscovery;
use crate::driver::{resolve_url, ApiRequest, NavigationOptions, PageResponse};
use crate::errors::{AccessError, AccessResult, DriverError};
use crate::events::{EventLedger, LedgerMarker};
use crate::session_pool::{PageLease, SessionPool};
use crate::str_utils::excerpt;
use crate::types::{Evidence, FindingType, RiskLevel, Vulnerability};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SNIPPET_LEN: usize = 300;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    Form,
    Api,
}

/// One payload execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityTestResult {
    pub id: String,
    pub url: String,
    pub role: String,
    pub surface: SurfaceKind,
    pub fields: Vec<String>,
    pub payload: String,
    pub payload_set: String,
    pub category: PayloadCategory,
    pub vulnerable: bool,
    /// A signal fired below the detection threshold
    pub ambiguous: bool,
    pub matched: Option<DetectionMatch>,
    pub risk_level: Option<RiskLevel>,
    pub evidence: Evidence,
    pub response_time_ms: u64,
}

/// Counters of one fuzz campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FuzzStatistics {
    pub pages_scanned: usize,
    pub forms_discovered: usize,
    pub api_endpoints: usize,
    pub tests_executed: usize,
    /// Payload tests aborted by a fill, submit or request failure
    pub failed_tests: usize,
    pub vulnerable: usize,
    pub ambiguous: usize,
}

/// Everything one role's fuzz campaign produced
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FuzzReport {
    pub role: String,
    pub forms: Vec<DiscoveredForm>,
    pub api_endpoints: Vec<ApiEndpoint>,
    pub results: Vec<SecurityTestResult>,
    pub statistics: FuzzStatistics,
}

impl FuzzReport {
    pub fn vulnerable_results(&self) -> impl Iterator<Item = &SecurityTestResult> {
        self.results.iter().filter(|r| r.vulnerable)
    }

    /// Confirmed injections as findings, one per role, url and field
    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        let mut seen = BTreeSet::new();
        self.vulnerable_results()
            .filter_map(|r| {
                let m = r.matched.as_ref()?;
                let resource = format!("{} [{}]", r.url, r.fields.join(","));
                if !seen.insert((resource.clone(), m.category)) {
                    return None;
                }
                Some(
                    Vulnerability::new(
                        FindingType::Injection,
                        m.risk_level,
                        &r.role,
                        &resource,
                        format!(
                            "{} payload {:?} triggered rule '{}' on {}",
                            m.category, r.payload, m.rule, r.url
                        ),
                        r.evidence.clone(),
                    )
                    .with_category(&format!("Injection ({})", m.category)),
                )
            })
            .collect()
    }
}

/// What was observed after one injection
struct Observation {
    url: String,
    body: String,
    dom: String,
    elapsed_ms: u64,
    status: Option<u16>,
}

/// One payload aimed at one surface
struct Injection<'a> {
    set: &'a PayloadSet,
    payload: &'a str,
    fields: Vec<String>,
    surface: SurfaceKind,
}

pub struct FuzzerEngine {
    pool: Arc<SessionPool>,
    ledger: Arc<EventLedger>,
    detection: DetectionEngine,
    payload_sets: Vec<PayloadSet>,
    base_url: String,
    max_payloads_per_field: usize,
    api_fuzzing: bool,
    max_api_endpoints: usize,
    network_window: usize,
    network_timeout: Duration,
    screenshot_dir: PathBuf,
}

impl FuzzerEngine {
    pub fn new(pool: Arc<SessionPool>, config: &AppConfig) -> Self {
        let fuzzer = &config.fuzzer;
        Self {
            ledger: pool.ledger(),
            pool,
            detection: DetectionEngine::new(fuzzer.vulnerability_rules.clone(), fuzzer.detection_threshold),
            payload_sets: fuzzer.payload_sets.clone(),
            base_url: config.target.base_url.clone(),
            max_payloads_per_field: fuzzer.max_payloads_per_field,
            api_fuzzing: fuzzer.api_fuzzing,
            max_api_endpoints: fuzzer.max_api_endpoints,
            network_window: fuzzer.evidence_network_window,
            network_timeout: config.resources.network_timeout(),
            screenshot_dir: config.output.screenshot_dir.clone(),
        }
    }

    pub fn detection(&self) -> &DetectionEngine {
        &self.detection
    }

    /// Fuzz every form on the role's accessible pages, then the API endpoints seen in traffic
    pub async fn fuzz_role(&self, role: &str, discovery: Option<&PathDiscovery>) -> AccessResult<FuzzReport> {
        let started = Instant::now();
        // traffic from earlier stages carries forged requests, not the app's own surface
        let surface_marker = self.ledger.mark();
        let paths: Vec<String> = match discovery.map(|d| d.accessible_paths()) {
            Some(paths) if !paths.is_empty() => paths,
            _ => {
                let entry = self
                    .pool
                    .role(role)
                    .map(|r| r.entry_path().to_string())
                    .unwrap_or_else(|| "/".to_string());
                vec![entry]
            }
        };
        info!("[Fuzzer] Fuzzing {} pages for role {}", paths.len(), role);

        let mut page = self.pool.acquire(role).await?;
        let mut report = FuzzReport {
            role: role.to_string(),
            ..FuzzReport::default()
        };

        let forms = self.discover_forms(&mut page, &paths, &mut report.statistics).await;
        report.statistics.forms_discovered = forms.len();

        // endpoints come from the form discovery traffic, before injection starts
        let endpoints: Vec<ApiEndpoint> = if self.api_fuzzing {
            let traffic = self.ledger.network_since(surface_marker, role);
            enumerate_api_endpoints(&traffic, &self.base_url)
                .into_iter()
                .take(self.max_api_endpoints)
                .collect()
        } else {
            Vec::new()
        };
        report.statistics.api_endpoints = endpoints.len();

        for form in &forms {
            let baseline = self.load(&mut page, &form.page_path).await.ok().map(|r| r.body);
            for input in form.injectable_inputs() {
                for set in &self.payload_sets {
                    for payload in set.take(self.max_payloads_per_field) {
                        let injection = Injection {
                            set,
                            payload,
                            fields: vec![input.name.clone()],
                            surface: SurfaceKind::Form,
                        };
                        let marker = self.ledger.mark();
                        let observed = self.submit_form(&mut page, form, input, payload).await;
                        self.record(&mut page, &mut report, injection, marker, baseline.as_deref(), observed)
                            .await;
                    }
                }
            }
        }

        if self.api_fuzzing {
            for endpoint in &endpoints {
                self.fuzz_endpoint(&mut page, endpoint, &mut report).await;
            }
        }
        report.api_endpoints = endpoints;

        if let Err(e) = page.close().await {
            debug!("[Fuzzer] Page close failed: {}", e);
        }

        report.forms = forms;
        info!(
            "[Fuzzer] Role {}: {} tests, {} vulnerable, {} failed in {}ms",
            role,
            report.statistics.tests_executed,
            report.statistics.vulnerable,
            report.statistics.failed_tests,
            started.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Fuzz several roles, as many at once as the pool has sessions, keyed by role name
    pub async fn fuzz_roles(
        &self,
        roles: &[String],
        discoveries: &BTreeMap<String, PathDiscovery>,
    ) -> AccessResult<BTreeMap<String, FuzzReport>> {
        let mut out = BTreeMap::new();
        for batch in roles.chunks(self.pool.role_parallelism(roles.len())) {
            let reports = join_all(
                batch
                    .iter()
                    .map(|role| self.fuzz_role(role, discoveries.get(role))),
            )
            .await;

            for (role, report) in batch.iter().zip(reports) {
                match report {
                    Ok(report) => {
                        out.insert(role.clone(), report);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("[Fuzzer] Role {} skipped: {}", role, e),
                }
            }
        }
        Ok(out)
    }

    async fn load(&self, page: &mut PageLease, path: &str) -> AccessResult<PageResponse> {
        let url = resolve_url(&self.base_url, path);
        page.goto(&url, &NavigationOptions::with_timeout(self.network_timeout))
            .await
            .map_err(|e| AccessError::from_driver(&url, e))
    }

    async fn discover_forms(
        &self,
        page: &mut PageLease,
        paths: &[String],
        statistics: &mut FuzzStatistics,
    ) -> Vec<DiscoveredForm> {
        let mut signatures = BTreeSet::new();
        let mut forms = Vec::new();
        for path in paths {
            match self.load(page, path).await {
                Ok(response) => {
                    statistics.pages_scanned += 1;
                    for form in extract_forms(&response.body, &response.url) {
                        if signatures.insert(form.signature()) {
                            forms.push(form);
                        }
                    }
                }
                Err(e) => debug!("[Fuzzer] Skipping {}: {}", path, e),
            }
        }
        forms
    }

    async fn submit_form(
        &self,
        page: &mut PageLease,
        form: &DiscoveredForm,
        target: &FormInput,
        payload: &str,
    ) -> Result<Observation, DriverError> {
        let started = Instant::now();
        let url = resolve_url(&self.base_url, &form.page_path);
        page.goto(&url, &NavigationOptions::with_timeout(self.network_timeout))
            .await?;

        page.fill(&target.selector, payload).await?;
        for other in form.injectable_inputs().filter(|i| i.name != target.name) {
            if other.required && other.value.as_deref().unwrap_or("").is_empty() {
                page.fill(&other.selector, FILLER_VALUE).await?;
            }
        }

        let response = page.click(&form.submit_selector, self.network_timeout).await?;
        let dom = page.content().await?;
        let (url, body, status) = match response {
            Some(r) => (r.url, r.body, Some(r.status)),
            None => (form.action.clone(), dom.clone(), None),
        };
        Ok(Observation {
            url,
            body,
            dom,
            elapsed_ms: started.elapsed().as_millis() as u64,
            status,
        })
    }

    async fn fuzz_endpoint(&self, page: &mut PageLease, endpoint: &ApiEndpoint, report: &mut FuzzReport) {
        let parameters: Vec<String> = if endpoint.parameters.is_empty() {
            vec!["q".to_string()]
        } else {
            endpoint.parameters.clone()
        };

        let baseline_request = api_request(endpoint, &parameters, None, "1", self.network_timeout);
        let baseline = page.fetch(&baseline_request).await.ok().map(|r| r.body);

        for parameter in &parameters {
            for set in &self.payload_sets {
                for payload in set.take(self.max_payloads_per_field) {
                    let injection = Injection {
                        set,
                        payload,
                        fields: vec![parameter.clone()],
                        surface: SurfaceKind::Api,
                    };
                    let marker = self.ledger.mark();
                    let request = api_request(endpoint, &parameters, Some(parameter), payload, self.network_timeout);
                    let started = Instant::now();
                    let observed = page.fetch(&request).await.map(|r| Observation {
                        url: endpoint.url.clone(),
                        dom: String::new(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        status: Some(r.status),
                        body: r.body,
                    });
                    self.record(page, report, injection, marker, baseline.as_deref(), observed)
                        .await;
                }
            }
        }
    }

    async fn record(
        &self,
        page: &mut PageLease,
        report: &mut FuzzReport,
        injection: Injection<'_>,
        marker: LedgerMarker,
        baseline: Option<&str>,
        observed: Result<Observation, DriverError>,
    ) {
        let role = report.role.clone();
        let observed = match observed {
            Ok(o) => o,
            Err(e) => {
                report.statistics.failed_tests += 1;
                warn!(
                    "[Fuzzer] {} payload test on {} aborted for {}: {}",
                    injection.set.category,
                    injection.fields.join(","),
                    role,
                    e
                );
                return;
            }
        };

        let console = self.ledger.console_since(marker, &role);
        let verdict = self.detection.classify(
            injection.set.category,
            &DetectionInput {
                payload: injection.payload,
                body: &observed.body,
                dom: &observed.dom,
                baseline,
                console: &console,
            },
        );

        let network = self.ledger.network_since(marker, &role);
        let skip = network.len().saturating_sub(self.network_window);
        let mut evidence = Evidence {
            status_code: observed.status,
            final_url: Some(observed.url.clone()),
            console: console.iter().map(|m| format!("[{}] {}", m.level, m.text)).collect(),
            network: network.iter().skip(skip).map(|n| n.summary()).collect(),
            response_snippet: Some(
                verdict
                    .matched()
                    .map(|m| m.snippet.clone())
                    .unwrap_or_else(|| excerpt(&observed.body, SNIPPET_LEN)),
            ),
            ..Evidence::default()
        };

        report.statistics.tests_executed += 1;
        let (vulnerable, ambiguous, matched) = match verdict {
            Verdict::Vulnerable(m) => (true, false, Some(m)),
            Verdict::Ambiguous(m) => {
                let ambiguity = AccessError::DetectionAmbiguous {
                    url: observed.url.clone(),
                    confidence: m.confidence,
                };
                debug!("[Fuzzer] {}", ambiguity);
                (false, true, Some(m))
            }
            Verdict::Clean => (false, false, None),
        };

        if vulnerable {
            report.statistics.vulnerable += 1;
            evidence.screenshot = self.screenshot(page, &role, injection.set.category).await;
            warn!(
                "[Fuzzer] {} signal on {} field {} for role {}",
                injection.set.category,
                observed.url,
                injection.fields.join(","),
                role
            );
        }
        if ambiguous {
            report.statistics.ambiguous += 1;
        }

        report.results.push(SecurityTestResult {
            id: uuid::Uuid::new_v4().to_string(),
            url: observed.url,
            role,
            surface: injection.surface,
            fields: injection.fields,
            payload: injection.payload.to_string(),
            payload_set: injection.set.name.clone(),
            category: injection.set.category,
            vulnerable,
            ambiguous,
            risk_level: matched.as_ref().filter(|_| vulnerable).map(|m| m.risk_level),
            matched,
            evidence,
            response_time_ms: observed.elapsed_ms,
        });
    }

    async fn screenshot(&self, page: &mut PageLease, role: &str, category: PayloadCategory) -> Option<String> {
        let target = self.screenshot_dir.join(format!(
            "{}_{}_{}.html",
            role,
            category,
            uuid::Uuid::new_v4().simple()
        ));
        match page.screenshot(&target).await {
            Ok(()) => Some(target.to_string_lossy().to_string()),
            Err(e) => {
                debug!("[Fuzzer] Evidence screenshot failed: {}", e);
                None
            }
        }
    }
}

/// Request for an endpoint with `target` carrying `value`; other parameters get filler
fn api_request(
    endpoint: &ApiEndpoint,
    parameters: &[String],
    target: Option<&String>,
    value: &str,
    timeout: Duration,
) -> ApiRequest {
    let values: BTreeMap<&str, &str> = parameters
        .iter()
        .map(|p| {
            let v = if Some(p) == target || target.is_none() { value } else { FILLER_VALUE };
            (p.as_str(), v)
        })
        .collect();

    if endpoint.method == "GET" || endpoint.method == "DELETE" {
        let mut url = url::Url::parse(&endpoint.url).ok();
        if let Some(u) = url.as_mut() {
            let mut pairs = u.query_pairs_mut();
            for (k, v) in &values {
                pairs.append_pair(k, v);
            }
        }
        let url = url.map(|u| u.to_string()).unwrap_or_else(|| endpoint.url.clone());
        return ApiRequest {
            method: endpoint.method.clone(),
            ..ApiRequest::get(&url, timeout)
        };
    }

    let body = serde_json::Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect(),
    );
    ApiRequest::get(&endpoint.url, timeout).with_json_body(&endpoint.method, body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(method: &str) -> ApiEndpoint {
        ApiEndpoint {
            method: method.to_string(),
            url: "https://app.test/api/orders".to_string(),
            path: "/api/orders".to_string(),
            parameters: vec!["status".to_string(), "sku".to_string()],
            content_type: None,
            json_body: method != "GET",
            observed: 1,
        }
    }

    #[test]
    fn test_api_request_get_encodes_query() {
        let e = endpoint("GET");
        let target = "sku".to_string();
        let request = api_request(&e, &e.parameters, Some(&target), "' OR '1'='1", Duration::from_secs(5));
        assert_eq!(request.method, "GET");
        assert!(request.url.contains("sku=%27+OR+%271%27%3D%271"));
        assert!(request.url.contains("status=test"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_api_request_post_uses_json() {
        let e = endpoint("POST");
        let target = "status".to_string();
        let request = api_request(&e, &e.parameters, Some(&target), "<b>", Duration::from_secs(5));
        assert_eq!(request.method, "POST");
        let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["status"], "<b>");
        assert_eq!(body["sku"], "test");
    }

    #[test]
    fn test_baseline_request_fills_every_parameter() {
        let e = endpoint("GET");
        let request = api_request(&e, &e.parameters, None, "1", Duration::from_secs(5));
        assert!(request.url.contains("status=1"));
        assert!(request.url.contains("sku=1"));
    }
}
