// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Role-Context Crawler
 * Discovers reachable paths per role with bounded retries and batching
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use crate::config::{AppConfig, BatchConfig, CrawlerConfig, OutputConfig};
use crate::driver::{resolve_url, url_path, NavigationOptions, PageResponse, WaitCondition};
use crate::errors::{AccessError, AccessResult};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::session_pool::{PageLease, SessionPool};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Final-URL path fragments that mean the app bounced the request
const DENIAL_MARKERS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth",
    "/unauthorized",
    "/access-denied",
    "/denied",
    "/forbidden",
    "/403",
    "/404",
    "/not-found",
    "/error",
];

/// Selectors whose links count as navigation elements
const NAVIGATION_SELECTORS: &str =
    "nav a[href], [role='navigation'] a[href], aside a[href], .sidebar a[href], .menu a[href]";

/// One probe of one path under one role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub path: String,
    pub role: String,
    pub accessible: bool,
    #[serde(default)]
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
    #[serde(default)]
    pub discovered_links: Vec<String>,
    #[serde(default)]
    pub nav_element_count: usize,
}

impl PathResult {
    fn failed(role: &str, path: &str, error: &AccessError, elapsed_ms: u64) -> Self {
        Self {
            path: path.to_string(),
            role: role.to_string(),
            accessible: false,
            status_code: None,
            response_time_ms: elapsed_ms,
            final_url: None,
            error: Some(error.to_string()),
            screenshot_ref: None,
            discovered_links: Vec::new(),
            nav_element_count: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum PerformanceGrade {
    A,
    B,
    C,
    D,
    F,
}

impl PerformanceGrade {
    pub fn from_average_ms(avg_ms: f64) -> Self {
        if avg_ms < 500.0 {
            PerformanceGrade::A
        } else if avg_ms < 1000.0 {
            PerformanceGrade::B
        } else if avg_ms < 2000.0 {
            PerformanceGrade::C
        } else if avg_ms < 3000.0 {
            PerformanceGrade::D
        } else {
            PerformanceGrade::F
        }
    }
}

impl std::fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let grade = match self {
            PerformanceGrade::A => "A",
            PerformanceGrade::B => "B",
            PerformanceGrade::C => "C",
            PerformanceGrade::D => "D",
            PerformanceGrade::F => "F",
        };
        write!(f, "{}", grade)
    }
}

/// Coverage over attempted probes; failed probes count as attempted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAnalysis {
    pub total_paths: usize,
    pub accessible_paths: usize,
    pub failed_paths: usize,
    pub coverage_percentage: f64,
    pub average_response_time_ms: f64,
    pub performance_grade: PerformanceGrade,
}

impl CoverageAnalysis {
    pub fn from_results(results: &[PathResult]) -> Self {
        let total = results.len();
        let accessible = results.iter().filter(|r| r.accessible).count();
        let failed = results.iter().filter(|r| r.is_failure()).count();

        let timed: Vec<u64> = results
            .iter()
            .filter(|r| !r.is_failure())
            .map(|r| r.response_time_ms)
            .collect();
        let average = if timed.is_empty() {
            0.0
        } else {
            timed.iter().sum::<u64>() as f64 / timed.len() as f64
        };

        Self {
            total_paths: total,
            accessible_paths: accessible,
            failed_paths: failed,
            coverage_percentage: if total == 0 {
                0.0
            } else {
                accessible as f64 / total as f64 * 100.0
            },
            average_response_time_ms: average,
            performance_grade: PerformanceGrade::from_average_ms(average),
        }
    }
}

/// Everything one crawl run found for one role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathDiscovery {
    pub role: String,
    pub results: Vec<PathResult>,
    pub coverage: CoverageAnalysis,
    pub execution_time_ms: u64,
}

impl PathDiscovery {
    pub fn new(role: &str, results: Vec<PathResult>, execution_time_ms: u64) -> Self {
        Self {
            role: role.to_string(),
            coverage: CoverageAnalysis::from_results(&results),
            results,
            execution_time_ms,
        }
    }

    /// Accessible paths in probe order
    pub fn accessible_paths(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.accessible)
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn result(&self, path: &str) -> Option<&PathResult> {
        self.results.iter().find(|r| r.path == path)
    }
}

/// Run-wide crawl statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatistics {
    pub total_roles: usize,
    /// Roles that reached at least one path
    pub active_roles: usize,
    pub total_paths_tested: usize,
    pub unique_paths_tested: usize,
    pub paths_per_role: BTreeMap<String, usize>,
}

impl CrawlStatistics {
    pub fn from_discoveries(discoveries: &BTreeMap<String, PathDiscovery>) -> Self {
        let unique: BTreeSet<&str> = discoveries
            .values()
            .flat_map(|d| d.results.iter().map(|r| r.path.as_str()))
            .collect();

        Self {
            total_roles: discoveries.len(),
            active_roles: discoveries
                .values()
                .filter(|d| d.coverage.accessible_paths > 0)
                .count(),
            total_paths_tested: discoveries.values().map(|d| d.results.len()).sum(),
            unique_paths_tested: unique.len(),
            paths_per_role: discoveries
                .iter()
                .map(|(role, d)| (role.clone(), d.results.len()))
                .collect(),
        }
    }
}

/// `true` for 2xx/3xx unless the app redirected somewhere that means "no"
pub fn classify_access(requested_path: &str, status: u16, final_url: &str) -> bool {
    if !(200..400).contains(&status) {
        return false;
    }
    let requested = path_only(requested_path);
    let landed_url = url_path(final_url);
    let landed = path_only(&landed_url);
    if landed == requested {
        return true;
    }
    let landed = landed.to_lowercase();
    !DENIAL_MARKERS
        .iter()
        .any(|marker| landed == *marker || landed.starts_with(&format!("{}/", marker)) || landed.starts_with(&format!("{}?", marker)))
}

fn path_only(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Links and navigation counts pulled out of one document
#[derive(Debug, Default)]
struct PageLinks {
    links: Vec<String>,
    nav_elements: usize,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Same-origin links as paths, in document order (synchronous, `Html` is not `Send`)
fn extract_links(html: &str, page_url: &str) -> PageLinks {
    let Ok(page) = Url::parse(page_url) else {
        return PageLinks::default();
    };
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    if let Some(anchors) = selector("a[href]") {
        for element in document.select(&anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }
            let Ok(absolute) = page.join(href) else {
                continue;
            };
            if absolute.origin() != page.origin() {
                continue;
            }
            let path = url_path(absolute.as_str());
            if seen.insert(path.clone()) {
                links.push(path);
            }
        }
    }

    let nav_elements = selector(NAVIGATION_SELECTORS)
        .map(|nav| document.select(&nav).count())
        .unwrap_or(0);

    PageLinks {
        links,
        nav_elements,
    }
}

fn screenshot_name(role: &str, path: &str) -> String {
    let slug: String = path
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = if slug.is_empty() { "root".to_string() } else { slug };
    format!("{}_{}.html", role, slug)
}

/// Crawls one role at a time through the session pool
pub struct RoleCrawler {
    pool: Arc<SessionPool>,
    base_url: String,
    crawler: CrawlerConfig,
    batch: BatchConfig,
    output: OutputConfig,
    retry: RetryConfig,
    skip_patterns: Vec<Regex>,
}

impl RoleCrawler {
    pub fn new(pool: Arc<SessionPool>, config: &AppConfig) -> AccessResult<Self> {
        let skip_patterns = config
            .crawler
            .skip_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    AccessError::Configuration(format!("invalid skip pattern '{}': {}", p, e))
                })
            })
            .collect::<AccessResult<Vec<_>>>()?;

        Ok(Self {
            pool,
            base_url: config.target.base_url.clone(),
            retry: config.crawler.retry_config(),
            crawler: config.crawler.clone(),
            batch: config.batch.clone(),
            output: config.output.clone(),
            skip_patterns,
        })
    }

    fn should_skip(&self, path: &str) -> bool {
        self.skip_patterns.iter().any(|re| re.is_match(path))
    }

    /// Crawl `role` from its seed paths; only fatal errors are returned as `Err`
    pub async fn discover(&self, role: &str) -> AccessResult<PathDiscovery> {
        let started = Instant::now();
        let seeds: Vec<String> = match self.pool.role(role) {
            Some(def) if !def.seed_paths.is_empty() => def.seed_paths.clone(),
            Some(def) => vec![def.entry_path().to_string()],
            None => {
                return Err(AccessError::SessionUnavailable {
                    role: role.to_string(),
                    reason: "role is not declared".to_string(),
                })
            }
        };

        info!("[Crawler] Discovering paths for role '{}' from {} seeds", role, seeds.len());

        let lease = Mutex::new(self.pool.acquire(role).await?);
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        for seed in seeds {
            if seen.insert(seed.clone()) {
                queue.push_back(seed);
            }
        }

        let mut results: Vec<PathResult> = Vec::new();

        while let Some(path) = queue.pop_front() {
            if results.len() >= self.crawler.max_pages {
                warn!(
                    "[Crawler] Reached max pages limit ({}) for role '{}'",
                    self.crawler.max_pages, role
                );
                break;
            }

            if self.should_skip(&path) {
                debug!("[Crawler] Skipping {} (matches skip pattern)", path);
                continue;
            }

            let result = self.probe(&lease, role, &path).await?;

            if self.crawler.follow_links {
                for link in &result.discovered_links {
                    if seen.insert(link.clone()) {
                        queue.push_back(link.clone());
                    }
                }
            }
            results.push(result);
        }

        if let Err(e) = lease.into_inner().close().await {
            debug!("[Crawler] Closing page for role '{}' failed: {}", role, e);
        }

        let discovery = PathDiscovery::new(role, results, started.elapsed().as_millis() as u64);
        info!(
            "[Crawler] Role '{}': {}/{} paths accessible ({:.1}%), grade {}",
            role,
            discovery.coverage.accessible_paths,
            discovery.coverage.total_paths,
            discovery.coverage.coverage_percentage,
            discovery.coverage.performance_grade
        );
        Ok(discovery)
    }

    /// Probe one path with retries; exhausted retries become a failed result
    async fn probe(
        &self,
        lease: &Mutex<PageLease>,
        role: &str,
        path: &str,
    ) -> AccessResult<PathResult> {
        let url = resolve_url(&self.base_url, path);
        let started = Instant::now();

        let target = url.as_str();
        let navigation = retry_with_backoff(&self.retry, target, move |ctx| async move {
            let mut options = NavigationOptions::with_timeout(ctx.timeout);
            if ctx.fallback {
                options = options.wait_until(WaitCondition::DomContentLoaded);
            }
            let mut page = lease.lock().await;
            page.goto(target, &options)
                .await
                .map_err(|e| AccessError::from_driver(target, e))
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match navigation {
            Ok(response) => response,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("[Crawler] Role '{}' failed to reach {}: {}", role, path, e);
                return Ok(PathResult::failed(role, path, &e, elapsed_ms));
            }
        };

        let accessible = classify_access(path, response.status, &response.url);
        let page_links = if accessible {
            extract_links(&response.body, &response.url)
        } else {
            PageLinks::default()
        };

        let screenshot_ref = if accessible && self.crawler.screenshots {
            self.capture(lease, role, path).await
        } else {
            None
        };

        debug!(
            "[Crawler] {} {} -> {} ({} ms, accessible: {}, {} links)",
            role,
            path,
            response.status,
            response.duration_ms,
            accessible,
            page_links.links.len()
        );

        Ok(Self::record(role, path, &response, accessible, page_links, screenshot_ref))
    }

    fn record(
        role: &str,
        path: &str,
        response: &PageResponse,
        accessible: bool,
        page_links: PageLinks,
        screenshot_ref: Option<String>,
    ) -> PathResult {
        PathResult {
            path: path.to_string(),
            role: role.to_string(),
            accessible,
            status_code: Some(response.status),
            response_time_ms: response.duration_ms,
            final_url: Some(response.url.clone()),
            error: None,
            screenshot_ref,
            discovered_links: page_links.links,
            nav_element_count: page_links.nav_elements,
        }
    }

    async fn capture(&self, lease: &Mutex<PageLease>, role: &str, path: &str) -> Option<String> {
        let target: PathBuf = self.output.screenshot_dir.join(screenshot_name(role, path));
        let mut page = lease.lock().await;
        match page.screenshot(&target).await {
            Ok(()) => Some(target.to_string_lossy().to_string()),
            Err(e) => {
                warn!("[Crawler] Screenshot of {} for role '{}' failed: {}", path, role, e);
                None
            }
        }
    }

    /// Probe `paths` in order on one page without following links
    pub async fn probe_paths(&self, role: &str, paths: &[String]) -> AccessResult<Vec<PathResult>> {
        let lease = Mutex::new(self.pool.acquire(role).await?);
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.probe(&lease, role, path).await?);
        }
        if let Err(e) = lease.into_inner().close().await {
            debug!("[Crawler] Closing page for role '{}' failed: {}", role, e);
        }
        Ok(results)
    }

    /// Paths reached by any role but never tried by `discovery`'s role
    fn untried_paths(&self, reached: &BTreeSet<String>, discovery: &PathDiscovery) -> Vec<String> {
        let tried: HashSet<&str> = discovery.results.iter().map(|r| r.path.as_str()).collect();
        let budget = self.crawler.max_pages.saturating_sub(discovery.results.len());
        reached
            .iter()
            .filter(|p| !tried.contains(p.as_str()) && !self.should_skip(p))
            .take(budget)
            .cloned()
            .collect()
    }

    /// Fill the gaps between roles so every reached path is compared across all of them
    async fn cross_probe(
        &self,
        ordered: &[String],
        discoveries: &mut BTreeMap<String, PathDiscovery>,
    ) -> AccessResult<()> {
        let reached: BTreeSet<String> = discoveries
            .values()
            .flat_map(|d| d.results.iter().filter(|r| r.accessible).map(|r| r.path.clone()))
            .collect();

        let pending: Vec<(String, Vec<String>)> = ordered
            .iter()
            .filter_map(|role| {
                let paths = self.untried_paths(&reached, discoveries.get(role)?);
                (!paths.is_empty()).then(|| (role.clone(), paths))
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        info!(
            "[Crawler] Cross-probing {} reached paths for {} roles",
            reached.len(),
            pending.len()
        );

        for batch in pending.chunks(self.pool.role_parallelism(self.batch.size)) {
            let started = Instant::now();
            let outcomes = futures::future::join_all(
                batch.iter().map(|(role, paths)| self.probe_paths(role, paths)),
            )
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let mut fatal: Option<AccessError> = None;
            for ((role, _), outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(extra) => {
                        if let Some(previous) = discoveries.remove(role) {
                            let mut results = previous.results;
                            results.extend(extra);
                            let discovery =
                                PathDiscovery::new(role, results, previous.execution_time_ms + elapsed_ms);
                            discoveries.insert(role.clone(), discovery);
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        warn!("[Crawler] Cross-probe for role '{}' aborted: {}", role, e);
                        fatal.get_or_insert(e);
                    }
                    Err(e) => warn!("[Crawler] Cross-probe for role '{}' failed: {}", role, e),
                }
            }
            if let Some(e) = fatal {
                return Err(e);
            }
        }
        Ok(())
    }

    /// Priority roles first in declared order, then the rest in input order
    pub fn priority_order(&self, roles: &[String]) -> Vec<String> {
        let mut ordered: Vec<String> = self
            .batch
            .priority_roles
            .iter()
            .filter(|r| roles.contains(r))
            .cloned()
            .collect();
        for role in roles {
            if !ordered.contains(role) {
                ordered.push(role.clone());
            }
        }
        ordered
    }

    /// Crawl every role in batches; a batch settles fully before errors are inspected
    pub async fn discover_all(&self, roles: &[String]) -> AccessResult<BTreeMap<String, PathDiscovery>> {
        let ordered = self.priority_order(roles);
        let batch_size = self.pool.role_parallelism(self.batch.size);
        let mut discoveries = BTreeMap::new();

        info!(
            "[Crawler] Crawling {} roles in batches of {}",
            ordered.len(),
            batch_size
        );

        for (index, batch) in ordered.chunks(batch_size).enumerate() {
            if index > 0 && !self.batch.cooldown().is_zero() {
                debug!("[Crawler] Cooling down {:?} between batches", self.batch.cooldown());
                tokio::time::sleep(self.batch.cooldown()).await;
            }

            let outcomes = futures::future::join_all(batch.iter().map(|r| self.discover(r))).await;

            let mut fatal: Option<AccessError> = None;
            for (role, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(discovery) => {
                        discoveries.insert(role.clone(), discovery);
                    }
                    Err(e) if e.is_fatal() => {
                        warn!("[Crawler] Role '{}' aborted: {}", role, e);
                        fatal.get_or_insert(e);
                    }
                    Err(e) => {
                        warn!("[Crawler] Role '{}' produced no results: {}", role, e);
                        discoveries.insert(role.clone(), PathDiscovery::new(role, Vec::new(), 0));
                    }
                }
            }

            if let Some(e) = fatal {
                return Err(e);
            }
        }

        if self.crawler.cross_role_probe && discoveries.len() > 1 {
            self.cross_probe(&ordered, &mut discoveries).await?;
        }

        let stats = CrawlStatistics::from_discoveries(&discoveries);
        info!(
            "[Crawler] Crawl complete: {} roles ({} active), {} probes, {} unique paths",
            stats.total_roles, stats.active_roles, stats.total_paths_tested, stats.unique_paths_tested
        );
        Ok(discoveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceLimits;
    use crate::driver::{ScriptedDriver, ScriptedResponse};
    use crate::events::EventLedger;
    use crate::role::Role;
    use std::time::Duration;

    fn config(roles: Vec<Role>) -> AppConfig {
        let mut config = AppConfig::new("https://app.test", roles);
        config.crawler.retry_attempts = 2;
        config.crawler.retry_delay_ms = 10;
        config.crawler.navigation_timeout_ms = 1000;
        config.batch.cooldown_ms = 0;
        config
    }

    fn crawler(driver: &ScriptedDriver, config: &AppConfig) -> RoleCrawler {
        let pool = SessionPool::new(
            Arc::new(driver.clone()),
            &config.roles,
            ResourceLimits {
                acquire_timeout_secs: 5,
                ..ResourceLimits::default()
            },
            Arc::new(EventLedger::default()),
        );
        RoleCrawler::new(Arc::new(pool), config).unwrap()
    }

    #[test]
    fn test_classify_access() {
        assert!(classify_access("/admin", 200, "https://app.test/admin"));
        assert!(classify_access("/admin", 302, "https://app.test/admin"));
        assert!(!classify_access("/admin", 200, "https://app.test/login?next=/admin"));
        assert!(!classify_access("/admin", 200, "https://app.test/access-denied"));
        assert!(!classify_access("/admin", 403, "https://app.test/admin"));
        assert!(!classify_access("/admin", 500, "https://app.test/admin"));
        assert!(classify_access("/login", 200, "https://app.test/login"));
        assert!(classify_access("/dashboard", 200, "https://app.test/authors"));
    }

    #[test]
    fn test_extract_links_same_origin_only() {
        let html = r##"
            <nav><a href="/orders">Orders</a><a href="/reports?year=2026">Reports</a></nav>
            <a href="https://evil.test/x">External</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="settings">Relative</a>
            <a href="/orders">Duplicate</a>
        "##;
        let links = extract_links(html, "https://app.test/dashboard/");
        assert_eq!(
            links.links,
            vec!["/orders", "/reports?year=2026", "/dashboard/settings"]
        );
        assert_eq!(links.nav_elements, 2);
    }

    #[test]
    fn test_coverage_grades() {
        let ok = |path: &str, ms: u64| PathResult {
            path: path.to_string(),
            role: "r".to_string(),
            accessible: true,
            status_code: Some(200),
            response_time_ms: ms,
            final_url: None,
            error: None,
            screenshot_ref: None,
            discovered_links: Vec::new(),
            nav_element_count: 0,
        };
        let failed = PathResult::failed(
            "r",
            "/slow",
            &AccessError::ProbeFailure {
                target: "/slow".to_string(),
                attempts: 3,
                reason: "timeout".to_string(),
            },
            90_000,
        );

        let coverage = CoverageAnalysis::from_results(&[ok("/a", 400), ok("/b", 800), failed]);
        assert_eq!(coverage.total_paths, 3);
        assert_eq!(coverage.accessible_paths, 2);
        assert_eq!(coverage.failed_paths, 1);
        assert!((coverage.coverage_percentage - 66.666).abs() < 0.01);
        assert_eq!(coverage.average_response_time_ms, 600.0);
        assert_eq!(coverage.performance_grade, PerformanceGrade::B);
        assert_eq!(PerformanceGrade::from_average_ms(3500.0), PerformanceGrade::F);
    }

    #[tokio::test]
    async fn test_discover_follows_links_fifo() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .page(None, "/dashboard", r#"<nav><a href="/orders">o</a><a href="/admin">a</a></nav>"#)
            .page(None, "/orders", r#"<a href="/orders/1">1</a><a href="/logo.png">img</a>"#)
            .respond(None, "/admin", ScriptedResponse::redirect("/login"))
            .page(None, "/login", "<form></form>")
            .page(None, "/orders/1", "<p>order</p>");

        let config = config(vec![Role::new("wms_user").with_seed_paths(["/dashboard"])]);
        let crawler = crawler(&driver, &config);
        let discovery = crawler.discover("wms_user").await.unwrap();

        let paths: Vec<&str> = discovery.results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/dashboard", "/orders", "/admin", "/orders/1"]);
        assert_eq!(discovery.accessible_paths(), vec!["/dashboard", "/orders", "/orders/1"]);
        assert!(!discovery.result("/admin").unwrap().accessible);
        assert_eq!(discovery.result("/dashboard").unwrap().nav_element_count, 2);
        assert_eq!(driver.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_max_pages_caps_crawl() {
        let driver = ScriptedDriver::new("https://app.test");
        driver.route(None, "/p/*", |req| {
            let n: u32 = req.path.trim_start_matches("/p/").parse().unwrap_or(0);
            ScriptedResponse::ok(format!(r#"<a href="/p/{}">next</a>"#, n + 1))
        });

        let mut config = config(vec![Role::new("user").with_seed_paths(["/p/0"])]);
        config.crawler.max_pages = 5;
        let discovery = crawler(&driver, &config).discover("user").await.unwrap();
        assert_eq!(discovery.results.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_recorded_not_raised() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .page(None, "/", r#"<a href="/slow">slow</a>"#)
            .respond(
                None,
                "/slow",
                ScriptedResponse::ok("late").with_delay(Duration::from_secs(60)),
            );

        let config = config(vec![Role::new("user")]);
        let discovery = crawler(&driver, &config).discover("user").await.unwrap();

        let slow = discovery.result("/slow").unwrap();
        assert!(!slow.accessible);
        assert!(slow.error.as_deref().unwrap().contains("2 attempts"));
        assert_eq!(discovery.coverage.failed_paths, 1);
        assert_eq!(
            driver.requests().iter().filter(|r| r.path == "/slow").count(),
            2
        );
    }

    #[tokio::test]
    async fn test_discover_all_priority_and_fatal_after_batch() {
        let driver = ScriptedDriver::new("https://app.test");
        driver.page(None, "/", "<p>home</p>");
        driver.fail_login("broken");

        let mut config = config(vec![Role::new("a"), Role::new("b"), Role::new("broken")]);
        config.batch.size = 2;
        config.batch.priority_roles = vec!["b".to_string()];
        let crawler = crawler(&driver, &config);

        let roles: Vec<String> = vec!["a".into(), "b".into(), "broken".into()];
        assert_eq!(crawler.priority_order(&roles), vec!["b", "a", "broken"]);

        let err = crawler.discover_all(&roles).await.unwrap_err();
        assert!(matches!(err, AccessError::SessionUnavailable { .. }));
        assert_eq!(driver.requests_for("a").len(), 1);
        assert_eq!(driver.requests_for("b").len(), 1);

        let ok = crawler.discover_all(&roles[..2]).await.unwrap();
        let stats = CrawlStatistics::from_discoveries(&ok);
        assert_eq!(stats.total_roles, 2);
        assert_eq!(stats.active_roles, 2);
        assert_eq!(stats.unique_paths_tested, 1);
    }

    #[tokio::test]
    async fn test_cross_probe_fills_matrix_gaps() {
        let driver = ScriptedDriver::new("https://app.test");
        driver
            .page(Some("admin"), "/", r#"<a href="/admin">admin</a>"#)
            .page(Some("admin"), "/admin", "<h1>Admin</h1>")
            .page(Some("user"), "/", "<p>home</p>")
            .respond(Some("user"), "/admin", ScriptedResponse::status(403, "no"));

        let config = config(vec![Role::new("admin"), Role::new("user")]);
        let crawler = crawler(&driver, &config);
        let roles: Vec<String> = vec!["admin".into(), "user".into()];
        let discoveries = crawler.discover_all(&roles).await.unwrap();

        let user = &discoveries["user"];
        assert_eq!(user.results.len(), 2);
        assert!(!user.result("/admin").unwrap().accessible);
        assert_eq!(user.coverage.total_paths, 2);
        assert_eq!(discoveries["admin"].results.len(), 2);
    }

    #[tokio::test]
    async fn test_skip_patterns_and_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ScriptedDriver::new("https://app.test");
        driver.page(None, "/", r#"<a href="/logout">out</a><a href="/app.js">js</a><a href="/x">x</a>"#);
        driver.page(None, "/x", "<p>x</p>");

        let mut config = config(vec![Role::new("user")]);
        config.crawler.screenshots = true;
        config.output.screenshot_dir = dir.path().to_path_buf();
        let discovery = crawler(&driver, &config).discover("user").await.unwrap();

        let paths: Vec<&str> = discovery.results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/x"]);
        let shot = discovery.result("/x").unwrap().screenshot_ref.clone().unwrap();
        assert!(std::path::Path::new(&shot).exists());
    }
}
