// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Access Assessment Orchestrator
 * Session pool -> crawler, RBAC validator, fuzzer -> intelligence engine
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary - Enterprise Edition
 */

use crate::config::AppConfig;
use crate::crawler::{CrawlStatistics, PathDiscovery, RoleCrawler};
use crate::driver::Driver;
use crate::errors::{AccessError, AccessResult};
use crate::events::EventLedger;
use crate::fuzzer::{FuzzReport, FuzzerEngine};
use crate::intelligence::{IntelligenceEngine, IntelligenceReport};
use crate::rbac::{RbacSecurityReport, RbacValidator};
use crate::session_pool::SessionPool;
use crate::types::Vulnerability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Everything one assessment run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    pub id: String,
    pub target: String,
    pub generated_at: String,
    pub duration_ms: u64,
    pub crawl_statistics: CrawlStatistics,
    pub discoveries: BTreeMap<String, PathDiscovery>,
    pub rbac: RbacSecurityReport,
    pub fuzzing: BTreeMap<String, FuzzReport>,
    /// RBAC and injection findings, most severe first
    pub vulnerabilities: Vec<Vulnerability>,
    pub intelligence: IntelligenceReport,
}

impl AssessmentReport {
    pub fn to_json(&self, pretty: bool) -> AccessResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        json.map_err(|e| AccessError::Validation(format!("report serialization failed: {}", e)))
    }

    /// Write the report as JSON, creating parent directories
    pub fn write_json(&self, path: &Path, pretty: bool) -> AccessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json(pretty)?)?;
        Ok(())
    }
}

pub struct Assessment {
    config: AppConfig,
    pool: Arc<SessionPool>,
}

impl Assessment {
    pub fn new(driver: Arc<dyn Driver>, config: AppConfig) -> Self {
        let ledger = Arc::new(EventLedger::new(config.resources.network_capture_capacity));
        let pool = SessionPool::new(driver, &config.roles, config.resources.clone(), ledger);
        Self {
            config,
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run every stage; sessions are closed whether or not the run succeeds
    pub async fn run(&self) -> AccessResult<AssessmentReport> {
        let outcome = self.execute().await;
        self.pool.shutdown().await;
        if let Err(e) = &outcome {
            warn!("[Assessment] Run aborted: {}", e);
        }
        outcome
    }

    async fn execute(&self) -> AccessResult<AssessmentReport> {
        let started = Instant::now();
        let generated_at = chrono::Utc::now().to_rfc3339();
        let roles = self.config.role_names();
        info!(
            "[Assessment] Assessing {} with {} roles",
            self.config.target.base_url,
            roles.len()
        );

        let crawler = RoleCrawler::new(self.pool.clone(), &self.config)?;
        let discoveries = crawler.discover_all(&roles).await?;

        // stages run one after another so ledger slices never mix two stages' traffic
        let validator = RbacValidator::new(self.pool.clone(), &self.config)?;
        let rbac = validator.run().await?;

        let fuzzing = if self.config.fuzzer.enabled {
            FuzzerEngine::new(self.pool.clone(), &self.config)
                .fuzz_roles(&roles, &discoveries)
                .await?
        } else {
            info!("[Assessment] Payload fuzzing disabled");
            BTreeMap::new()
        };

        let mut vulnerabilities = rbac.vulnerabilities.clone();
        vulnerabilities.extend(fuzzing.values().flat_map(FuzzReport::vulnerabilities));
        vulnerabilities.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.dedup_key().cmp(&b.dedup_key()))
        });

        let rbac_results: Vec<_> = rbac.all_results().cloned().collect();
        let security_results: Vec<_> = fuzzing.values().flat_map(|r| r.results.iter().cloned()).collect();

        let intelligence = IntelligenceEngine::new(
            validator.hierarchy().clone(),
            self.config.permission_rules.clone(),
            self.config.target.public_paths.clone(),
        )
        .analyze(&discoveries, &rbac_results, &security_results, &vulnerabilities)?;

        let report = AssessmentReport {
            id: uuid::Uuid::new_v4().to_string(),
            target: self.config.target.base_url.clone(),
            generated_at,
            duration_ms: started.elapsed().as_millis() as u64,
            crawl_statistics: CrawlStatistics::from_discoveries(&discoveries),
            discoveries,
            rbac,
            fuzzing,
            vulnerabilities,
            intelligence,
        };

        info!(
            "[Assessment] Complete in {} ms: {} vulnerabilities, score {:.1} ({})",
            report.duration_ms,
            report.vulnerabilities.len(),
            report.intelligence.executive_summary.overall_score,
            report.intelligence.executive_summary.posture
        );
        Ok(report)
    }
}
