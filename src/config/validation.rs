// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

use super::core::AppConfig;
use crate::rbac::hierarchy::RoleHierarchy;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_app_config(config: &AppConfig) -> Result<()> {
        config.validate()
            .context("Configuration validation failed")?;

        Self::validate_roles(config)?;
        Self::validate_permission_rules(config)?;
        Self::validate_hierarchy(config)?;
        Self::validate_batch_config(config)?;
        Self::validate_fuzzer_config(config)?;
        Self::validate_crawler_config(config)?;

        Ok(())
    }

    fn validate_roles(config: &AppConfig) -> Result<()> {
        let mut seen = BTreeSet::new();
        for role in &config.roles {
            if role.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Role name cannot be empty"));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(anyhow::anyhow!("Duplicate role name: {}", role.name));
            }
            if let Some(creds) = &role.credentials {
                if creds.token.is_none() && creds.username.is_empty() {
                    return Err(anyhow::anyhow!(
                        "Role '{}' has credentials without a username or token",
                        role.name
                    ));
                }
            }
        }
        Ok(())
    }

    fn known_roles(config: &AppConfig) -> BTreeSet<&str> {
        config.roles.iter().map(|r| r.name.as_str()).collect()
    }

    fn validate_permission_rules(config: &AppConfig) -> Result<()> {
        let roles = Self::known_roles(config);

        for rule in &config.permission_rules {
            if rule.resource.is_empty() {
                return Err(anyhow::anyhow!("Permission rule resource cannot be empty"));
            }

            let overlap = rule.overlapping_roles();
            if !overlap.is_empty() {
                return Err(anyhow::anyhow!(
                    "Permission rule {} lists roles as both allowed and denied: {}",
                    rule.id(),
                    overlap.join(", ")
                ));
            }

            for role in rule.allowed_roles.iter().chain(rule.denied_roles.iter()) {
                if !roles.contains(role.as_str()) {
                    return Err(anyhow::anyhow!(
                        "Permission rule {} references unknown role '{}'",
                        rule.id(),
                        role
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_hierarchy(config: &AppConfig) -> Result<()> {
        let roles = Self::known_roles(config);
        let hierarchy = &config.hierarchy;

        for def in &hierarchy.roles {
            if !roles.contains(def.name.as_str()) {
                return Err(anyhow::anyhow!(
                    "Hierarchy defines unknown role '{}'",
                    def.name
                ));
            }
        }

        RoleHierarchy::build(&hierarchy.roles)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Invalid role hierarchy")?;

        for path in &hierarchy.escalation_paths {
            for role in [&path.from_role, &path.to_role] {
                if !roles.contains(role.as_str()) {
                    return Err(anyhow::anyhow!(
                        "Escalation path {} references unknown role '{}'",
                        path.id(),
                        role
                    ));
                }
            }
            if path.from_role == path.to_role {
                return Err(anyhow::anyhow!(
                    "Escalation path {} must connect two different roles",
                    path.id()
                ));
            }
        }

        for boundary in &hierarchy.isolation_boundaries {
            if boundary.protected_paths.is_empty() {
                return Err(anyhow::anyhow!(
                    "Isolation boundary '{}' has no protected paths",
                    boundary.name
                ));
            }
            for role in &boundary.authorized_roles {
                if !roles.contains(role.as_str()) {
                    return Err(anyhow::anyhow!(
                        "Isolation boundary '{}' references unknown role '{}'",
                        boundary.name,
                        role
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_batch_config(config: &AppConfig) -> Result<()> {
        let roles = Self::known_roles(config);
        for role in &config.batch.priority_roles {
            if !roles.contains(role.as_str()) {
                return Err(anyhow::anyhow!("Priority role '{}' is not declared", role));
            }
        }
        Ok(())
    }

    fn validate_fuzzer_config(config: &AppConfig) -> Result<()> {
        if !config.fuzzer.enabled {
            return Ok(());
        }

        for set in &config.fuzzer.payload_sets {
            if set.payloads.is_empty() {
                return Err(anyhow::anyhow!("Payload set '{}' is empty", set.name));
            }
        }

        for rule in &config.fuzzer.vulnerability_rules {
            if rule.indicators.is_empty() && !rule.reflects_payload {
                return Err(anyhow::anyhow!(
                    "Vulnerability rule '{}' has no indicators and does not check reflection",
                    rule.name
                ));
            }
        }

        Ok(())
    }

    fn validate_crawler_config(config: &AppConfig) -> Result<()> {
        for pattern in &config.crawler.skip_patterns {
            Regex::new(pattern)
                .with_context(|| format!("Invalid skip pattern: {}", pattern))?;
        }
        Ok(())
    }

    pub fn generate_validation_report(config: &AppConfig) -> ValidationReport {
        let mut report = ValidationReport::new();

        if let Err(e) = Self::validate_app_config(config) {
            report.add_error("app_config", &format!("{:#}", e));
        }

        if config.resources.max_concurrent_sessions > 16 {
            report.add_warning(
                "resources.max_concurrent_sessions",
                "Many concurrent sessions may overwhelm the target application"
            );
        }

        if config.batch.size > config.resources.max_concurrent_sessions {
            report.add_warning(
                "batch.size",
                "Batch size exceeds max concurrent sessions, roles will queue for sessions"
            );
        }

        if config.crawler.navigation_timeout_ms > 120_000 {
            report.add_warning(
                "crawler.navigation_timeout_ms",
                "Very high navigation timeout may cause slow runs"
            );
        }

        if config.permission_rules.is_empty() {
            report.add_info(
                "permission_rules",
                "No permission rules declared, permission tests will be skipped"
            );
        }

        if config.hierarchy.roles.is_empty() {
            report.add_info(
                "hierarchy.roles",
                "No role hierarchy declared, hierarchy compliance has no checks"
            );
        }

        if !config.fuzzer.enabled {
            report.add_info("fuzzer.enabled", "Payload fuzzing is disabled");
        }

        report
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: BTreeMap<String, Vec<String>>,
    pub warnings: BTreeMap<String, Vec<String>>,
    pub info: BTreeMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
            info: BTreeMap::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn print_report(&self) {
        if !self.errors.is_empty() {
            println!("\n[ERROR] Errors:");
            for (field, messages) in &self.errors {
                for message in messages {
                    println!("  - {}: {}", field, message);
                }
            }
        }

        if !self.warnings.is_empty() {
            println!("\n[WARNING]  Warnings:");
            for (field, messages) in &self.warnings {
                for message in messages {
                    println!("  - {}: {}", field, message);
                }
            }
        }

        if !self.info.is_empty() {
            println!("\n[INFO]  Info:");
            for (field, messages) in &self.info {
                for message in messages {
                    println!("  - {}: {}", field, message);
                }
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("\n[SUCCESS] Configuration validation passed!");
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
