// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::core::AppConfig;
use super::validation::ConfigValidator;

pub struct ConfigLoader {
    config_path: PathBuf,
    format: ConfigFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref().to_path_buf();
        let format = Self::detect_format(&path)?;

        Ok(Self {
            config_path: path,
            format,
        })
    }

    pub fn with_format<P: AsRef<Path>>(config_path: P, format: ConfigFormat) -> Result<Self> {
        Ok(Self {
            config_path: config_path.as_ref().to_path_buf(),
            format,
        })
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file format"))?;

        match extension {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(anyhow::anyhow!("Unsupported config file format: {}", extension)),
        }
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        let config = self.load_unvalidated()?;

        ConfigValidator::validate_app_config(&config)?;

        tracing::info!(
            "[Config] Loaded {:?} with {} roles, {} permission rules",
            self.config_path,
            config.roles.len(),
            config.permission_rules.len()
        );

        Ok(config)
    }

    /// Parse and apply env overrides without running the validator
    pub fn load_unvalidated(&self) -> Result<AppConfig> {
        let content = std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file: {:?}", self.config_path))?;

        let mut config = Self::parse(&content, self.format)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig> {
        let config: AppConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .context("Failed to parse YAML config")?,
            ConfigFormat::Toml => toml::from_str(content)
                .context("Failed to parse TOML config")?,
            ConfigFormat::Json => serde_json::from_str(content)
                .context("Failed to parse JSON config")?,
        };
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
        if let Ok(base_url) = std::env::var("LONKERO_BASE_URL") {
            config.target.base_url = base_url;
        }

        if let Ok(max_pages) = std::env::var("LONKERO_MAX_PAGES") {
            config.crawler.max_pages = max_pages.parse()
                .context("Invalid LONKERO_MAX_PAGES")?;
        }

        if let Ok(max_sessions) = std::env::var("LONKERO_MAX_SESSIONS") {
            config.resources.max_concurrent_sessions = max_sessions.parse()
                .context("Invalid LONKERO_MAX_SESSIONS")?;
        }

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.observability.log_level = log_level;
        }

        Ok(())
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        ConfigValidator::validate_app_config(config)?;

        let content = match self.format {
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        };

        std::fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", self.config_path))?;

        Ok(())
    }
}
