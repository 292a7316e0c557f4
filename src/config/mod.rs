// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

pub mod core;
pub mod loader;
pub mod validation;

pub use core::{
    AppConfig, BatchConfig, CrawlerConfig, FuzzerConfig, ObservabilityConfig, OutputConfig,
    ResourceLimits, TargetConfig,
};

pub use loader::{ConfigFormat, ConfigLoader};

pub use validation::{ConfigValidator, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Load, override from the environment and validate a configuration file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    ConfigLoader::new(path)?.load_config()
}
