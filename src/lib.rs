// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Access Assessment Library
 * Role-isolated crawling, RBAC validation, payload fuzzing and access intelligence
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

pub mod config;
pub mod role;
pub mod types;

// Production error handling and resilience modules
pub mod errors;
pub mod retry;

// Browser automation capability and run-scoped evidence
pub mod driver;
pub mod events;
pub mod session_pool;

// Assessment stages
pub mod crawler;
pub mod fuzzer;
pub mod rbac;

// Analysis module
pub mod intelligence;

pub mod assessment;
pub mod str_utils;

pub use assessment::{Assessment, AssessmentReport};
pub use errors::{AccessError, AccessResult, DriverError};
pub use types::{AccessOutcome, FindingType, RiskLevel, Severity, Vulnerability};
