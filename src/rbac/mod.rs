// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role-based access control validation.

pub mod hierarchy;
pub mod model;
pub mod probe;
pub mod report;
pub mod strategies;
pub mod validator;

pub use hierarchy::RoleHierarchy;
pub use model::{
    BoundaryType, EscalationPath, HierarchyConfig, IsolationBoundary, PermissionLevel,
    PermissionRule, RbacTestResult, RbacTestType, RoleDefinition,
};
pub use probe::{AccessProber, ContentSignals, ProbeOutcome};
pub use report::{BoundaryCategory, EscalationTestResult, IsolationTestResult, RbacSecurityReport, RbacSummary};
pub use strategies::{EscalationMethod, IsolationTechnique, StrategyRegistry};
pub use validator::{RbacValidator, TestBatch};
