// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

pub mod detection;
pub mod engine;
pub mod payloads;
pub mod surface;

pub use detection::{DetectionEngine, DetectionMatch, DetectionMethod, Verdict, VulnerabilityRule};
pub use engine::{FuzzReport, FuzzStatistics, FuzzerEngine, SecurityTestResult, SurfaceKind};
pub use payloads::{default_payload_sets, PayloadCategory, PayloadSet};
pub use surface::{ApiEndpoint, DiscoveredForm, FormInput};
