// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role × path heatmap and response-time analysis.

use super::comparison::{CellAccess, ComparisonMatrix};
use crate::crawler::PerformanceGrade;
use serde::{Deserialize, Serialize};

/// Responses at or below this are full quality
const FAST_MS: f64 = 500.0;
/// Responses at or above this get the accessibility floor only
const SLOW_MS: f64 = 3000.0;
const ACCESS_FLOOR: f64 = 50.0;

/// (value, rgb) stops of the color scale
const COLOR_STOPS: [(f64, (u8, u8, u8)); 3] = [
    (0.0, (0xdc, 0x35, 0x45)),
    (50.0, (0xff, 0xc1, 0x07)),
    (100.0, (0x28, 0xa7, 0x45)),
];

const SLOWEST_PATHS: usize = 10;

/// 0 for anything not reachable, 50..=100 by response time otherwise
pub fn cell_value(access: CellAccess, response_time_ms: Option<u64>) -> f64 {
    match (access, response_time_ms) {
        (CellAccess::Granted, Some(ms)) => {
            let quality = ((SLOW_MS - ms as f64) / (SLOW_MS - FAST_MS)).clamp(0.0, 1.0);
            ACCESS_FLOOR + (100.0 - ACCESS_FLOOR) * quality
        }
        (CellAccess::Granted, None) => ACCESS_FLOOR,
        _ => 0.0,
    }
}

/// Hex color for a 0..=100 value, linear between the red, yellow and green stops
pub fn heat_color(value: f64) -> String {
    let value = value.clamp(0.0, 100.0);
    let (lo, hi) = if value <= COLOR_STOPS[1].0 {
        (COLOR_STOPS[0], COLOR_STOPS[1])
    } else {
        (COLOR_STOPS[1], COLOR_STOPS[2])
    };
    let t = (value - lo.0) / (hi.0 - lo.0);
    let mix = |a: u8, b: u8| -> u8 { (a as f64 + (b as f64 - a as f64) * t).round() as u8 };
    format!(
        "#{:02x}{:02x}{:02x}",
        mix(lo.1 .0, hi.1 .0),
        mix(lo.1 .1, hi.1 .1),
        mix(lo.1 .2, hi.1 .2)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    pub access: CellAccess,
    pub value: f64,
    pub color: String,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub roles: Vec<String>,
    pub paths: Vec<String>,
    /// One row per role, one cell per path
    pub cells: Vec<Vec<HeatmapCell>>,
}

impl Heatmap {
    pub fn from_matrix(matrix: &ComparisonMatrix) -> Self {
        let cells = (0..matrix.roles.len())
            .map(|r| {
                (0..matrix.paths.len())
                    .map(|p| {
                        let access = matrix.cell(r, p);
                        let response_time_ms = matrix.response_times_ms[r][p];
                        let value = cell_value(access, response_time_ms);
                        HeatmapCell {
                            access,
                            value,
                            color: heat_color(value),
                            response_time_ms,
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            roles: matrix.roles.clone(),
            paths: matrix.paths.clone(),
            cells,
        }
    }

    /// Mean cell value for a role, 0 for an unknown or empty row
    pub fn role_score(&self, role: &str) -> f64 {
        let Some(row) = self.roles.iter().position(|r| r == role).map(|i| &self.cells[i]) else {
            return 0.0;
        };
        if row.is_empty() {
            return 0.0;
        }
        row.iter().map(|c| c.value).sum::<f64>() / row.len() as f64
    }
}

/// 100/85/70/50/25 by the same thresholds as the crawl grade
pub fn performance_score(average_ms: f64) -> f64 {
    match PerformanceGrade::from_average_ms(average_ms) {
        PerformanceGrade::A => 100.0,
        PerformanceGrade::B => 85.0,
        PerformanceGrade::C => 70.0,
        PerformanceGrade::D => 50.0,
        PerformanceGrade::F => 25.0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolePerformance {
    pub role: String,
    pub samples: usize,
    pub average_response_ms: f64,
    pub fastest_ms: Option<u64>,
    pub slowest_ms: Option<u64>,
    pub grade: PerformanceGrade,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlowPath {
    pub role: String,
    pub path: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAnalysis {
    pub roles: Vec<RolePerformance>,
    pub overall_average_ms: f64,
    pub overall_grade: PerformanceGrade,
    pub performance_score: f64,
    pub slowest_paths: Vec<SlowPath>,
}

impl PerformanceAnalysis {
    /// Response times of completed probes only; failures carry no timing
    pub fn from_matrix(matrix: &ComparisonMatrix) -> Self {
        let mut all: Vec<SlowPath> = Vec::new();
        let mut roles = Vec::with_capacity(matrix.roles.len());

        for (r, role) in matrix.roles.iter().enumerate() {
            let times: Vec<u64> = matrix.response_times_ms[r].iter().flatten().copied().collect();
            let average = mean(&times);
            roles.push(RolePerformance {
                role: role.clone(),
                samples: times.len(),
                average_response_ms: average,
                fastest_ms: times.iter().min().copied(),
                slowest_ms: times.iter().max().copied(),
                grade: PerformanceGrade::from_average_ms(average),
            });
            for (p, ms) in matrix.response_times_ms[r].iter().enumerate() {
                if let Some(ms) = ms {
                    all.push(SlowPath {
                        role: role.clone(),
                        path: matrix.paths[p].clone(),
                        response_time_ms: *ms,
                    });
                }
            }
        }

        let overall = mean(&all.iter().map(|s| s.response_time_ms).collect::<Vec<_>>());
        all.sort_by(|a, b| {
            b.response_time_ms
                .cmp(&a.response_time_ms)
                .then_with(|| a.role.cmp(&b.role))
                .then_with(|| a.path.cmp(&b.path))
        });
        all.truncate(SLOWEST_PATHS);

        Self {
            roles,
            overall_average_ms: overall,
            overall_grade: PerformanceGrade::from_average_ms(overall),
            performance_score: performance_score(overall),
            slowest_paths: all,
        }
    }
}

fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<u64>() as f64 / values.len() as f64
    }
}
