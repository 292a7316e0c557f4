// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role × path accessibility matrix built from crawl results.

use crate::crawler::{PathDiscovery, PathResult};
use crate::errors::{AccessError, AccessResult};
use crate::rbac::model::PermissionRule;
use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Declared expectation for one role and path, `None` when nothing is declared
pub trait ExpectedAccess {
    fn expected(&self, role: &str, path: &str) -> Option<bool>;
}

/// Expectations from the permission matrix plus the public paths
pub struct RuleExpectations<'a> {
    rules: &'a [PermissionRule],
    public_paths: BTreeSet<&'a str>,
}

impl<'a> RuleExpectations<'a> {
    pub fn new(rules: &'a [PermissionRule], public_paths: &'a [String]) -> Self {
        Self {
            rules,
            public_paths: public_paths.iter().map(String::as_str).collect(),
        }
    }
}

impl ExpectedAccess for RuleExpectations<'_> {
    fn expected(&self, role: &str, path: &str) -> Option<bool> {
        if self.public_paths.contains(path) {
            return Some(true);
        }
        let matching: Vec<&PermissionRule> = self.rules.iter().filter(|r| r.resource == path).collect();
        if matching.is_empty() {
            return None;
        }
        // loading a page is governed by its read rule when there is one
        let reads: Vec<&&PermissionRule> = matching.iter().filter(|r| r.is_read_action()).collect();
        if reads.is_empty() {
            Some(matching.iter().any(|r| r.expects_allow(role)))
        } else {
            Some(reads.iter().any(|r| r.expects_allow(role)))
        }
    }
}

impl<F> ExpectedAccess for F
where
    F: Fn(&str, &str) -> Option<bool>,
{
    fn expected(&self, role: &str, path: &str) -> Option<bool> {
        self(role, path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    UnexpectedlyGranted,
    UnexpectedlyDenied,
}

/// Observed accessibility disagreeing with the declared expectation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatrixAnomaly {
    pub role: String,
    pub path: String,
    pub kind: AnomalyKind,
    pub expected: bool,
    pub observed: bool,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CellAccess {
    Granted,
    Denied,
    NotTested,
}

impl std::fmt::Display for CellAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellAccess::Granted => write!(f, "granted"),
            CellAccess::Denied => write!(f, "denied"),
            CellAccess::NotTested => write!(f, "not_tested"),
        }
    }
}

/// Boolean accessibility per role (rows) and path (columns)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMatrix {
    pub roles: Vec<String>,
    pub paths: Vec<String>,
    pub access_matrix: Vec<Vec<bool>>,
    /// Whether the role probed the path at all
    pub tested: Vec<Vec<bool>>,
    /// Response time of successful probes
    pub response_times_ms: Vec<Vec<Option<u64>>>,
}

impl ComparisonMatrix {
    /// Rows follow the map's role order, columns the sorted union of probed paths
    pub fn from_discoveries(discoveries: &BTreeMap<String, PathDiscovery>) -> AccessResult<Self> {
        let roles: Vec<String> = discoveries.keys().cloned().collect();
        let paths: Vec<String> = discoveries
            .values()
            .flat_map(|d| d.results.iter().map(|r| r.path.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut access_matrix = Vec::with_capacity(roles.len());
        let mut tested = Vec::with_capacity(roles.len());
        let mut response_times_ms = Vec::with_capacity(roles.len());

        for role in &roles {
            let by_path: BTreeMap<&str, &PathResult> = discoveries[role]
                .results
                .iter()
                .map(|r| (r.path.as_str(), r))
                .collect();
            let cells: Vec<Option<&PathResult>> = paths.iter().map(|p| by_path.get(p.as_str()).copied()).collect();

            access_matrix.push(cells.iter().map(|c| c.is_some_and(|r| r.accessible)).collect());
            tested.push(cells.iter().map(Option::is_some).collect());
            response_times_ms.push(
                cells
                    .iter()
                    .map(|c| c.filter(|r| !r.is_failure()).map(|r| r.response_time_ms))
                    .collect(),
            );
        }

        let matrix = Self {
            roles,
            paths,
            access_matrix,
            tested,
            response_times_ms,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// One row per role, one column per path in every grid
    pub fn validate(&self) -> AccessResult<()> {
        let grids = [
            ("accessMatrix", self.access_matrix.iter().map(Vec::len).collect::<Vec<_>>()),
            ("tested", self.tested.iter().map(Vec::len).collect()),
            ("responseTimesMs", self.response_times_ms.iter().map(Vec::len).collect()),
        ];
        for (name, rows) in grids {
            if rows.len() != self.roles.len() {
                return Err(AccessError::Validation(format!(
                    "{} has {} rows for {} roles",
                    name,
                    rows.len(),
                    self.roles.len()
                )));
            }
            if let Some(len) = rows.iter().find(|l| **l != self.paths.len()) {
                return Err(AccessError::Validation(format!(
                    "{} row has {} columns for {} paths",
                    name,
                    len,
                    self.paths.len()
                )));
            }
        }
        Ok(())
    }

    pub fn role_index(&self, role: &str) -> Option<usize> {
        self.roles.iter().position(|r| r == role)
    }

    pub fn path_index(&self, path: &str) -> Option<usize> {
        self.paths.binary_search_by(|p| p.as_str().cmp(path)).ok()
    }

    pub fn cell(&self, role: usize, path: usize) -> CellAccess {
        if !self.tested[role][path] {
            CellAccess::NotTested
        } else if self.access_matrix[role][path] {
            CellAccess::Granted
        } else {
            CellAccess::Denied
        }
    }

    /// `None` when the role never probed the path
    pub fn access(&self, role: &str, path: &str) -> Option<bool> {
        let (r, p) = (self.role_index(role)?, self.path_index(path)?);
        self.tested[r][p].then(|| self.access_matrix[r][p])
    }

    pub fn granted_roles(&self, path: usize) -> Vec<&str> {
        self.roles
            .iter()
            .enumerate()
            .filter(|(r, _)| self.access_matrix[*r][path])
            .map(|(_, role)| role.as_str())
            .collect()
    }

    pub fn accessible_paths(&self, role: usize) -> Vec<&str> {
        self.paths
            .iter()
            .enumerate()
            .filter(|(p, _)| self.access_matrix[role][*p])
            .map(|(_, path)| path.as_str())
            .collect()
    }

    /// Paths every role reached
    pub fn common_access(&self) -> Vec<String> {
        if self.roles.is_empty() {
            return Vec::new();
        }
        (0..self.paths.len())
            .filter(|p| self.access_matrix.iter().all(|row| row[*p]))
            .map(|p| self.paths[p].clone())
            .collect()
    }

    /// Paths reached by exactly one role, keyed by that role
    pub fn unique_access(&self) -> BTreeMap<String, Vec<String>> {
        let mut unique: BTreeMap<String, Vec<String>> =
            self.roles.iter().map(|r| (r.clone(), Vec::new())).collect();
        for p in 0..self.paths.len() {
            let granted = self.granted_roles(p);
            if let [only] = granted.as_slice() {
                if let Some(paths) = unique.get_mut(*only) {
                    paths.push(self.paths[p].clone());
                }
            }
        }
        unique
    }

    /// Tested cells whose accessibility disagrees with the expectation
    pub fn find_anomalies(&self, expected: &dyn ExpectedAccess) -> Vec<MatrixAnomaly> {
        let mut anomalies = Vec::new();
        for (r, role) in self.roles.iter().enumerate() {
            for (p, path) in self.paths.iter().enumerate() {
                if !self.tested[r][p] {
                    continue;
                }
                let Some(expect) = expected.expected(role, path) else {
                    continue;
                };
                let observed = self.access_matrix[r][p];
                if expect == observed {
                    continue;
                }
                let (kind, risk_level) = if observed {
                    (AnomalyKind::UnexpectedlyGranted, RiskLevel::High)
                } else {
                    (AnomalyKind::UnexpectedlyDenied, RiskLevel::Medium)
                };
                anomalies.push(MatrixAnomaly {
                    role: role.clone(),
                    path: path.clone(),
                    kind,
                    expected: expect,
                    observed,
                    risk_level,
                });
            }
        }
        anomalies
    }

    /// Sanitize a CSV field to prevent CSV injection
    /// Prefixes values starting with =, +, -, @, or tab with a single quote
    fn sanitize_csv_field(field: &str) -> String {
        let field = field.replace(',', "%2C").replace('"', "\"\"");
        if field.starts_with(['=', '+', '-', '@', '\t', '\r', '\n']) {
            format!("'{}", field)
        } else {
            field
        }
    }

    /// Export as CSV, one row per path
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Path");
        for role in &self.roles {
            csv.push(',');
            csv.push_str(&Self::sanitize_csv_field(role));
        }
        csv.push('\n');

        for (p, path) in self.paths.iter().enumerate() {
            csv.push_str(&Self::sanitize_csv_field(path));
            for r in 0..self.roles.len() {
                csv.push(',');
                csv.push_str(&self.cell(r, p).to_string());
            }
            csv.push('\n');
        }
        csv
    }
}
