// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role hierarchy as a directed acyclic graph.
//!
//! An edge `R -> S` means "R inherits from S", so R outranks S. Order between
//! two roles is reachability in this graph; declared levels are only checked
//! for consistency with the edges, never compared directly. Roles with no
//! path either way are peers.

use super::model::RoleDefinition;
use crate::errors::{AccessError, AccessResult};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    graph: DiGraph<String, ()>,
    index: BTreeMap<String, NodeIndex>,
    levels: BTreeMap<String, u32>,
}

impl RoleHierarchy {
    /// Build and validate the hierarchy
    pub fn build(definitions: &[RoleDefinition]) -> AccessResult<Self> {
        let mut hierarchy = Self::default();

        for def in definitions {
            if hierarchy.index.contains_key(&def.name) {
                return Err(AccessError::Configuration(format!(
                    "role '{}' defined twice in hierarchy",
                    def.name
                )));
            }
            let idx = hierarchy.graph.add_node(def.name.clone());
            hierarchy.index.insert(def.name.clone(), idx);
            hierarchy.levels.insert(def.name.clone(), def.level);
        }

        for def in definitions {
            let child = hierarchy.index[&def.name];
            for parent in &def.inherit_from {
                let Some(&parent_idx) = hierarchy.index.get(parent) else {
                    return Err(AccessError::Configuration(format!(
                        "role '{}' inherits from undefined role '{}'",
                        def.name, parent
                    )));
                };
                let parent_level = hierarchy.levels[parent];
                if parent_level >= def.level {
                    return Err(AccessError::Configuration(format!(
                        "role '{}' (level {}) inherits from '{}' (level {}): inherited role must rank lower",
                        def.name, def.level, parent, parent_level
                    )));
                }
                hierarchy.graph.add_edge(child, parent_idx, ());
            }
        }

        if let Err(cycle) = toposort(&hierarchy.graph, None) {
            let name = &hierarchy.graph[cycle.node_id()];
            return Err(AccessError::Configuration(format!(
                "role hierarchy contains a cycle through '{}'",
                name
            )));
        }

        Ok(hierarchy)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.index.contains_key(role)
    }

    pub fn level(&self, role: &str) -> Option<u32> {
        self.levels.get(role).copied()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// True when `higher` transitively inherits from `lower`
    pub fn outranks(&self, higher: &str, lower: &str) -> bool {
        if higher == lower {
            return false;
        }
        match (self.index.get(higher), self.index.get(lower)) {
            (Some(&h), Some(&l)) => has_path_connecting(&self.graph, h, l, None),
            _ => false,
        }
    }

    /// `Some(Less)` when `a` ranks below `b`; `None` for peers and unknown roles
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        if a == b {
            return self.contains(a).then_some(Ordering::Equal);
        }
        if self.outranks(b, a) {
            Some(Ordering::Less)
        } else if self.outranks(a, b) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    /// Ordered `(lower, higher)` pairs among `roles`, in input order
    pub fn comparable_pairs(&self, roles: &[String]) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (i, a) in roles.iter().enumerate() {
            for b in roles.iter().skip(i + 1) {
                match self.compare(a, b) {
                    Some(Ordering::Less) => pairs.push((a.clone(), b.clone())),
                    Some(Ordering::Greater) => pairs.push((b.clone(), a.clone())),
                    _ => {}
                }
            }
        }
        pairs
    }
}
