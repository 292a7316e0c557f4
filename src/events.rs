// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Shared ledger of console and network events.
//!
//! Every page opened through the session pool gets a `RoleObserver` feeding
//! this ledger. Probes take a `LedgerMarker` before acting and read back only
//! the events recorded after it, so detection never sees stale signals.
//! Network events are also kept in a bounded ring for API surface discovery.

use crate::driver::{ConsoleMessage, NetworkExchange, PageObserver};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default size of the network capture ring
pub const DEFAULT_NETWORK_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Console(ConsoleMessage),
    Network(NetworkExchange),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserEvent {
    pub seq: u64,
    pub role: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Position in the ledger; events after it belong to the probe that took it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LedgerMarker(u64);

#[derive(Debug, Default)]
struct LedgerInner {
    next_seq: u64,
    events: VecDeque<BrowserEvent>,
    network: VecDeque<(String, NetworkExchange)>,
}

#[derive(Debug)]
pub struct EventLedger {
    inner: RwLock<LedgerInner>,
    event_capacity: usize,
    network_capacity: usize,
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_CAPACITY)
    }
}

impl EventLedger {
    pub fn new(network_capacity: usize) -> Self {
        let network_capacity = network_capacity.max(1);
        Self {
            inner: RwLock::new(LedgerInner::default()),
            // console + network events combined; old entries fall off the front
            event_capacity: network_capacity * 10,
            network_capacity,
        }
    }

    pub fn mark(&self) -> LedgerMarker {
        LedgerMarker(self.inner.read().next_seq)
    }

    pub fn record(&self, role: &str, kind: EventKind) {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        if let EventKind::Network(exchange) = &kind {
            if inner.network.len() >= self.network_capacity {
                inner.network.pop_front();
            }
            inner.network.push_back((role.to_string(), exchange.clone()));
        }

        if inner.events.len() >= self.event_capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(BrowserEvent {
            seq,
            role: role.to_string(),
            kind,
        });
    }

    /// Events recorded after `marker`, optionally for one role only
    pub fn events_since(&self, marker: LedgerMarker, role: Option<&str>) -> Vec<BrowserEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.seq >= marker.0)
            .filter(|e| role.map_or(true, |r| e.role == r))
            .cloned()
            .collect()
    }

    pub fn console_since(&self, marker: LedgerMarker, role: &str) -> Vec<ConsoleMessage> {
        self.events_since(marker, Some(role))
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Console(message) => Some(message),
                EventKind::Network(_) => None,
            })
            .collect()
    }

    pub fn network_since(&self, marker: LedgerMarker, role: &str) -> Vec<NetworkExchange> {
        self.events_since(marker, Some(role))
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Network(exchange) => Some(exchange),
                EventKind::Console(_) => None,
            })
            .collect()
    }

    /// Most recent captured exchanges for a role, oldest first
    pub fn recent_network(&self, role: &str, limit: usize) -> Vec<NetworkExchange> {
        let inner = self.inner.read();
        let matching: Vec<&NetworkExchange> = inner
            .network
            .iter()
            .filter(|(r, _)| r == role)
            .map(|(_, e)| e)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn network_len(&self) -> usize {
        self.inner.read().network.len()
    }

    pub fn network_capacity(&self) -> usize {
        self.network_capacity
    }
}

/// Page observer tagging events with the role that produced them
pub struct RoleObserver {
    role: String,
    ledger: Arc<EventLedger>,
}

impl RoleObserver {
    pub fn new(role: &str, ledger: Arc<EventLedger>) -> Self {
        Self {
            role: role.to_string(),
            ledger,
        }
    }
}

impl PageObserver for RoleObserver {
    fn on_console(&self, message: ConsoleMessage) {
        self.ledger.record(&self.role, EventKind::Console(message));
    }

    fn on_network(&self, exchange: NetworkExchange) {
        self.ledger.record(&self.role, EventKind::Network(exchange));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(url: &str) -> NetworkExchange {
        NetworkExchange {
            method: "GET".to_string(),
            url: url.to_string(),
            status: 200,
            content_type: None,
            request_body: None,
        }
    }

    fn console(text: &str) -> ConsoleMessage {
        ConsoleMessage {
            level: "log".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_marker_scopes_events() {
        let ledger = EventLedger::default();
        ledger.record("user", EventKind::Console(console("stale")));
        let marker = ledger.mark();
        ledger.record("user", EventKind::Console(console("fresh")));
        ledger.record("admin", EventKind::Console(console("other role")));

        let seen = ledger.console_since(marker, "user");
        assert_eq!(seen, vec![console("fresh")]);
        assert_eq!(ledger.events_since(marker, None).len(), 2);
    }

    #[test]
    fn test_network_ring_evicts_oldest() {
        let ledger = EventLedger::new(3);
        for i in 0..5 {
            ledger.record("user", EventKind::Network(exchange(&format!("/api/{}", i))));
        }
        assert_eq!(ledger.network_len(), 3);

        let recent = ledger.recent_network("user", 10);
        let urls: Vec<&str> = recent.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/api/2", "/api/3", "/api/4"]);

        let last = ledger.recent_network("user", 1);
        assert_eq!(last[0].url, "/api/4");
    }

    #[test]
    fn test_role_observer_tags_events() {
        let ledger = Arc::new(EventLedger::default());
        let observer = RoleObserver::new("tenant_admin", ledger.clone());
        let marker = ledger.mark();
        observer.on_network(exchange("/api/users"));
        observer.on_console(console("hello"));

        assert_eq!(ledger.network_since(marker, "tenant_admin").len(), 1);
        assert!(ledger.network_since(marker, "guest").is_empty());
    }
}
