// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Role session pool.
//!
//! Owns one isolated driver session per role and hands out pages as
//! `PageLease`s. Upper bounds on concurrent sessions and pages per session are
//! enforced with semaphores: a request beyond the bound queues until a slot
//! frees up or `acquire_timeout` elapses, then fails with `SessionUnavailable`.
//! While the session bound is reached, idle sessions of other roles are
//! evicted; every returned page wakes the queue to look for one again.

use crate::config::ResourceLimits;
use crate::driver::{BrowserSession, Driver, Page};
use crate::errors::{AccessError, AccessResult};
use crate::events::{EventLedger, RoleObserver};
use crate::role::Role;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Notify, OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct SessionSlot {
    session: Arc<dyn BrowserSession>,
    pages: Arc<Semaphore>,
    last_used: Mutex<Instant>,
    _permit: OwnedSemaphorePermit,
}

type SlotCell = Arc<OnceCell<Arc<SessionSlot>>>;

pub struct SessionPool {
    driver: Arc<dyn Driver>,
    roles: BTreeMap<String, Role>,
    limits: ResourceLimits,
    ledger: Arc<EventLedger>,
    session_permits: Arc<Semaphore>,
    slots: Mutex<HashMap<String, SlotCell>>,
    /// Signalled whenever a page goes back to the pool
    page_returned: Arc<Notify>,
}

/// A page checked out of the pool for one role
///
/// Dropping the lease closes the page and frees its slot; `close` does the
/// same but reports driver errors.
pub struct PageLease {
    role: String,
    page: Box<dyn Page>,
    slot: Option<Arc<SessionSlot>>,
    permit: Option<OwnedSemaphorePermit>,
    returned: Arc<Notify>,
}

impl Drop for PageLease {
    fn drop(&mut self) {
        // woken waiters must already see the session idle
        drop(self.permit.take());
        drop(self.slot.take());
        self.returned.notify_waiters();
    }
}

impl PageLease {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub async fn close(mut self) -> AccessResult<()> {
        self.page.close().await.map_err(AccessError::from)
    }
}

impl Deref for PageLease {
    type Target = dyn Page;

    fn deref(&self) -> &Self::Target {
        &*self.page
    }
}

impl DerefMut for PageLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.page
    }
}

impl SessionPool {
    pub fn new(
        driver: Arc<dyn Driver>,
        roles: &[Role],
        limits: ResourceLimits,
        ledger: Arc<EventLedger>,
    ) -> Self {
        info!(
            "[SessionPool] {} roles, max {} sessions x {} pages, memory ceiling {} MB",
            roles.len(),
            limits.max_concurrent_sessions,
            limits.max_pages_per_session,
            limits.memory_ceiling_mb
        );

        Self {
            driver,
            roles: roles.iter().map(|r| (r.name.clone(), r.clone())).collect(),
            session_permits: Arc::new(Semaphore::new(limits.max_concurrent_sessions.max(1))),
            limits,
            ledger,
            slots: Mutex::new(HashMap::new()),
            page_returned: Arc::new(Notify::new()),
        }
    }

    pub fn ledger(&self) -> Arc<EventLedger> {
        self.ledger.clone()
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Roles that can hold a session at the same time, at most `requested`
    pub fn role_parallelism(&self, requested: usize) -> usize {
        requested.clamp(1, self.limits.max_concurrent_sessions.max(1))
    }

    /// Number of sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    fn unavailable(role: &str, reason: impl Into<String>) -> AccessError {
        AccessError::SessionUnavailable {
            role: role.to_string(),
            reason: reason.into(),
        }
    }

    /// Check out a page for `role`, opening the role's session on first use
    pub async fn acquire(&self, role: &str) -> AccessResult<PageLease> {
        let slot = self.session_for(role).await?;

        let permit = tokio::time::timeout(
            self.limits.acquire_timeout(),
            slot.pages.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            Self::unavailable(
                role,
                format!(
                    "all {} pages of the session are busy",
                    self.limits.max_pages_per_session
                ),
            )
        })?
        .map_err(|_| Self::unavailable(role, "session is shutting down"))?;

        let mut page = slot
            .session
            .new_page()
            .await
            .map_err(|e| Self::unavailable(role, e.to_string()))?;
        page.subscribe(Arc::new(RoleObserver::new(role, self.ledger.clone())));
        *slot.last_used.lock() = Instant::now();

        debug!("[SessionPool] Page acquired for role '{}'", role);

        Ok(PageLease {
            role: role.to_string(),
            page,
            slot: Some(slot),
            permit: Some(permit),
            returned: self.page_returned.clone(),
        })
    }

    /// Scoped acquisition: the page is closed on every exit path
    pub async fn with_page<T, F>(&self, role: &str, operation: F) -> AccessResult<T>
    where
        F: for<'a> FnOnce(&'a mut PageLease) -> BoxFuture<'a, AccessResult<T>>,
    {
        let mut lease = self.acquire(role).await?;
        let result = operation(&mut lease).await;
        if let Err(e) = lease.close().await {
            debug!("[SessionPool] Closing page for role '{}' failed: {}", role, e);
        }
        result
    }

    async fn session_for(&self, role: &str) -> AccessResult<Arc<SessionSlot>> {
        let Some(role_def) = self.roles.get(role) else {
            return Err(Self::unavailable(role, "role is not declared"));
        };

        let cell = {
            let mut slots = self.slots.lock();
            slots
                .entry(role.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let slot = cell
            .get_or_try_init(|| self.open_session(role_def))
            .await?;
        Ok(slot.clone())
    }

    async fn open_session(&self, role: &Role) -> AccessResult<Arc<SessionSlot>> {
        let permit = self.session_permit(&role.name).await?;

        info!("[SessionPool] Opening session for role '{}'", role.name);
        let session = self
            .driver
            .open_session(role)
            .await
            .map_err(|e| Self::unavailable(&role.name, e.to_string()))?;

        Ok(Arc::new(SessionSlot {
            session,
            pages: Arc::new(Semaphore::new(self.limits.max_pages_per_session.max(1))),
            last_used: Mutex::new(Instant::now()),
            _permit: permit,
        }))
    }

    /// Wait for a session permit, evicting idle sessions whenever a page returns
    async fn session_permit(&self, role: &str) -> AccessResult<OwnedSemaphorePermit> {
        let deadline = Instant::now() + self.limits.acquire_timeout();
        loop {
            // registered before the checks so a page returned in between still wakes us
            let returned = self.page_returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            if let Ok(permit) = self.session_permits.clone().try_acquire_owned() {
                return Ok(permit);
            }
            if self.evict_idle(role).await {
                continue;
            }

            tokio::select! {
                permit = self.session_permits.clone().acquire_owned() => {
                    return permit.map_err(|_| Self::unavailable(role, "pool is shutting down"));
                }
                _ = &mut returned => {
                    debug!("[SessionPool] Page returned, role '{}' retries for a session", role);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Self::unavailable(
                        role,
                        format!(
                            "pool exhausted: {} sessions in use",
                            self.limits.max_concurrent_sessions
                        ),
                    ));
                }
            }
        }
    }

    /// Close the least recently used session of another role that nobody holds
    async fn evict_idle(&self, requesting: &str) -> bool {
        let max_pages = self.limits.max_pages_per_session.max(1);
        let victim = {
            let mut slots = self.slots.lock();
            let idle = slots
                .iter()
                .filter(|(name, _)| name.as_str() != requesting)
                .filter_map(|(name, cell)| cell.get().map(|slot| (name, slot)))
                // only the pool's own reference left: no lease and no acquire in flight
                .filter(|(_, slot)| {
                    Arc::strong_count(slot) == 1 && slot.pages.available_permits() == max_pages
                })
                .min_by_key(|(_, slot)| *slot.last_used.lock())
                .map(|(name, _)| name.clone());
            idle.and_then(|name| slots.remove(&name).map(|cell| (name, cell)))
        };

        let Some((name, cell)) = victim else {
            return false;
        };
        if let Some(slot) = cell.get() {
            info!("[SessionPool] Evicting idle session of role '{}'", name);
            if let Err(e) = slot.session.close().await {
                warn!("[SessionPool] Closing session of role '{}' failed: {}", name, e);
            }
        }
        true
    }

    /// Close the role's session; the next acquire opens a fresh one
    pub async fn release(&self, role: &str) -> AccessResult<()> {
        let cell = self.slots.lock().remove(role);
        if let Some(slot) = cell.as_ref().and_then(|c| c.get()) {
            debug!("[SessionPool] Releasing session of role '{}'", role);
            slot.session.close().await?;
        }
        Ok(())
    }

    /// Close every open session
    pub async fn shutdown(&self) {
        let cells: Vec<(String, SlotCell)> = self.slots.lock().drain().collect();
        for (role, cell) in cells {
            if let Some(slot) = cell.get() {
                if let Err(e) = slot.session.close().await {
                    warn!("[SessionPool] Closing session of role '{}' failed: {}", role, e);
                }
            }
        }
        info!("[SessionPool] All sessions closed");
    }
}
