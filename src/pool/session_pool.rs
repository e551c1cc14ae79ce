//! Fixed-capacity session pool with per-account exclusivity.
//!
//! Records move between two partitions: `idle` holds blank spares ready for
//! reuse, `active` holds records assigned to an account, indexed both by
//! session id and by account id. Every change to the active indices happens
//! under one mutex so the two indices never diverge.
//!
//! Capacity is enforced by a semaphore. The permit taken for a borrow is
//! stored inside the active entry, so removing the entry (return, discard,
//! eviction, shutdown) releases the permit exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::GuardError;
use crate::pool::config::PoolConfig;
use crate::pool::record::SessionRecord;
use crate::pool::stats::PoolStats;

/// A record in the active partition together with its capacity permit.
struct ActiveEntry {
    record: SessionRecord,
    _permit: OwnedSemaphorePermit,
}

/// Idle and active partitions. Only touched with the pool mutex held.
#[derive(Default)]
struct Partitions {
    idle: Vec<SessionRecord>,
    active: HashMap<String, ActiveEntry>,
    by_account: HashMap<String, String>,
}

impl Partitions {
    /// Removes the account's active entry from both indices.
    fn take_account(&mut self, account_id: &str) -> Option<ActiveEntry> {
        let session_id = self.by_account.remove(account_id)?;
        self.active.remove(&session_id)
    }

    /// Removes an entry by session id from both indices.
    fn take_session(&mut self, session_id: &str) -> Option<ActiveEntry> {
        let entry = self.active.remove(session_id)?;
        if let Some(account_id) = entry.record.account_id()
            && self.by_account.get(account_id).map(String::as_str) == Some(session_id)
        {
            self.by_account.remove(account_id);
        }
        Some(entry)
    }

    fn active_record(&self, account_id: &str) -> Option<&SessionRecord> {
        let session_id = self.by_account.get(account_id)?;
        self.active.get(session_id).map(|entry| &entry.record)
    }

    fn active_record_mut(&mut self, account_id: &str) -> Option<&mut SessionRecord> {
        let session_id = self.by_account.get(account_id)?;
        self.active.get_mut(session_id).map(|entry| &mut entry.record)
    }

    /// The active record for the exact borrow `snapshot` was taken from.
    fn leased_mut(&mut self, snapshot: &SessionRecord) -> Option<&mut SessionRecord> {
        let entry = self.active.get_mut(snapshot.session_id()?)?;
        entry
            .record
            .same_lease(snapshot)
            .then_some(&mut entry.record)
    }
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    borrowed: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
}

/// Outcome of one [`SessionPool::maintain`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceReport {
    /// Stale active sessions removed.
    pub evicted: usize,
    /// Spare records created to reach `min_idle`.
    pub created: usize,
    /// Spare records dropped to get back under `max_idle`.
    pub trimmed: usize,
}

/// Pool of reusable session records enforcing one active session per account.
pub struct SessionPool {
    config: PoolConfig,
    state: Mutex<Partitions>,
    maintain_lock: Mutex<()>,
    permits: Arc<Semaphore>,
    counters: Counters,
    next_lease: AtomicU64,
    closed: AtomicBool,
}

impl SessionPool {
    /// Validates the configuration and pre-populates `min_idle` spares.
    pub fn new(config: PoolConfig) -> Result<Self, GuardError> {
        config.validate()?;
        let pool = Self {
            permits: Arc::new(Semaphore::new(config.max_total)),
            state: Mutex::new(Partitions::default()),
            maintain_lock: Mutex::new(()),
            counters: Counters::default(),
            next_lease: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
        };
        {
            let mut state = pool.state.lock();
            for _ in 0..pool.config.min_idle {
                state.idle.push(pool.create_record());
            }
        }
        tracing::info!(
            max_total = pool.config.max_total,
            max_idle = pool.config.max_idle,
            min_idle = pool.config.min_idle,
            "session pool initialized"
        );
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Assigns a session record to `account_id`.
    ///
    /// With `session_id` set, the record is keyed by the caller's id;
    /// otherwise a fresh UUID is generated. Fails with
    /// [`GuardError::AlreadyActive`] if the account already holds a live
    /// session, and with [`GuardError::Timeout`] if no slot frees up within
    /// `max_wait`.
    pub async fn borrow(
        &self,
        account_id: &str,
        session_id: Option<&str>,
    ) -> Result<SessionRecord, GuardError> {
        self.ensure_open()?;
        if account_id.trim().is_empty() {
            return Err(GuardError::InvalidRequest(
                "account id cannot be empty".into(),
            ));
        }
        if session_id.is_some_and(|id| id.trim().is_empty()) {
            return Err(GuardError::InvalidRequest(
                "session id cannot be empty".into(),
            ));
        }

        // Fail fast on a duplicate before queueing for a permit.
        self.check_exclusive(&mut self.state.lock(), account_id)?;

        let permit = match tokio::time::timeout(
            self.config.max_wait,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(GuardError::PoolClosed),
            Err(_) => {
                tracing::debug!(
                    account_id = %account_id,
                    max_wait = ?self.config.max_wait,
                    "timed out waiting for a session slot"
                );
                return Err(GuardError::Timeout(self.config.max_wait));
            }
        };

        // From here on every early return drops `permit`, releasing it.
        let mut state = self.state.lock();
        self.ensure_open()?;
        // Another borrow for the same account may have won while we waited.
        self.check_exclusive(&mut state, account_id)?;

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        if state.active.contains_key(&session_id) {
            return Err(GuardError::InvalidRequest(format!(
                "session id {session_id} is already bound to another account"
            )));
        }

        let mut record = match state.idle.pop() {
            Some(record) => record,
            None => self.create_record(),
        };
        let lease = self.next_lease.fetch_add(1, Ordering::Relaxed);
        record.activate(account_id, session_id.clone(), lease, Instant::now());
        let snapshot = record.clone();

        state
            .by_account
            .insert(account_id.to_string(), session_id.clone());
        state.active.insert(
            session_id.clone(),
            ActiveEntry {
                record,
                _permit: permit,
            },
        );
        self.counters.borrowed.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(account_id = %account_id, session_id = %session_id, "session borrowed");
        Ok(snapshot)
    }

    /// Hands a borrowed record back to the pool.
    ///
    /// Stale records, or records arriving while the idle partition is full,
    /// are discarded; the rest are blanked and parked for reuse. Records not
    /// currently in the pool, and snapshots of an earlier borrow whose
    /// session id has since been reused, are ignored.
    pub fn return_session(&self, record: &SessionRecord) -> Result<(), GuardError> {
        self.ensure_open()?;
        let Some(session_id) = record.session_id().filter(|_| record.in_pool()) else {
            return Ok(());
        };

        let mut state = self.state.lock();
        if state.leased_mut(record).is_none() {
            tracing::debug!(session_id = %session_id, "ignoring return of a superseded session");
            return Ok(());
        }
        let Some(entry) = state.take_session(session_id) else {
            return Ok(());
        };
        let ActiveEntry {
            record: mut pooled,
            _permit,
        } = entry;

        let stale = pooled.is_stale(Instant::now(), self.config.session_timeout);
        if stale || state.idle.len() >= self.config.max_idle {
            tracing::debug!(session_id = %session_id, stale, "discarding returned session");
            self.discard(&mut pooled);
        } else {
            pooled.park();
            state.idle.push(pooled);
            self.counters.returned.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id = %session_id, "session returned to idle");
        }
        Ok(())
    }

    /// Removes and discards the account's active session, if any.
    ///
    /// Returns whether a session was removed. Idempotent.
    pub fn invalidate_session(&self, account_id: &str) -> Result<bool, GuardError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        match state.take_account(account_id) {
            Some(mut entry) => {
                self.discard(&mut entry.record);
                tracing::debug!(account_id = %account_id, "session invalidated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns true iff the account is bound to exactly this session id and
    /// the session is still within its liveness window.
    pub fn is_valid_session(&self, account_id: &str, session_id: &str) -> bool {
        let state = self.state.lock();
        if state.by_account.get(account_id).map(String::as_str) != Some(session_id) {
            return false;
        }
        state.active.get(session_id).is_some_and(|entry| {
            !entry
                .record
                .is_stale(Instant::now(), self.config.session_timeout)
        })
    }

    /// Touches the account's session, or invalidates it if it has gone stale.
    pub fn update_session_activity(&self, account_id: &str) -> Result<(), GuardError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let timeout = self.config.session_timeout;
        let live = state
            .active_record(account_id)
            .map(|record| !record.is_stale(Instant::now(), timeout));
        match live {
            Some(true) => {
                if let Some(record) = state.active_record_mut(account_id) {
                    record.touch();
                }
            }
            Some(false) => {
                if let Some(mut entry) = state.take_account(account_id) {
                    self.discard(&mut entry.record);
                }
                tracing::debug!(account_id = %account_id, "stale session invalidated on access");
            }
            None => {
                // Dangling account mapping, if any.
                state.by_account.remove(account_id);
            }
        }
        Ok(())
    }

    /// Attaches login metadata to the session `borrowed` was taken from and
    /// returns the updated snapshot.
    ///
    /// Fails if that borrow is no longer active, even when the account has
    /// since been given a new session.
    pub fn decorate(
        &self,
        borrowed: &SessionRecord,
        origin: &str,
        login_time: SystemTime,
    ) -> Result<SessionRecord, GuardError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let record = state.leased_mut(borrowed).ok_or_else(|| {
            GuardError::Internal(format!(
                "session {} is no longer active",
                borrowed.session_id().unwrap_or_default()
            ))
        })?;
        record.decorate(origin, login_time);
        Ok(record.clone())
    }

    /// Origin address of the account's active session.
    pub fn current_origin(&self, account_id: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .active_record(account_id)
            .and_then(|record| record.origin().map(String::from))
    }

    /// Snapshot of the account's active session.
    pub fn session(&self, account_id: &str) -> Option<SessionRecord> {
        self.state.lock().active_record(account_id).cloned()
    }

    /// Periodic housekeeping: evict stale sessions, then rebalance idle
    /// toward `[min_idle, max_idle]`.
    ///
    /// Concurrent passes do not overlap; a pass that finds another one
    /// running returns an empty report immediately.
    pub fn maintain(&self) -> Result<MaintenanceReport, GuardError> {
        let Some(_pass) = self.maintain_lock.try_lock() else {
            tracing::debug!("maintenance pass already running");
            return Ok(MaintenanceReport::default());
        };
        self.ensure_open()?;

        let mut report = MaintenanceReport::default();
        let timeout = self.config.session_timeout;

        let stale: Vec<String> = {
            let state = self.state.lock();
            let now = Instant::now();
            state
                .active
                .iter()
                .filter(|(_, entry)| entry.record.is_stale(now, timeout))
                .map(|(id, _)| id.clone())
                .collect()
        };

        // One short critical section per eviction; re-check since the
        // session may have been touched or returned in between.
        for session_id in &stale {
            let mut state = self.state.lock();
            let still_stale = state
                .active
                .get(session_id)
                .is_some_and(|entry| entry.record.is_stale(Instant::now(), timeout));
            if !still_stale {
                continue;
            }
            if let Some(mut entry) = state.take_session(session_id) {
                tracing::debug!(
                    session_id = %session_id,
                    account_id = entry.record.account_id().unwrap_or_default(),
                    "evicting stale session"
                );
                self.discard(&mut entry.record);
                report.evicted += 1;
            }
        }

        {
            let mut state = self.state.lock();
            while state.idle.len() < self.config.min_idle {
                state.idle.push(self.create_record());
                report.created += 1;
            }
            while state.idle.len() > self.config.max_idle {
                if let Some(mut record) = state.idle.pop() {
                    self.discard(&mut record);
                    report.trimmed += 1;
                }
            }
        }

        if report != MaintenanceReport::default() {
            tracing::debug!(
                evicted = report.evicted,
                created = report.created,
                trimmed = report.trimmed,
                "session pool maintenance"
            );
        }
        Ok(report)
    }

    /// Closes the pool and discards every record.
    ///
    /// Parked borrowers and all later mutations fail with
    /// [`GuardError::PoolClosed`]. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();

        let mut state = self.state.lock();
        state.by_account.clear();
        let active: Vec<ActiveEntry> = state.active.drain().map(|(_, entry)| entry).collect();
        for mut entry in active {
            self.discard(&mut entry.record);
        }
        let idle = std::mem::take(&mut state.idle);
        for mut record in idle {
            self.discard(&mut record);
        }
        drop(state);

        tracing::info!(stats = %self.stats(), "session pool shut down");
    }

    /// Returns a snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            created: self.counters.created.load(Ordering::Relaxed),
            borrowed: self.counters.borrowed.load(Ordering::Relaxed),
            returned: self.counters.returned.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            active: state.active.len(),
            idle: state.idle.len(),
        }
    }

    // -- Helpers --

    fn ensure_open(&self) -> Result<(), GuardError> {
        if self.is_closed() {
            return Err(GuardError::PoolClosed);
        }
        Ok(())
    }

    /// Rejects the borrow if the account holds a live session. Dangling
    /// mappings and stale sessions are cleared out of the way.
    fn check_exclusive(
        &self,
        state: &mut Partitions,
        account_id: &str,
    ) -> Result<(), GuardError> {
        let live = match state.active_record(account_id) {
            Some(record) => !record.is_stale(Instant::now(), self.config.session_timeout),
            None => {
                state.by_account.remove(account_id);
                return Ok(());
            }
        };
        if live {
            tracing::debug!(account_id = %account_id, "account already holds an active session");
            return Err(GuardError::AlreadyActive {
                account_id: account_id.to_string(),
            });
        }
        if let Some(mut entry) = state.take_account(account_id) {
            tracing::debug!(account_id = %account_id, "replacing stale session");
            self.discard(&mut entry.record);
        }
        Ok(())
    }

    fn create_record(&self) -> SessionRecord {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        SessionRecord::new().into_idle()
    }

    fn discard(&self, record: &mut SessionRecord) {
        record.discard();
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        write!(
            f,
            "SessionPool{{active={}/{}, idle={}/{}, created={}, borrowed={}, returned={}, discarded={}}}",
            stats.active,
            self.config.max_total,
            stats.idle,
            self.config.max_idle,
            stats.created,
            stats.borrowed,
            stats.returned,
            stats.discarded,
        )
    }
}
