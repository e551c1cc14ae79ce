//! Reusable session records.

use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::pool::state::{Membership, PoolEvent};

/// A pooled login session: identity, origin and liveness timestamps.
///
/// Records are owned by the pool and recycled through the idle partition.
/// Callers only ever see snapshot clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    account_id: Option<String>,
    session_id: Option<String>,
    origin: Option<String>,
    login_time: Option<SystemTime>,
    created_at: Option<Instant>,
    last_access: Option<Instant>,
    membership: Membership,
    use_count: u64,
    lease: u64,
}

impl SessionRecord {
    /// Creates a blank record outside both partitions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Origin address attached after a successful login.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn login_time(&self) -> Option<SystemTime> {
        self.login_time
    }

    pub fn created_at(&self) -> Option<Instant> {
        self.created_at
    }

    pub fn last_access(&self) -> Option<Instant> {
        self.last_access
    }

    /// Number of touches since the session was borrowed. A fresh borrow
    /// starts at 0; the borrow itself is not counted as a use.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// Identifies one borrow of this record. Never reused within a pool, so
    /// a snapshot from an earlier login cannot be mistaken for a later one
    /// that happens to carry the same session id. Zero outside the active
    /// partition.
    pub fn lease(&self) -> u64 {
        self.lease
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    /// True iff the record occupies the idle or active partition.
    pub fn in_pool(&self) -> bool {
        self.membership.in_pool()
    }

    /// Clears identity and timing fields and takes the record out of the pool.
    /// Idempotent.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Refreshes liveness. Only meaningful while the record is active.
    pub fn touch(&mut self) {
        self.last_access = Some(Instant::now());
        self.use_count += 1;
    }

    /// Returns true if the record has not been accessed within `timeout`.
    /// A record that was never stamped is stale.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_access {
            Some(last) => now.saturating_duration_since(last) > timeout,
            None => true,
        }
    }

    /// True if `other` is a snapshot of this exact borrow.
    pub(crate) fn same_lease(&self, other: &SessionRecord) -> bool {
        self.lease != 0
            && self.lease == other.lease
            && self.session_id == other.session_id
            && self.account_id == other.account_id
    }

    /// Reinitializes the record for a new owner and marks it active.
    pub(crate) fn activate(
        &mut self,
        account_id: &str,
        session_id: String,
        lease: u64,
        now: Instant,
    ) {
        debug_assert!(self.membership.accepts(PoolEvent::Borrow));
        self.reset();
        self.account_id = Some(account_id.to_string());
        self.session_id = Some(session_id);
        self.lease = lease;
        self.created_at = Some(now);
        self.last_access = Some(now);
        self.membership = Membership::Absent.transition(PoolEvent::Borrow);
    }

    /// Blanks the record and parks it in the idle partition.
    pub(crate) fn park(&mut self) {
        let next = self.membership.transition(PoolEvent::Park);
        self.reset();
        self.membership = next;
    }

    /// Blanks the record and drops it from the pool.
    pub(crate) fn discard(&mut self) {
        self.reset();
        self.membership = self.membership.transition(PoolEvent::Discard);
    }

    /// Marks a freshly created spare as idle.
    pub(crate) fn into_idle(mut self) -> Self {
        self.membership = Membership::Idle;
        self
    }

    pub(crate) fn decorate(&mut self, origin: &str, login_time: SystemTime) {
        self.origin = Some(origin.to_string());
        self.login_time = Some(login_time);
    }
}
