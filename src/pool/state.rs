//! Pool membership state machine for session records.

/// Where a session record currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    /// Outside both partitions: freshly allocated or discarded.
    #[default]
    Absent,
    /// Parked in the idle partition, ready for reuse.
    Idle,
    /// Assigned to exactly one account in the active partition.
    Active,
}

/// A pool operation that moves a record between partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// Handed out to an account.
    Borrow,
    /// Returned by its account and kept for reuse.
    Park,
    /// Dropped from the pool: stale return, full idle, eviction, trim, shutdown.
    Discard,
}

impl Membership {
    /// Returns whether the record counts as pooled (idle or active).
    pub fn in_pool(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns whether a given event is valid in this state.
    pub fn accepts(&self, event: PoolEvent) -> bool {
        match self {
            Self::Absent => matches!(event, PoolEvent::Borrow | PoolEvent::Discard),
            Self::Idle => matches!(event, PoolEvent::Borrow | PoolEvent::Discard),
            Self::Active => matches!(event, PoolEvent::Park | PoolEvent::Discard),
        }
    }

    /// Compute the next state after applying an event.
    pub fn transition(&self, event: PoolEvent) -> Self {
        match (self, event) {
            (Self::Absent | Self::Idle, PoolEvent::Borrow) => Self::Active,
            (Self::Active, PoolEvent::Park) => Self::Idle,
            (_, PoolEvent::Discard) => Self::Absent,
            // Rejected by accepts(); state is left alone.
            _ => *self,
        }
    }
}
