//! Pool statistics snapshot.

use std::fmt;

/// Point-in-time counters for a session pool.
///
/// `created`, `borrowed`, `returned` and `discarded` only ever grow;
/// `active` and `idle` are current partition sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub created: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub discarded: u64,
    pub active: usize,
    pub idle: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolStats{{created={}, borrowed={}, returned={}, discarded={}, active={}, idle={}}}",
            self.created, self.borrowed, self.returned, self.discarded, self.active, self.idle
        )
    }
}
