//! Session pool configuration.

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::GuardError;

/// Sizing and timing parameters for a [`SessionPool`](crate::pool::SessionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Hard cap on concurrently active sessions.
    pub max_total: usize,
    /// Upper bound on spare records kept for reuse.
    pub max_idle: usize,
    /// Spare records kept warm by maintenance.
    pub min_idle: usize,
    /// How long a borrow may wait for a free slot.
    pub max_wait: Duration,
    /// Liveness window; sessions untouched for longer are stale.
    pub session_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 100,
            max_idle: 20,
            min_idle: 5,
            max_wait: Duration::from_secs(5),
            session_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with the default sizing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from raw integer parameters, timings in milliseconds.
    pub fn from_millis(
        max_total: usize,
        max_idle: usize,
        min_idle: usize,
        max_wait_millis: u64,
        session_timeout_millis: u64,
    ) -> Self {
        Self {
            max_total,
            max_idle,
            min_idle,
            max_wait: Duration::from_millis(max_wait_millis),
            session_timeout: Duration::from_millis(session_timeout_millis),
        }
    }

    pub fn max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self
    }

    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Checks the sizing rules. Fails on the first violated rule.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.max_total == 0 {
            return Err(GuardError::InvalidConfig("max_total must be > 0".into()));
        }
        if self.max_total > Semaphore::MAX_PERMITS {
            return Err(GuardError::InvalidConfig(format!(
                "max_total ({}) cannot exceed {}",
                self.max_total,
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_idle == 0 {
            return Err(GuardError::InvalidConfig("max_idle must be > 0".into()));
        }
        if self.max_wait.is_zero() {
            return Err(GuardError::InvalidConfig("max_wait must be > 0".into()));
        }
        if self.session_timeout.is_zero() {
            return Err(GuardError::InvalidConfig(
                "session_timeout must be > 0".into(),
            ));
        }
        if self.max_idle > self.max_total {
            return Err(GuardError::InvalidConfig(format!(
                "max_idle ({}) cannot be greater than max_total ({})",
                self.max_idle, self.max_total
            )));
        }
        if self.min_idle > self.max_idle {
            return Err(GuardError::InvalidConfig(format!(
                "min_idle ({}) cannot be greater than max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        Ok(())
    }
}
