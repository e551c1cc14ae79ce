//! Session guard — one active login per account over a bounded session pool.
//!
//! A fixed-capacity pool lends reusable session records to accounts and
//! refuses a second concurrent login for the same account. Stale sessions
//! are evicted by a periodic maintenance pass.
//!
//! # Architecture
//!
//! - **`pool`** — Session records, the idle/active partitions, capacity permits
//! - **`guard`** — `SessionManager` facade: login, logout, validation, maintenance ticker
//! - **`origin`** — Client origin resolution from forwarding headers
//! - **`error`** — `GuardError`, separating duplicate logins from real failures

pub mod error;
pub mod guard;
pub mod origin;
pub mod pool;

pub use error::GuardError;
pub use guard::{LoginOutcome, SessionManager};
pub use pool::{PoolConfig, PoolStats, SessionPool, SessionRecord};
