//! Session pool: reusable records, capacity accounting and exclusivity.

pub mod config;
pub mod record;
pub mod session_pool;
pub mod state;
pub mod stats;

pub use config::PoolConfig;
pub use record::SessionRecord;
pub use session_pool::{MaintenanceReport, SessionPool};
pub use state::{Membership, PoolEvent};
pub use stats::PoolStats;
