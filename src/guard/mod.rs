//! Login guard: the facade callers use to log accounts in and out.

pub mod auth;
pub mod maintenance;
pub mod session_manager;

pub use auth::{CredentialVerifier, Credentials};
pub use maintenance::{DEFAULT_MAINTENANCE_PERIOD, MaintenanceTask};
pub use session_manager::{LoginOutcome, SessionManager};
