//! Login/logout facade over the session pool.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::error::GuardError;
use crate::guard::auth::{CredentialVerifier, Credentials};
use crate::guard::maintenance::{DEFAULT_MAINTENANCE_PERIOD, MaintenanceTask};
use crate::origin::classify;
use crate::pool::{PoolStats, SessionPool, SessionRecord};

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The account now holds the only active session.
    Accepted(SessionRecord),
    /// The account is already logged in elsewhere.
    AlreadyActive { current_origin: Option<String> },
    /// Credentials were refused or the pool could not admit the session.
    Rejected { reason: String, retryable: bool },
}

impl LoginOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Human-readable reason for a refused login.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Accepted(_) => None,
            Self::AlreadyActive {
                current_origin: Some(origin),
            } => Some(format!("account is already logged in from {origin}")),
            Self::AlreadyActive { current_origin: None } => {
                Some("account is already logged in elsewhere".to_string())
            }
            Self::Rejected { reason, .. } => Some(reason.clone()),
        }
    }

    fn rejected(e: &GuardError) -> Self {
        Self::Rejected {
            reason: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// Enforces one active login per account on top of a [`SessionPool`].
///
/// The manager owns the maintenance cadence; the pool never schedules
/// itself.
pub struct SessionManager {
    pool: Arc<SessionPool>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    maintenance: Mutex<Option<MaintenanceTask>>,
}

impl SessionManager {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            pool,
            verifier: None,
            maintenance: Mutex::new(None),
        }
    }

    /// Sets the credential verifier used by [`authenticate_and_login`](Self::authenticate_and_login).
    pub fn verifier(mut self, verifier: impl CredentialVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Attempts to open the account's session under `session_id`.
    pub async fn try_login(&self, account_id: &str, session_id: &str, origin: &str) -> LoginOutcome {
        tracing::debug!(account_id = %account_id, session_id = %session_id, origin = %origin, "login attempt");

        let borrowed = match self.pool.borrow(account_id, Some(session_id)).await {
            Ok(record) => record,
            Err(e) if e.is_duplicate() => {
                let current_origin = self.pool.current_origin(account_id);
                tracing::info!(
                    account_id = %account_id,
                    origin = %origin,
                    current_origin = current_origin.as_deref().unwrap_or("unknown"),
                    "login rejected: account already active elsewhere"
                );
                return LoginOutcome::AlreadyActive { current_origin };
            }
            Err(e @ GuardError::Timeout(_)) => {
                tracing::warn!(account_id = %account_id, code = e.code(), error = %e, "login rejected: pool saturated");
                return LoginOutcome::rejected(&e);
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, code = e.code(), error = %e, "login failed");
                return LoginOutcome::rejected(&e);
            }
        };

        // A logout racing this login may already have removed the session;
        // there is then nothing of ours left to roll back.
        match self.pool.decorate(&borrowed, origin, SystemTime::now()) {
            Ok(record) => {
                tracing::info!(
                    account_id = %account_id,
                    origin = %origin,
                    origin_kind = ?classify(origin),
                    "login succeeded"
                );
                LoginOutcome::Accepted(record)
            }
            Err(e) => {
                tracing::warn!(account_id = %account_id, code = e.code(), error = %e, "session ended before login completed");
                LoginOutcome::rejected(&e)
            }
        }
    }

    /// Returns true if the login was accepted. A `false` means the account is
    /// already active elsewhere or the session could not be admitted.
    pub async fn login(&self, account_id: &str, session_id: &str, origin: &str) -> bool {
        self.try_login(account_id, session_id, origin)
            .await
            .is_accepted()
    }

    /// Verifies credentials, then logs in. Refused credentials never reach the pool.
    pub async fn authenticate_and_login(
        &self,
        credentials: &Credentials,
        session_id: &str,
        origin: &str,
    ) -> LoginOutcome {
        if let Some(ref verifier) = self.verifier
            && let Err(e) = verifier.verify(credentials).await
        {
            tracing::info!(account_id = %credentials.account_id, code = e.code(), error = %e, "credentials rejected");
            return LoginOutcome::rejected(&e);
        }
        self.try_login(&credentials.account_id, session_id, origin)
            .await
    }

    /// Ends the account's session. Never fails from the caller's perspective.
    pub fn logout(&self, account_id: &str) {
        let origin = self.pool.current_origin(account_id);
        match self.pool.invalidate_session(account_id) {
            Ok(true) => {
                tracing::info!(
                    account_id = %account_id,
                    origin = origin.as_deref().unwrap_or("unknown"),
                    "logged out"
                );
            }
            Ok(false) => {
                tracing::debug!(account_id = %account_id, "logout without active session");
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "logout failed");
            }
        }
    }

    /// Kicks the account's session. Returns whether a session was removed.
    pub fn force_logout(&self, account_id: &str) -> bool {
        let origin = self.pool.current_origin(account_id);
        match self.pool.invalidate_session(account_id) {
            Ok(removed) => {
                if removed {
                    tracing::info!(
                        account_id = %account_id,
                        origin = origin.as_deref().unwrap_or("unknown"),
                        "forced logout"
                    );
                }
                removed
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "forced logout failed");
                false
            }
        }
    }

    /// Checks that `session_id` is the account's current session and, if so,
    /// refreshes its liveness.
    pub fn is_valid_session(&self, account_id: &str, session_id: &str) -> bool {
        let valid = self.pool.is_valid_session(account_id, session_id);
        if !valid {
            tracing::debug!(account_id = %account_id, "session check failed");
            return false;
        }
        if let Err(e) = self.pool.update_session_activity(account_id) {
            tracing::error!(account_id = %account_id, error = %e, "failed to refresh session");
            return false;
        }
        tracing::debug!(account_id = %account_id, "session check passed");
        true
    }

    /// Origin address of the account's current session.
    pub fn current_login_ip(&self, account_id: &str) -> Option<String> {
        self.pool.current_origin(account_id)
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Starts periodic maintenance, replacing any running ticker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_maintenance(&self, period: Duration) -> Result<(), GuardError> {
        if period.is_zero() {
            return Err(GuardError::InvalidConfig(
                "maintenance period must be > 0".into(),
            ));
        }
        if self.pool.is_closed() {
            return Err(GuardError::PoolClosed);
        }
        let task = MaintenanceTask::spawn(self.pool.clone(), period);
        if let Some(previous) = self.maintenance.lock().replace(task) {
            previous.stop();
        }
        tracing::debug!(period = ?period, "session maintenance started");
        Ok(())
    }

    /// Starts maintenance with [`DEFAULT_MAINTENANCE_PERIOD`].
    pub fn start_default_maintenance(&self) -> Result<(), GuardError> {
        self.start_maintenance(DEFAULT_MAINTENANCE_PERIOD)
    }

    /// Stops maintenance and shuts the pool down.
    pub fn shutdown(&self) {
        if let Some(task) = self.maintenance.lock().take() {
            task.stop();
        }
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;

    fn manager(max_total: usize) -> SessionManager {
        let pool = SessionPool::new(PoolConfig::from_millis(max_total, 1, 0, 100, 1000)).unwrap();
        SessionManager::new(Arc::new(pool))
    }

    struct FixedPassword(&'static str);

    #[async_trait::async_trait]
    impl CredentialVerifier for FixedPassword {
        async fn verify(&self, credentials: &Credentials) -> Result<(), GuardError> {
            if credentials.secret == self.0 {
                Ok(())
            } else {
                Err(GuardError::Authentication("wrong password".into()))
            }
        }
    }

    #[tokio::test]
    async fn login_records_origin() {
        let mgr = manager(2);
        let outcome = mgr.try_login("stu1", "sidA", "10.0.0.1").await;
        let record = match outcome {
            LoginOutcome::Accepted(record) => record,
            other => panic!("expected accepted login, got {other:?}"),
        };
        assert_eq!(record.origin(), Some("10.0.0.1"));
        assert!(record.login_time().is_some());
        assert_eq!(mgr.current_login_ip("stu1").as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn duplicate_login_reports_current_origin() {
        let mgr = manager(2);
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);

        let outcome = mgr.try_login("stu1", "sidB", "10.0.0.2").await;
        assert_eq!(
            outcome,
            LoginOutcome::AlreadyActive {
                current_origin: Some("10.0.0.1".into())
            }
        );
        assert_eq!(
            outcome.reason().as_deref(),
            Some("account is already logged in from 10.0.0.1")
        );
        assert!(!mgr.login("stu1", "sidC", "10.0.0.3").await);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_pool_is_retryable() {
        let mgr = manager(1);
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);

        let outcome = mgr.try_login("stu2", "sidB", "10.0.0.2").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected {
                retryable: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn logout_frees_account() {
        let mgr = manager(2);
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);
        mgr.logout("stu1");
        mgr.logout("stu1");
        assert_eq!(mgr.current_login_ip("stu1"), None);
        assert!(mgr.login("stu1", "sidB", "10.0.0.2").await);
    }

    #[tokio::test]
    async fn force_logout_reports_removal() {
        let mgr = manager(2);
        assert!(!mgr.force_logout("stu1"));
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);
        assert!(mgr.force_logout("stu1"));
        assert!(!mgr.is_valid_session("stu1", "sidA"));
    }

    #[tokio::test]
    async fn logout_after_shutdown_is_silent() {
        let mgr = manager(2);
        mgr.shutdown();
        mgr.logout("stu1");
        assert!(!mgr.force_logout("stu1"));
        assert!(!mgr.login("stu1", "sidA", "10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_refreshes_liveness() {
        let mgr = manager(2);
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(700)).await;
            assert!(mgr.is_valid_session("stu1", "sidA"));
        }
        assert_eq!(mgr.pool().session("stu1").unwrap().use_count(), 3);
        assert!(!mgr.is_valid_session("stu1", "sidB"));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_fails_after_timeout() {
        let mgr = manager(2);
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(!mgr.is_valid_session("stu1", "sidA"));
    }

    #[tokio::test]
    async fn wrong_credentials_never_touch_pool() {
        let mgr = manager(2).verifier(FixedPassword("secret"));

        let outcome = mgr
            .authenticate_and_login(&Credentials::new("stu1", "nope"), "sidA", "10.0.0.1")
            .await;
        assert!(matches!(outcome, LoginOutcome::Rejected { retryable: false, .. }));
        assert_eq!(mgr.stats().borrowed, 0);

        let outcome = mgr
            .authenticate_and_login(&Credentials::new("stu1", "secret"), "sidA", "10.0.0.1")
            .await;
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn login_snapshot_outlived_by_relogin_is_rejected() {
        let mgr = manager(2);
        let stale = mgr.pool().borrow("stu1", Some("sidA")).await.unwrap();
        mgr.logout("stu1");
        assert!(mgr.login("stu1", "sidB", "10.0.0.2").await);

        let err = mgr
            .pool()
            .decorate(&stale, "10.0.0.1", SystemTime::now())
            .unwrap_err();
        assert_eq!(err.code(), "Session.Internal");
        assert_eq!(mgr.current_login_ip("stu1").as_deref(), Some("10.0.0.2"));
        assert!(mgr.is_valid_session("stu1", "sidB"));
    }

    #[tokio::test]
    async fn relogin_with_same_session_id_survives_old_return() {
        let mgr = manager(2);
        let LoginOutcome::Accepted(first) = mgr.try_login("stu1", "JSESSION1", "10.0.0.1").await
        else {
            panic!("first login should be accepted");
        };
        mgr.logout("stu1");
        assert!(mgr.login("stu1", "JSESSION1", "10.0.0.2").await);

        mgr.pool().return_session(&first).unwrap();
        assert!(mgr.is_valid_session("stu1", "JSESSION1"));
        assert_eq!(mgr.current_login_ip("stu1").as_deref(), Some("10.0.0.2"));
        assert_eq!(mgr.stats().active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_maintenance_runs_every_minute() {
        let mgr = manager(1);
        mgr.start_default_maintenance().unwrap();
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);

        tokio::time::sleep(DEFAULT_MAINTENANCE_PERIOD - Duration::from_secs(1)).await;
        assert_eq!(mgr.stats().active, 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(mgr.stats().active, 0);
        mgr.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_ticker_evicts_and_stops_on_shutdown() {
        let mgr = manager(1);
        assert!(mgr.start_maintenance(Duration::ZERO).is_err());
        mgr.start_maintenance(Duration::from_secs(60)).unwrap();
        assert!(mgr.login("stu1", "sidA", "10.0.0.1").await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(mgr.stats().active, 0);
        assert!(mgr.login("stu2", "sidB", "10.0.0.2").await);

        mgr.shutdown();
        assert!(matches!(
            mgr.start_maintenance(Duration::from_secs(60)),
            Err(GuardError::PoolClosed)
        ));
    }
}
