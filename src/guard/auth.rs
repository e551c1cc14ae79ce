//! Credential verification consulted before the session guard.

use std::fmt;

use crate::error::GuardError;

/// Login credentials as submitted by the client.
#[derive(Clone)]
pub struct Credentials {
    pub account_id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Verifies credentials before a session is requested from the pool.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    /// Verify the given credentials.
    /// Return `Ok(())` to accept, or `Err(GuardError)` to reject.
    async fn verify(&self, credentials: &Credentials) -> Result<(), GuardError>;
}
