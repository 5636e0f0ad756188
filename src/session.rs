//! Login session management for the Combined Energy client
//!
//! This module owns the short-lived JWT used by every authenticated call:
//! it logs in on demand, caches the credential until it expires, collapses
//! concurrent logins into one request and re-authenticates once when the
//! upstream rejects a credential with 401.

use crate::clock::{Clock, system_clock};
use crate::config::AccountConfig;
use crate::error::{CombinedEnergyError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::models::{LoginRequest, LoginResponse, decode};
use crate::transport::Transport;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Bearer token with its validity window
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    jwt: String,
    issued_at: DateTime<Utc>,
    validity_minutes: i64,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("jwt", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("validity_minutes", &self.validity_minutes)
            .finish()
    }
}

impl Credential {
    pub fn new(jwt: impl Into<String>, issued_at: DateTime<Utc>, validity_minutes: i64) -> Self {
        Self {
            jwt: jwt.into(),
            issued_at,
            validity_minutes,
        }
    }

    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn validity_minutes(&self) -> i64 {
        self.validity_minutes
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::minutes(self.validity_minutes)
    }

    /// Expired strictly after `issued_at + validity_minutes`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// Credential cache for one account identity
pub struct SessionManager {
    transport: Arc<Transport>,
    login_url: String,
    account: AccountConfig,
    clock: Clock,
    credential: Mutex<Option<Arc<Credential>>>,
    logins: AtomicU64,
    logger: StructuredLogger,
}

impl SessionManager {
    pub fn new(transport: Arc<Transport>, user_access_url: &str, account: AccountConfig) -> Self {
        Self {
            transport,
            login_url: format!("{}/user/Login", user_access_url.trim_end_matches('/')),
            account,
            clock: system_clock(),
            credential: Mutex::new(None),
            logins: AtomicU64::new(0),
            logger: get_logger("session"),
        }
    }

    /// Use `clock` for expiry checks and issue times
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Account identity this cache is keyed by
    pub fn identity(&self) -> &str {
        &self.account.identity
    }

    /// Number of authentication requests made so far
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Cached credential if it has not expired
    pub async fn current(&self) -> Option<Arc<Credential>> {
        let now = (self.clock)();
        self.credential
            .lock()
            .await
            .as_ref()
            .filter(|c| !c.is_expired_at(now))
            .cloned()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.current().await.is_some()
    }

    /// Return the cached credential, logging in when there is none or it expired.
    ///
    /// The cache lock is held across the login request, so callers arriving
    /// while a login is in flight wait for it and share its result.
    pub async fn login(&self) -> Result<Arc<Credential>> {
        let mut slot = self.credential.lock().await;
        if let Some(credential) = slot.as_ref()
            && !credential.is_expired_at((self.clock)())
        {
            return Ok(credential.clone());
        }
        if slot.is_some() {
            self.logger.info("Credential expired, logging in again");
        }

        let credential = Arc::new(self.authenticate().await?);
        *slot = Some(credential.clone());
        Ok(credential)
    }

    /// Forget the cached credential
    pub async fn invalidate(&self) {
        *self.credential.lock().await = None;
    }

    /// Replace `rejected` with a fresh credential.
    ///
    /// When another caller already replaced it, that newer credential is returned
    /// without a second login.
    pub async fn relogin(&self, rejected: &Credential) -> Result<Arc<Credential>> {
        let mut slot = self.credential.lock().await;
        if let Some(credential) = slot.as_ref()
            && credential.jwt != rejected.jwt
            && !credential.is_expired_at((self.clock)())
        {
            return Ok(credential.clone());
        }
        *slot = None;

        let credential = Arc::new(self.authenticate().await?);
        *slot = Some(credential.clone());
        Ok(credential)
    }

    /// Run `op` with a valid credential, re-authenticating once on 401.
    ///
    /// A second 401 after the fresh login is reported as `Auth`.
    pub async fn with_reauth<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<Credential>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.login().await?;
        match op(credential.clone()).await {
            Err(e) if e.is_unauthorized() => {
                self.logger
                    .info("Credential rejected with 401, forcing a new login");
                let fresh = self.relogin(&credential).await?;
                op(fresh).await.map_err(|e| {
                    if e.is_unauthorized() {
                        CombinedEnergyError::auth("Request rejected with 401 after a fresh login")
                    } else {
                        e
                    }
                })
            }
            outcome => outcome,
        }
    }

    async fn authenticate(&self) -> Result<Credential> {
        if self.account.identity.is_empty() || self.account.password.is_empty() {
            return Err(CombinedEnergyError::config(
                "Account identity and password are required",
            ));
        }

        self.logins.fetch_add(1, Ordering::Relaxed);
        self.logger.debug("Logging in");
        let issued_at = (self.clock)();
        let body = serde_json::to_value(LoginRequest {
            mobile_or_email: &self.account.identity,
            password: &self.account.password,
        })?;

        let response = self
            .transport
            .post(&self.login_url, &body)
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    CombinedEnergyError::auth("Login rejected with 401")
                } else {
                    e
                }
            })?;

        let login: LoginResponse = decode(response)?;
        if !login.is_ok() {
            let reason = login.error.unwrap_or_else(|| "Login failed".to_string());
            self.logger.warn(&format!("Login failed: {}", reason));
            return Err(CombinedEnergyError::auth(reason));
        }

        let jwt = login
            .jwt
            .ok_or_else(|| CombinedEnergyError::decode("Login response without jwt"))?;
        let validity_minutes = login
            .expire_minutes
            .ok_or_else(|| CombinedEnergyError::decode("Login response without expireMins"))?;

        self.logger.info(&format!(
            "Logged in, credential valid for {} minutes",
            validity_minutes
        ));
        Ok(Credential::new(jwt, issued_at, validity_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_boundary_is_exclusive() {
        let issued = Utc.with_ymd_and_hms(2025, 4, 13, 6, 51, 50).unwrap();
        let credential = Credential::new("xxxx", issued, 180);
        assert_eq!(
            credential.expires_at(),
            Utc.with_ymd_and_hms(2025, 4, 13, 9, 51, 50).unwrap()
        );
        assert!(!credential.is_expired_at(issued));
        assert!(!credential.is_expired_at(issued + Duration::minutes(179)));
        assert!(!credential.is_expired_at(issued + Duration::minutes(180)));
        assert!(credential.is_expired_at(issued + Duration::minutes(180) + Duration::seconds(1)));
    }

    #[test]
    fn debug_hides_token() {
        let credential = Credential::new("secret-token", Utc::now(), 180);
        assert!(!format!("{:?}", credential).contains("secret-token"));
    }
}
