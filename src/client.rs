//! Authenticated Combined Energy API client
//!
//! One client is shared by every poller. It combines the transport, the
//! credential cache and a cache of the installation record, and exposes the
//! upstream endpoints as typed calls.

use crate::clock::Clock;
use crate::config::{AccountConfig, Config, EndpointsConfig};
use crate::error::{CombinedEnergyError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::models::{
    Installation, LogSession, LogSessionRequest, ReadingsSlice, TariffDetails, decode,
};
use crate::session::{Credential, SessionManager};
use crate::transport::{ConnectionScope, Transport};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

pub struct CombinedEnergyClient {
    transport: Arc<Transport>,
    session: SessionManager,
    endpoints: EndpointsConfig,
    installation: Mutex<Option<Arc<Installation>>>,
    installation_id: RwLock<Option<i64>>,
}

fn trimmed(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl CombinedEnergyClient {
    /// Build a client from configuration; the account must be filled in
    pub fn new(config: &Config) -> Result<Self> {
        if config.account.identity.trim().is_empty() {
            return Err(CombinedEnergyError::config("account.identity is not set"));
        }
        if config.account.password.is_empty() {
            return Err(CombinedEnergyError::config("account.password is not set"));
        }
        let transport = Arc::new(Transport::new(&config.http));
        Ok(Self::from_parts(
            transport,
            config.endpoints.clone(),
            config.account.clone(),
        ))
    }

    /// Build a client around an existing transport
    pub fn from_parts(
        transport: Arc<Transport>,
        endpoints: EndpointsConfig,
        account: AccountConfig,
    ) -> Self {
        let session = SessionManager::new(transport.clone(), &endpoints.user_access, account);
        Self {
            transport,
            session,
            endpoints,
            installation: Mutex::new(None),
            installation_id: RwLock::new(None),
        }
    }

    /// Use `clock` for credential expiry
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.session = self.session.with_clock(clock);
        self
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Hold the connection exclusively; it is closed when the scope ends
    pub fn scoped(&self) -> Result<ConnectionScope<'_>> {
        self.transport.scoped()
    }

    /// Id of the installation once it has been fetched
    pub fn installation_id(&self) -> Option<i64> {
        match self.installation_id.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Logger for `component`, tagged with the installation once known
    pub fn logger(&self, component: &str) -> StructuredLogger {
        let context = LogContext::new(component);
        get_logger_with_context(match self.installation_id() {
            Some(id) => context.with_installation_id(id),
            None => context,
        })
    }

    fn remember_installation(&self, installation: &Installation) {
        match self.installation_id.write() {
            Ok(mut guard) => *guard = Some(installation.id),
            Err(poisoned) => *poisoned.into_inner() = Some(installation.id),
        }
    }

    pub async fn login(&self) -> Result<Arc<Credential>> {
        self.session.login().await
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.is_logged_in().await
    }

    /// Installation record, fetched once and then served from cache
    pub async fn installation(&self) -> Result<Arc<Installation>> {
        let mut slot = self.installation.lock().await;
        if let Some(installation) = slot.as_ref() {
            return Ok(installation.clone());
        }
        let installation = Arc::new(self.fetch_installation().await?);
        *slot = Some(installation.clone());
        Ok(installation)
    }

    /// Installation record if it has been fetched
    pub async fn cached_installation(&self) -> Option<Arc<Installation>> {
        self.installation.lock().await.clone()
    }

    /// Fetch the installation again and replace the cached record
    pub async fn refresh_installation(&self) -> Result<Arc<Installation>> {
        let mut slot = self.installation.lock().await;
        let installation = Arc::new(self.fetch_installation().await?);
        *slot = Some(installation.clone());
        Ok(installation)
    }

    async fn fetch_installation(&self) -> Result<Installation> {
        let url = format!(
            "{}/dataAccess/installation",
            trimmed(&self.endpoints.user_access)
        );
        let url = url.as_str();
        let value = self
            .session
            .with_reauth(|credential| async move {
                self.transport
                    .get(url, &[("jwt", Some(credential.jwt().to_string()))])
                    .await
            })
            .await?;
        let installation: Installation = decode(value)?;
        self.remember_installation(&installation);
        self.logger("client").info(&format!(
            "Loaded installation {} with {} devices",
            installation.id,
            installation.devices.len()
        ));
        Ok(installation)
    }

    /// Renew the upstream log session so readings keep flowing
    pub async fn start_log_session(&self) -> Result<LogSession> {
        let installation = self.installation().await?;
        let url = format!(
            "{}/mqtt2/user/LogSessionStart",
            trimmed(&self.endpoints.mqtt_access)
        );
        let url = url.as_str();
        let installation_id = installation.id;
        let value = self
            .session
            .with_reauth(|credential| async move {
                let body = serde_json::to_value(LogSessionRequest {
                    installation_id,
                    jwt: credential.jwt(),
                })?;
                self.transport.post(url, &body).await
            })
            .await?;

        let session: LogSession = decode(value)?;
        if session.status != "ok" {
            return Err(CombinedEnergyError::generic(format!(
                "Log session start returned status '{}'",
                session.status
            )));
        }
        Ok(session)
    }

    /// Readings between `range_start` and `range_end` at `increment`-second resolution.
    ///
    /// Absent bounds are left for the server to choose.
    pub async fn readings(
        &self,
        range_start: Option<DateTime<Utc>>,
        range_end: Option<DateTime<Utc>>,
        increment: u32,
    ) -> Result<ReadingsSlice> {
        let installation = self.installation().await?;
        let url = format!(
            "{}/dataAccess/readings",
            trimmed(&self.endpoints.data_access)
        );
        let url = url.as_str();
        let installation_id = installation.id.to_string();
        let installation_id = installation_id.as_str();
        let value = self
            .session
            .with_reauth(|credential| async move {
                let query = [
                    ("jwt", Some(credential.jwt().to_string())),
                    ("i", Some(installation_id.to_string())),
                    ("seconds", Some(increment.to_string())),
                    ("rangeStart", range_start.map(|t| t.timestamp().to_string())),
                    ("rangeEnd", range_end.map(|t| t.timestamp().to_string())),
                ];
                self.transport.get(url, &query).await
            })
            .await?;
        ReadingsSlice::from_value(value)
    }

    /// Tariff plan of the installation
    pub async fn tariff_details(&self) -> Result<TariffDetails> {
        let installation = self.installation().await?;
        let url = format!(
            "{}/dataAccess/tariff-details",
            trimmed(&self.endpoints.data_access)
        );
        let url = url.as_str();
        let installation = installation.as_ref();
        let value = self
            .session
            .with_reauth(|credential| async move {
                let query = [
                    ("jwt", Some(credential.jwt().to_string())),
                    ("i", Some(installation.id.to_string())),
                    ("planId", installation.tariff_plan_id.map(|id| id.to_string())),
                    ("postcode", installation.postcode.clone()),
                ];
                self.transport.get(url, &query).await
            })
            .await?;
        decode(value)
    }
}
