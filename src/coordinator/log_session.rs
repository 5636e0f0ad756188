//! Log-session keeper: renews the upstream session that feeds readings

use super::Poller;
use crate::client::CombinedEnergyClient;
use crate::error::Result;
use crate::models::LogSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Keeps the upstream log session alive; readings stop flowing once it lapses
pub struct LogSessionPoller {
    client: Arc<CombinedEnergyClient>,
}

impl LogSessionPoller {
    pub fn new(client: Arc<CombinedEnergyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Poller for LogSessionPoller {
    type Output = LogSession;

    fn name(&self) -> &'static str {
        "log_session"
    }

    fn installation_id(&self) -> Option<i64> {
        self.client.installation_id()
    }

    async fn poll(&self) -> Result<LogSession> {
        self.client.start_log_session().await
    }
}
