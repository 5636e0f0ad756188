//! Tariff poller and the snapshot that prices an instant in site time

use super::Poller;
use crate::client::CombinedEnergyClient;
use crate::error::Result;
use crate::models::TariffDetails;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Tariff plan together with the site timezone it is expressed in
#[derive(Debug, Clone, PartialEq)]
pub struct TariffSnapshot {
    pub details: TariffDetails,
    pub installation_id: i64,
    /// Site timezone; costs are evaluated in UTC when unknown
    pub timezone: Option<chrono_tz::Tz>,
}

impl TariffSnapshot {
    /// Cost applying at `at`, evaluated in the site's local time
    pub fn cost_at(&self, at: DateTime<Utc>) -> Option<f64> {
        match self.timezone {
            Some(tz) => self.details.tariff.cost_at(&at.with_timezone(&tz)),
            None => self.details.tariff.cost_at(&at),
        }
    }

    pub fn current_cost(&self) -> Option<f64> {
        self.cost_at(Utc::now())
    }

    pub fn daily_fee(&self) -> Option<f64> {
        self.details.tariff.daily_fee
    }

    pub fn feed_in_cost(&self) -> Option<f64> {
        self.details.tariff.feed_in_cost
    }
}

pub struct TariffPoller {
    client: Arc<CombinedEnergyClient>,
}

impl TariffPoller {
    pub fn new(client: Arc<CombinedEnergyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Poller for TariffPoller {
    type Output = TariffSnapshot;

    fn name(&self) -> &'static str {
        "tariff"
    }

    fn installation_id(&self) -> Option<i64> {
        self.client.installation_id()
    }

    async fn poll(&self) -> Result<TariffSnapshot> {
        let installation = self.client.installation().await?;
        let details = self.client.tariff_details().await?;
        Ok(TariffSnapshot {
            details,
            installation_id: installation.id,
            timezone: installation.tz(),
        })
    }
}
