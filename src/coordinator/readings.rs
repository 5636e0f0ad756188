//! Readings poller with a moving time cursor
//!
//! Each poll requests the window from the end of the previous slice up to
//! now. The cursor only moves after a successful decode, so a failed poll is
//! retried from the same start. Upstream stops sending samples without an
//! error when its log session lapses; a run of empty windows therefore
//! triggers a log session renewal before the next fetch.

use super::{Coordinator, LogSessionPoller, Poller};
use crate::client::CombinedEnergyClient;
use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::error::Result;
use crate::models::{DeviceReading, ReadingsSlice};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// When a run of empty windows forces a log session renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyWindowPolicy {
    /// Trailing windows inspected; 0 disables renewal
    pub threshold: usize,
    /// Forget the inspected windows after a successful renewal
    pub reset_after_renewal: bool,
}

impl Default for EmptyWindowPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            reset_after_renewal: true,
        }
    }
}

impl EmptyWindowPolicy {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            threshold: config.empty_window_threshold,
            reset_after_renewal: config.reset_streak_after_renewal,
        }
    }

    pub fn disabled() -> Self {
        Self {
            threshold: 0,
            reset_after_renewal: true,
        }
    }

    fn record(&self, history: &mut VecDeque<bool>, empty: bool) {
        if self.threshold == 0 {
            return;
        }
        history.push_back(empty);
        while history.len() > self.threshold {
            history.pop_front();
        }
    }

    fn should_renew(&self, history: &VecDeque<bool>) -> bool {
        self.threshold > 0 && history.len() == self.threshold && history.iter().all(|e| *e)
    }
}

#[derive(Debug, Default)]
struct Cursor {
    last_range_end: Option<DateTime<Utc>>,
    empty_windows: VecDeque<bool>,
}

/// Latest readings window plus the known devices in it
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingsSnapshot {
    pub slice: ReadingsSlice,
    pub devices: BTreeMap<i64, DeviceReading>,
}

impl ReadingsSnapshot {
    pub fn new(slice: ReadingsSlice) -> Self {
        let devices = slice.by_device();
        Self { slice, devices }
    }

    pub fn device(&self, device_id: i64) -> Option<&DeviceReading> {
        self.devices.get(&device_id)
    }
}

pub struct ReadingsPoller {
    client: Arc<CombinedEnergyClient>,
    keeper: Arc<Coordinator<LogSessionPoller>>,
    clock: Clock,
    increment: u32,
    policy: EmptyWindowPolicy,
    cursor: Mutex<Cursor>,
}

impl ReadingsPoller {
    pub fn new(
        client: Arc<CombinedEnergyClient>,
        keeper: Arc<Coordinator<LogSessionPoller>>,
        clock: Clock,
        increment: u32,
        policy: EmptyWindowPolicy,
    ) -> Self {
        Self {
            client,
            keeper,
            clock,
            increment,
            policy,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn policy(&self) -> EmptyWindowPolicy {
        self.policy
    }

    /// End of the last successfully fetched window
    pub async fn last_range_end(&self) -> Option<DateTime<Utc>> {
        self.cursor.lock().await.last_range_end
    }

    /// Trailing "window was empty" flags, oldest first
    pub async fn empty_history(&self) -> Vec<bool> {
        self.cursor.lock().await.empty_windows.iter().copied().collect()
    }
}

#[async_trait]
impl Poller for ReadingsPoller {
    type Output = ReadingsSnapshot;

    fn name(&self) -> &'static str {
        "readings"
    }

    fn installation_id(&self) -> Option<i64> {
        self.client.installation_id()
    }

    async fn poll(&self) -> Result<ReadingsSnapshot> {
        let mut cursor = self.cursor.lock().await;
        let logger = self.client.logger("readings");

        if self.policy.should_renew(&cursor.empty_windows) {
            logger.info(&format!(
                "Last {} readings windows were empty, renewing log session",
                self.policy.threshold
            ));
            match self.keeper.refresh().await {
                Ok(_) if self.policy.reset_after_renewal => cursor.empty_windows.clear(),
                Ok(_) => {}
                Err(e) => logger.warn(&format!("Log session renewal failed: {}", e)),
            }
        }

        let range_start = cursor.last_range_end;
        let range_end = (self.clock)();
        let slice = self
            .client
            .readings(range_start, Some(range_end), self.increment)
            .await?;
        // The first fetch is what resolves the installation
        let logger = self.client.logger("readings");

        cursor.last_range_end = Some(slice.range_end);
        self.policy.record(&mut cursor.empty_windows, slice.is_empty());

        for device in slice.devices.iter().filter(|d| d.is_unknown()) {
            logger.warn(&format!(
                "Ignoring readings for unsupported device type {} (device {:?})",
                device.device_type(),
                device.device_id()
            ));
        }
        logger.debug(&format!(
            "Fetched {} samples up to {}",
            slice.range_count, slice.range_end
        ));

        Ok(ReadingsSnapshot::new(slice))
    }
}
