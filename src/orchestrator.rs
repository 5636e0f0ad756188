//! Owner of the shared client and the three refresh loops
//!
//! The orchestrator wires the log session keeper, readings poller and tariff
//! poller to one [`CombinedEnergyClient`], performs the first refresh of all
//! three concurrently and then lets each run on its own timer until shutdown.

use crate::client::CombinedEnergyClient;
use crate::clock::{Clock, system_clock};
use crate::config::{Config, PollingConfig};
use crate::coordinator::{
    Coordinator, EmptyWindowPolicy, LogSessionPoller, ReadingsPoller, RefreshEvent, TariffPoller,
};
use crate::error::{CombinedEnergyError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;

/// Per-coordinator outcome of the startup refresh
#[derive(Debug)]
pub struct FirstRefresh {
    pub log_session: Result<()>,
    pub readings: Result<()>,
    pub tariff: Result<()>,
}

impl FirstRefresh {
    pub fn all_ok(&self) -> bool {
        self.log_session.is_ok() && self.readings.is_ok() && self.tariff.is_ok()
    }

    /// Failed coordinators by name
    pub fn failures(&self) -> Vec<(&'static str, &CombinedEnergyError)> {
        [
            ("log_session", &self.log_session),
            ("readings", &self.readings),
            ("tariff", &self.tariff),
        ]
        .into_iter()
        .filter_map(|(name, r)| r.as_ref().err().map(|e| (name, e)))
        .collect()
    }
}

pub struct Orchestrator {
    client: Arc<CombinedEnergyClient>,
    log_session: Arc<Coordinator<LogSessionPoller>>,
    readings: Arc<Coordinator<ReadingsPoller>>,
    tariff: Arc<Coordinator<TariffPoller>>,
    events: broadcast::Sender<RefreshEvent>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    run_id: String,
    logger: StructuredLogger,
}

impl Orchestrator {
    /// Validate `config` and build the client and pollers it describes
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(CombinedEnergyClient::new(config)?);
        Ok(Self::from_client(client, &config.polling, system_clock()))
    }

    /// Build the pollers around an existing client
    pub fn from_client(
        client: Arc<CombinedEnergyClient>,
        polling: &PollingConfig,
        clock: Clock,
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        let log_session = Arc::new(
            Coordinator::new(
                LogSessionPoller::new(client.clone()),
                polling.log_session_interval(),
            )
            .with_events(events.clone())
            .with_run_id(&run_id),
        );
        let readings = Arc::new(
            Coordinator::new(
                ReadingsPoller::new(
                    client.clone(),
                    log_session.clone(),
                    clock,
                    polling.readings_increment_secs,
                    EmptyWindowPolicy::from_config(polling),
                ),
                polling.readings_interval(),
            )
            .with_events(events.clone())
            .with_run_id(&run_id),
        );
        let tariff = Arc::new(
            Coordinator::new(TariffPoller::new(client.clone()), polling.tariff_interval())
                .with_events(events.clone())
                .with_run_id(&run_id),
        );

        let logger =
            get_logger_with_context(LogContext::new("orchestrator").with_run_id(run_id.clone()));

        Self {
            client,
            log_session,
            readings,
            tariff,
            events,
            shutdown_tx,
            tasks: Vec::new(),
            run_id,
            logger,
        }
    }

    pub fn client(&self) -> &Arc<CombinedEnergyClient> {
        &self.client
    }

    pub fn log_session(&self) -> &Arc<Coordinator<LogSessionPoller>> {
        &self.log_session
    }

    pub fn readings(&self) -> &Arc<Coordinator<ReadingsPoller>> {
        &self.readings
    }

    pub fn tariff(&self) -> &Arc<Coordinator<TariffPoller>> {
        &self.tariff
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Receive an event for every refresh attempt of any coordinator
    pub fn subscribe_events(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Refresh all three coordinators concurrently and wait for every one of them
    pub async fn first_refresh(&self) -> FirstRefresh {
        self.logger.info("Running first refresh");
        let (log_session, readings, tariff) = tokio::join!(
            self.log_session.refresh(),
            self.readings.refresh(),
            self.tariff.refresh(),
        );
        let report = FirstRefresh {
            log_session: log_session.map(|_| ()),
            readings: readings.map(|_| ()),
            tariff: tariff.map(|_| ()),
        };
        if report.all_ok() {
            self.logger.info("First refresh complete");
        } else {
            for (name, e) in report.failures() {
                self.logger
                    .warn(&format!("First refresh of {} failed: {}", name, e));
            }
        }
        report
    }

    /// Start the periodic loops; a second call is a no-op
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.shutdown_tx.send_replace(false);
        self.tasks = vec![
            tokio::spawn(self.log_session.clone().run(self.shutdown_tx.subscribe())),
            tokio::spawn(self.readings.clone().run(self.shutdown_tx.subscribe())),
            tokio::spawn(self.tariff.clone().run(self.shutdown_tx.subscribe())),
        ];
        self.logger.info("Refresh loops started");
    }

    /// Signal every loop to stop and wait for them
    pub async fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                self.logger
                    .error(&format!("Refresh loop ended abnormally: {}", e));
            }
        }
        self.logger.info("Refresh loops stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
