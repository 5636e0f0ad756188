//! Periodic refresh coordinators
//!
//! A [`Coordinator`] wraps one [`Poller`] and runs it on a fixed interval. It
//! keeps the latest successful value visible to readers (stale-but-available),
//! remembers the last error, counts outcomes and publishes a [`RefreshEvent`]
//! for every attempt.

use crate::error::{CombinedEnergyError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

pub mod log_session;
pub mod readings;
pub mod tariff;

pub use log_session::LogSessionPoller;
pub use readings::{EmptyWindowPolicy, ReadingsPoller, ReadingsSnapshot};
pub use tariff::{TariffPoller, TariffSnapshot};

/// One unit of periodic work
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Short name used in logs and refresh events
    fn name(&self) -> &'static str;

    /// Installation the poller works for, once known; tags the coordinator's log lines
    fn installation_id(&self) -> Option<i64> {
        None
    }

    async fn poll(&self) -> Result<Self::Output>;
}

/// Result of one refresh attempt
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success,
    Failed(CombinedEnergyError),
}

/// Published after every refresh attempt
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    pub coordinator: &'static str,
    pub outcome: RefreshOutcome,
    pub at: DateTime<Utc>,
}

impl RefreshEvent {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::Success)
    }
}

pub struct Coordinator<P: Poller> {
    poller: P,
    interval: Duration,
    value: watch::Sender<Option<Arc<P::Output>>>,
    last_error: RwLock<Option<CombinedEnergyError>>,
    successes: AtomicU64,
    failures: AtomicU64,
    events: Option<broadcast::Sender<RefreshEvent>>,
    refreshing: Mutex<()>,
    log_context: LogContext,
}

impl<P: Poller> Coordinator<P> {
    pub fn new(poller: P, interval: Duration) -> Self {
        let (value, _) = watch::channel(None);
        let log_context = LogContext::new(poller.name());
        Self {
            poller,
            interval,
            value,
            last_error: RwLock::new(None),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            events: None,
            refreshing: Mutex::new(()),
            log_context,
        }
    }

    /// Publish refresh outcomes on `events`
    pub fn with_events(mut self, events: broadcast::Sender<RefreshEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Tag log lines with the owning run
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.log_context = self.log_context.with_run_id(run_id.to_string());
        self
    }

    pub fn name(&self) -> &'static str {
        self.poller.name()
    }

    /// Logger carrying the run id and, once known, the installation id
    pub fn logger(&self) -> StructuredLogger {
        let context = self.log_context.clone();
        get_logger_with_context(match self.poller.installation_id() {
            Some(id) => context.with_installation_id(id),
            None => context,
        })
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Latest successfully produced value, or `None` before the first success
    pub fn current_value(&self) -> Option<Arc<P::Output>> {
        self.value.borrow().clone()
    }

    /// Error of the most recent refresh; cleared by a success
    pub fn last_error(&self) -> Option<CombinedEnergyError> {
        match self.last_error.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Watch the latest value
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<P::Output>>> {
        self.value.subscribe()
    }

    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn set_last_error(&self, error: Option<CombinedEnergyError>) {
        match self.last_error.write() {
            Ok(mut guard) => *guard = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }

    fn publish(&self, outcome: RefreshOutcome) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            let _ = events.send(RefreshEvent {
                coordinator: self.poller.name(),
                outcome,
                at: Utc::now(),
            });
        }
    }

    /// Run the poller once and record the outcome.
    ///
    /// Refreshes of one coordinator never overlap; a failure leaves the previous
    /// value in place.
    pub async fn refresh(&self) -> Result<Arc<P::Output>> {
        let _running = self.refreshing.lock().await;
        let started = std::time::Instant::now();

        match self.poller.poll().await {
            Ok(output) => {
                let output = Arc::new(output);
                self.value.send_replace(Some(output.clone()));
                self.set_last_error(None);
                self.successes.fetch_add(1, Ordering::Relaxed);
                self.logger().debug(&format!(
                    "Refresh succeeded in {} ms",
                    started.elapsed().as_millis()
                ));
                self.publish(RefreshOutcome::Success);
                Ok(output)
            }
            Err(e) => {
                self.set_last_error(Some(e.clone()));
                self.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_auth() {
                    self.logger().error(&format!("Refresh failed: {}", e));
                } else {
                    self.logger().warn(&format!("Refresh failed: {}", e));
                }
                self.publish(RefreshOutcome::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Refresh on the coordinator's interval until `shutdown` flips or its sender goes away.
    ///
    /// The first tick is one interval after start; the initial refresh belongs to the caller.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.logger()
            .info(&format!("Refreshing every {:?}", self.interval));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.refresh() => {}
                        _ = shutdown.changed() => {
                            self.logger().info("Shutdown during refresh, abandoning it");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
        self.logger().info("Stopped");
    }
}
