//! # Combined Energy - polling client for the Combined Energy monitoring cloud
//!
//! Logs in to the Combined Energy API, keeps the upstream log session alive
//! and periodically fetches device readings and tariff details, exposing the
//! latest decoded snapshot of each for a home-automation host to consume.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `transport`: HTTP execution with retry on 503
//! - `session`: Credential cache, expiry and re-login on 401
//! - `client`: Typed API calls shared by all pollers
//! - `models`: Payload decoding (installation, readings, tariff)
//! - `coordinator`: Periodic refresh of log session, readings and tariff
//! - `orchestrator`: Startup refresh and lifecycle of the three loops

pub mod client;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use client::CombinedEnergyClient;
pub use config::Config;
pub use error::{CombinedEnergyError, Result};
pub use orchestrator::Orchestrator;
