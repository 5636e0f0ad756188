//! Typed records decoded from Combined Energy API payloads

mod auth;
mod installation;
mod readings;
pub mod series;
mod tariff;
pub mod timestamp;

pub use auth::{LogSession, LogSessionRequest, LoginRequest, LoginResponse};
pub use installation::{
    Device, Installation, PowerManagement, PowerManagementChannel, PowerManagementConfig,
};
pub use readings::{
    CombinerReadings, CommonReadings, ConsumerReadings, DeviceReading, EnergyBalanceReadings,
    GenericConsumerReadings, GridMeterReadings, ReadingsSlice, Series, SolarPvReadings,
    TextSeries, WaterHeaterReadings,
};
pub use tariff::{Tariff, TariffDetails, TariffGroup};

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode a JSON value into a model, mapping shape mismatches to `Decode`
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
