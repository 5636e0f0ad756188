//! Readings payloads: one slice per poll, one tagged record per device

use super::timestamp;
use crate::error::{CombinedEnergyError, Result};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Time-aligned numeric samples; `None` when the field is absent
pub type Series = Option<Vec<Option<f64>>>;

/// Time-aligned text samples
pub type TextSeries = Option<Vec<Option<String>>>;

/// Response of `GET /dataAccess/readings`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingsSlice {
    #[serde(deserialize_with = "timestamp::instant")]
    pub range_start: DateTime<Utc>,

    #[serde(deserialize_with = "timestamp::instant")]
    pub range_end: DateTime<Utc>,

    /// Number of samples in the window; 0 is a valid empty window
    pub range_count: u32,

    /// Sample width in seconds
    pub seconds: u32,

    pub installation_id: i64,

    #[serde(deserialize_with = "timestamp::instant")]
    pub server_time: DateTime<Utc>,

    #[serde(default)]
    pub devices: Vec<DeviceReading>,
}

impl ReadingsSlice {
    /// Decode and validate a readings payload
    pub fn from_value(value: Value) -> Result<Self> {
        let slice: Self = serde_json::from_value(value)?;
        slice.validate()?;
        Ok(slice)
    }

    /// Decode and validate raw response bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let slice: Self = serde_json::from_slice(bytes)?;
        slice.validate()?;
        Ok(slice)
    }

    /// Check that every device's sequences line up with its timestamps
    pub fn validate(&self) -> Result<()> {
        if self.range_end < self.range_start {
            return Err(CombinedEnergyError::decode(format!(
                "readings window ends ({}) before it starts ({})",
                self.range_end, self.range_start
            )));
        }
        self.devices
            .iter()
            .try_for_each(DeviceReading::check_alignment)
    }

    pub fn is_empty(&self) -> bool {
        self.range_count == 0
    }

    pub fn device(&self, device_id: i64) -> Option<&DeviceReading> {
        self.devices
            .iter()
            .find(|d| d.device_id() == Some(device_id))
    }

    /// Known devices keyed by id; readings without an id or of an unknown type are left out
    pub fn by_device(&self) -> BTreeMap<i64, DeviceReading> {
        self.devices
            .iter()
            .filter(|d| !d.is_unknown())
            .filter_map(|d| d.device_id().map(|id| (id, d.clone())))
            .collect()
    }
}

/// Fields every device reading carries
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonReadings {
    #[serde(default)]
    pub device_id: Option<i64>,

    #[serde(default, deserialize_with = "timestamp::optional_instant")]
    pub range_start: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "timestamp::optional_instant")]
    pub range_end: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "timestamp::instants")]
    pub timestamp: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub sample_secs: Option<Vec<Option<i64>>>,
}

/// Operation status and consumption fields shared by consumer devices
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerReadings {
    #[serde(default)]
    pub operation_status: TextSeries,
    #[serde(default)]
    pub operation_message: TextSeries,
    #[serde(default)]
    pub energy_consumed: Series,
    #[serde(default)]
    pub energy_consumed_solar: Series,
    #[serde(default)]
    pub energy_consumed_battery: Series,
    #[serde(default)]
    pub energy_consumed_grid: Series,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinerReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(default)]
    pub energy_supplied: Series,
    #[serde(default)]
    pub energy_supplied_solar: Series,
    #[serde(default)]
    pub energy_supplied_battery: Series,
    #[serde(default)]
    pub energy_supplied_grid: Series,
    #[serde(default)]
    pub energy_consumed: Series,
    #[serde(default)]
    pub energy_consumed_solar: Series,
    #[serde(default)]
    pub energy_consumed_battery: Series,
    #[serde(default)]
    pub energy_consumed_grid: Series,
    #[serde(default)]
    pub energy_correction: Series,
    #[serde(default)]
    pub temperature: Series,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolarPvReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(default)]
    pub operation_status: TextSeries,
    #[serde(default)]
    pub operation_message: TextSeries,
    #[serde(default)]
    pub energy_supplied: Series,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridMeterReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(default)]
    pub operation_status: TextSeries,
    #[serde(default)]
    pub operation_message: TextSeries,
    #[serde(default)]
    pub energy_supplied: Series,
    #[serde(default)]
    pub energy_consumed: Series,
    #[serde(default)]
    pub energy_consumed_solar: Series,
    #[serde(default)]
    pub energy_consumed_battery: Series,
    #[serde(default)]
    pub power_factor_a: Series,
    #[serde(default)]
    pub power_factor_b: Series,
    #[serde(default)]
    pub power_factor_c: Series,
    #[serde(default)]
    pub voltage_a: Series,
    #[serde(default)]
    pub voltage_b: Series,
    #[serde(default)]
    pub voltage_c: Series,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenericConsumerReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(flatten)]
    pub consumer: ConsumerReadings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterHeaterReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(flatten)]
    pub consumer: ConsumerReadings,
    #[serde(default)]
    pub available_energy: Series,
    #[serde(default)]
    pub max_energy: Series,
    #[serde(default, rename = "s1")]
    pub temp_sensor1: Series,
    #[serde(default, rename = "s2")]
    pub temp_sensor2: Series,
    #[serde(default, rename = "s3")]
    pub temp_sensor3: Series,
    #[serde(default, rename = "s4")]
    pub temp_sensor4: Series,
    #[serde(default, rename = "s5")]
    pub temp_sensor5: Series,
    #[serde(default, rename = "s6")]
    pub temp_sensor6: Series,
}

impl WaterHeaterReadings {
    /// Stored energy as a percentage of capacity, per sample
    pub fn available_percentage(&self) -> Series {
        let available = self.available_energy.as_ref()?;
        let max = self.max_energy.as_ref()?;
        let len = available.len().max(max.len());
        Some(
            (0..len)
                .map(|i| {
                    let a = available.get(i).copied().flatten()?;
                    let m = max.get(i).copied().flatten()?;
                    Some(if m > 0.0 { a / m * 100.0 } else { 0.0 })
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnergyBalanceReadings {
    #[serde(flatten)]
    pub common: CommonReadings,
    #[serde(flatten)]
    pub consumer: ConsumerReadings,
}

/// Per-device readings, discriminated by the `deviceType` tag
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReading {
    Combiner(CombinerReadings),
    SolarPv(SolarPvReadings),
    GridMeter(GridMeterReadings),
    GenericConsumer(GenericConsumerReadings),
    WaterHeater(WaterHeaterReadings),
    EnergyBalance(EnergyBalanceReadings),
    /// Device type this client does not model
    Unknown {
        device_type: String,
        device_id: Option<i64>,
    },
}

impl<'de> Deserialize<'de> for DeviceReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let device_type = value
            .get("deviceType")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("deviceType"))?
            .to_string();

        let reading = match device_type.as_str() {
            "COMBINER" => serde_json::from_value(value).map(Self::Combiner),
            "SOLAR_PV" => serde_json::from_value(value).map(Self::SolarPv),
            "GRID_METER" => serde_json::from_value(value).map(Self::GridMeter),
            "GENERIC_CONSUMER" => serde_json::from_value(value).map(Self::GenericConsumer),
            "WATER_HEATER" => serde_json::from_value(value).map(Self::WaterHeater),
            "ENERGY_BALANCE" => serde_json::from_value(value).map(Self::EnergyBalance),
            _ => Ok(Self::Unknown {
                device_id: value.get("deviceId").and_then(Value::as_i64),
                device_type,
            }),
        };
        reading.map_err(D::Error::custom)
    }
}

/// Present numeric series, keyed by wire name
fn present<'a>(fields: &[(&'static str, &'a Series)]) -> Vec<(&'static str, &'a [Option<f64>])> {
    fields
        .iter()
        .filter_map(|(key, series)| series.as_deref().map(|s| (*key, s)))
        .collect()
}

fn consumer_series(consumer: &ConsumerReadings) -> Vec<(&'static str, &Series)> {
    vec![
        ("energyConsumed", &consumer.energy_consumed),
        ("energyConsumedSolar", &consumer.energy_consumed_solar),
        ("energyConsumedBattery", &consumer.energy_consumed_battery),
        ("energyConsumedGrid", &consumer.energy_consumed_grid),
    ]
}

impl DeviceReading {
    /// Wire value of the `deviceType` tag
    pub fn device_type(&self) -> &str {
        match self {
            Self::Combiner(_) => "COMBINER",
            Self::SolarPv(_) => "SOLAR_PV",
            Self::GridMeter(_) => "GRID_METER",
            Self::GenericConsumer(_) => "GENERIC_CONSUMER",
            Self::WaterHeater(_) => "WATER_HEATER",
            Self::EnergyBalance(_) => "ENERGY_BALANCE",
            Self::Unknown { device_type, .. } => device_type,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    pub fn common(&self) -> Option<&CommonReadings> {
        match self {
            Self::Combiner(r) => Some(&r.common),
            Self::SolarPv(r) => Some(&r.common),
            Self::GridMeter(r) => Some(&r.common),
            Self::GenericConsumer(r) => Some(&r.common),
            Self::WaterHeater(r) => Some(&r.common),
            Self::EnergyBalance(r) => Some(&r.common),
            Self::Unknown { .. } => None,
        }
    }

    pub fn device_id(&self) -> Option<i64> {
        match self {
            Self::Unknown { device_id, .. } => *device_id,
            known => known.common().and_then(|c| c.device_id),
        }
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        match self.common() {
            Some(common) => &common.timestamp,
            None => &[],
        }
    }

    /// All numeric series the device reported, keyed by wire name
    pub fn numeric_series(&self) -> Vec<(&'static str, &[Option<f64>])> {
        match self {
            Self::Combiner(r) => present(&[
                ("energySupplied", &r.energy_supplied),
                ("energySuppliedSolar", &r.energy_supplied_solar),
                ("energySuppliedBattery", &r.energy_supplied_battery),
                ("energySuppliedGrid", &r.energy_supplied_grid),
                ("energyConsumed", &r.energy_consumed),
                ("energyConsumedSolar", &r.energy_consumed_solar),
                ("energyConsumedBattery", &r.energy_consumed_battery),
                ("energyConsumedGrid", &r.energy_consumed_grid),
                ("energyCorrection", &r.energy_correction),
                ("temperature", &r.temperature),
            ]),
            Self::SolarPv(r) => present(&[("energySupplied", &r.energy_supplied)]),
            Self::GridMeter(r) => present(&[
                ("energySupplied", &r.energy_supplied),
                ("energyConsumed", &r.energy_consumed),
                ("energyConsumedSolar", &r.energy_consumed_solar),
                ("energyConsumedBattery", &r.energy_consumed_battery),
                ("powerFactorA", &r.power_factor_a),
                ("powerFactorB", &r.power_factor_b),
                ("powerFactorC", &r.power_factor_c),
                ("voltageA", &r.voltage_a),
                ("voltageB", &r.voltage_b),
                ("voltageC", &r.voltage_c),
            ]),
            Self::GenericConsumer(r) => present(&consumer_series(&r.consumer)),
            Self::EnergyBalance(r) => present(&consumer_series(&r.consumer)),
            Self::WaterHeater(r) => {
                let mut fields = consumer_series(&r.consumer);
                fields.extend([
                    ("availableEnergy", &r.available_energy),
                    ("maxEnergy", &r.max_energy),
                    ("s1", &r.temp_sensor1),
                    ("s2", &r.temp_sensor2),
                    ("s3", &r.temp_sensor3),
                    ("s4", &r.temp_sensor4),
                    ("s5", &r.temp_sensor5),
                    ("s6", &r.temp_sensor6),
                ]);
                present(&fields)
            }
            Self::Unknown { .. } => Vec::new(),
        }
    }

    /// Numeric series by wire name, e.g. `energyConsumed`
    pub fn series(&self, key: &str) -> Option<&[Option<f64>]> {
        self.numeric_series()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, s)| s)
    }

    fn text_series(&self) -> Vec<(&'static str, usize)> {
        let (status, message) = match self {
            Self::SolarPv(r) => (&r.operation_status, &r.operation_message),
            Self::GridMeter(r) => (&r.operation_status, &r.operation_message),
            Self::GenericConsumer(r) => (&r.consumer.operation_status, &r.consumer.operation_message),
            Self::WaterHeater(r) => (&r.consumer.operation_status, &r.consumer.operation_message),
            Self::EnergyBalance(r) => (&r.consumer.operation_status, &r.consumer.operation_message),
            Self::Combiner(_) | Self::Unknown { .. } => return Vec::new(),
        };
        [("operationStatus", status), ("operationMessage", message)]
            .into_iter()
            .filter_map(|(key, s)| s.as_ref().map(|s| (key, s.len())))
            .collect()
    }

    /// Every present sequence must have one entry per timestamp
    pub fn check_alignment(&self) -> Result<()> {
        let expected = self.timestamps().len();
        let lengths = self
            .numeric_series()
            .into_iter()
            .map(|(key, s)| (key, s.len()))
            .chain(self.text_series());
        for (key, len) in lengths {
            if len != expected {
                return Err(CombinedEnergyError::decode(format!(
                    "{} device {:?}: '{}' has {} samples for {} timestamps",
                    self.device_type(),
                    self.device_id(),
                    key,
                    len,
                    expected
                )));
            }
        }
        Ok(())
    }
}
