//! Installation record: site details, devices and power management channels

use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Site metadata returned by `GET /dataAccess/installation`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(rename = "installationId")]
    pub id: i64,

    #[serde(default, rename = "installationName")]
    pub name: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub dmg_id: Option<i64>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub mqtt_account_kura: Option<String>,

    #[serde(default)]
    pub mqtt_broker_ems: Option<String>,

    /// IANA zone name, e.g. `Australia/Sydney`
    #[serde(default)]
    pub timezone: String,

    #[serde(default)]
    pub street_address: Option<String>,

    #[serde(default)]
    pub locality: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub postcode: Option<String>,

    #[serde(default)]
    pub review_status: Option<String>,

    #[serde(default)]
    pub nmi: Option<String>,

    #[serde(default)]
    pub phase: Option<i64>,

    #[serde(default)]
    pub org_id: Option<i64>,

    #[serde(default)]
    pub brand: Option<String>,

    #[serde(default)]
    pub tariff_plan_id: Option<i64>,

    #[serde(default, deserialize_with = "timestamp::optional_instant")]
    pub tariff_plan_accepted: Option<DateTime<Utc>>,

    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default, rename = "pm")]
    pub power_management: Option<PowerManagement>,
}

impl Installation {
    /// Device with the given id
    pub fn device(&self, device_id: i64) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    /// Parsed site timezone; `None` when the name is unknown
    pub fn tz(&self) -> Option<chrono_tz::Tz> {
        self.timezone.parse().ok()
    }
}

/// Device registered at an installation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "deviceId")]
    pub id: i64,

    #[serde(default)]
    pub ref_name: String,

    #[serde(default, rename = "displayName")]
    pub name: String,

    pub device_type: String,

    #[serde(default, rename = "deviceManufacturer")]
    pub manufacturer: Option<String>,

    #[serde(default, rename = "deviceModelName")]
    pub model_name: Option<String>,

    #[serde(default, rename = "deviceSerialNumber")]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub storage_device: bool,

    #[serde(default)]
    pub supplier_device: bool,

    #[serde(default)]
    pub consumer_device: bool,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub max_power_supply: Option<i64>,

    #[serde(default)]
    pub max_power_consumption: Option<i64>,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub assets: Vec<String>,
}

/// Power-management channel wiring
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PowerManagement {
    #[serde(default)]
    pub config: Vec<PowerManagementConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PowerManagementConfig {
    pub name: String,

    #[serde(default)]
    pub channels: Vec<PowerManagementChannel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PowerManagementChannel {
    #[serde(rename = "ch")]
    pub channel: i64,

    #[serde(rename = "ph")]
    pub phase: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_installation() {
        let installation: Installation = serde_json::from_value(json!({
            "installationId": 1234,
            "timezone": "Australia/Sydney",
            "postcode": "2000",
            "tariffPlanId": 42,
            "tariffPlanAccepted": 1744527110,
            "devices": [
                {"deviceId": 1, "deviceType": "GRID_METER", "displayName": "Grid"},
                {"deviceId": 2, "deviceType": "WATER_HEATER", "storageDevice": true}
            ],
            "pm": {"config": [{"name": "hws", "channels": [{"ch": 1, "ph": "A"}]}]}
        }))
        .unwrap();

        assert_eq!(installation.id, 1234);
        assert_eq!(installation.tz(), Some(chrono_tz::Australia::Sydney));
        assert_eq!(installation.device(1).map(|d| d.name.as_str()), Some("Grid"));
        assert!(installation.device(2).is_some_and(|d| d.storage_device));
        assert!(installation.device(3).is_none());
        assert!(installation.tariff_plan_accepted.is_some());
        let pm = installation.power_management.unwrap();
        assert_eq!(pm.config[0].channels[0].phase, "A");
    }

    #[test]
    fn unknown_timezone_is_none() {
        let installation: Installation =
            serde_json::from_value(json!({"installationId": 1, "timezone": "Mars/Olympus"}))
                .unwrap();
        assert!(installation.tz().is_none());
    }
}
