//! Device Payloads
//!
//! Shapes of the device events pushed by the Airzone Cloud and the
//! operating modes they refer to.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Device type of a climate zone
pub const ZONE_DEVICE_TYPE: &str = "az_zone";

/// Name given to zones that report no name
pub const UNNAMED_ZONE: &str = "(unnamed zone)";

/// Initial state of a device, sent once per device after listening starts
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceState {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    pub device_type: String,
    #[serde(default)]
    pub status: DeviceStateStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceStateStatus {
    pub name: Option<String>,
}

/// Incremental change of a device. The change is kept raw: only the
/// notification triggers are read from it, see [`DeviceChange::from_raw`].
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesUpdates {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    #[serde(default)]
    pub change: Value,
}

/// The notification triggers found in a raw device change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceChange {
    pub setpoint_air_stop: Option<Temperature>,
    pub power: Option<bool>,
    /// Global to every zone of the installation
    pub mode: Option<i64>,
    /// Global to every zone of the installation
    pub eco_conf: Option<String>,
    pub sleep: Option<i64>,
    pub name: Option<String>,
    pub antifreeze: Option<bool>,
}

impl DeviceChange {
    /// Read each trigger on its own. A malformed value only drops that
    /// trigger; other keys of the change are never looked at.
    pub fn from_raw(change: &Value) -> Self {
        Self {
            setpoint_air_stop: trigger(change, "status", "setpoint_air_stop"),
            power: trigger(change, "status", "power"),
            mode: trigger(change, "status", "mode"),
            eco_conf: trigger(change, "status", "eco_conf"),
            sleep: trigger(change, "status", "sleep"),
            name: trigger(change, "status", "name"),
            antifreeze: trigger(change, "user_conf", "antifreeze"),
        }
    }
}

fn trigger<T: DeserializeOwned>(change: &Value, section: &str, key: &str) -> Option<T> {
    let value = change.get(section)?.get(key)?;
    match T::deserialize(value) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(field = %format!("{section}.{key}"), error = %e, "Ignoring malformed field");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Temperature {
    pub celsius: f64,
    #[serde(default)]
    pub fah: f64,
}

/// Operating mode of the installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    Unknown,
    Cooling,
    Heating,
    Ventilation,
    Dehumidifying,
}

impl Mode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Mode::Off),
            1 => Some(Mode::Unknown),
            2 => Some(Mode::Cooling),
            3 => Some(Mode::Heating),
            4 => Some(Mode::Ventilation),
            5 => Some(Mode::Dehumidifying),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Off => "Off",
            Mode::Unknown => "Unknown",
            Mode::Cooling => "Cooling",
            Mode::Heating => "Heating",
            Mode::Ventilation => "Ventilation",
            Mode::Dehumidifying => "Dehumidifying",
        }
    }
}

/// Display name for a raw mode code
pub fn mode_name(code: i64) -> &'static str {
    Mode::from_code(code).map_or("Undefined", |mode| mode.name())
}

/// Eco configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcoConf {
    Disabled,
    Manual,
    EcoA,
    EcoAPlus,
    EcoAPlusPlus,
}

impl EcoConf {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "off" => Some(EcoConf::Disabled),
            "manual" => Some(EcoConf::Manual),
            "a" => Some(EcoConf::EcoA),
            "a_p" => Some(EcoConf::EcoAPlus),
            "a_pp" => Some(EcoConf::EcoAPlusPlus),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EcoConf::Disabled => "Disabled",
            EcoConf::Manual => "Manual",
            EcoConf::EcoA => "Eco A",
            EcoConf::EcoAPlus => "Eco A+",
            EcoConf::EcoAPlusPlus => "Eco A++",
        }
    }
}

/// Display name for a raw eco configuration value
pub fn eco_conf_name(value: &str) -> &'static str {
    EcoConf::from_wire(value).map_or("Undefined", |eco| eco.name())
}

/// Device ids are usually strings but some firmware sends them as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
