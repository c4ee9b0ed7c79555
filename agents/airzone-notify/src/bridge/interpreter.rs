//! Device Update Interpreter
//!
//! Keeps the per-connection view of the installation (zone names and the
//! last seen global mode / eco preset) and turns device updates into
//! notification decisions.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::bridge::device::{
    eco_conf_name, mode_name, DeviceChange, UNNAMED_ZONE, ZONE_DEVICE_TYPE,
};
use crate::cloud::types::Installation;
use crate::notify::sink::Notification;

/// Zone id to display name
pub type DeviceRegistry = BTreeMap<String, String>;

/// Last notified values, used to suppress repeats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedState {
    pub mode: Option<i64>,
    pub eco_conf: Option<String>,
}

/// Stateful interpreter for one connection
pub struct DeviceInterpreter {
    installation: Installation,
    registry: DeviceRegistry,
    tracked: TrackedState,
}

impl DeviceInterpreter {
    pub fn new(installation: Installation) -> Self {
        Self {
            installation,
            registry: DeviceRegistry::new(),
            tracked: TrackedState::default(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn tracked(&self) -> &TrackedState {
        &self.tracked
    }

    /// Record the name of a zone. Other device types are ignored.
    pub fn handle_device_state(&mut self, device_id: &str, device_type: &str, name: Option<&str>) {
        if device_type != ZONE_DEVICE_TYPE {
            return;
        }

        let name = name.unwrap_or(UNNAMED_ZONE);
        debug!(device_id = %device_id, name = %name, "Zone registered");
        self.registry.insert(device_id.to_string(), name.to_string());
    }

    /// Log the zone list once the initial device states are complete
    pub fn finalize_device_registry(&self) {
        info!(
            installation = %self.installation.name,
            zones = ?self.registry,
            "Zone list"
        );
    }

    /// Evaluate a raw device change and return the notifications it warrants
    pub fn handle_device_update(&mut self, device_id: &str, raw: &Value) -> Vec<Notification> {
        let change = DeviceChange::from_raw(raw);
        let device_name = self
            .registry
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| device_id.to_string());
        let installation = self.installation.name.clone();

        let mut notifications = Vec::new();
        let mut recognized = false;

        if let Some(setpoint) = change.setpoint_air_stop {
            info!(
                installation = %installation,
                zone = %device_name,
                celsius = setpoint.celsius,
                "Setpoint updated"
            );
            notifications.push(
                Notification::new(
                    format!("{installation} - Setpoint updated"),
                    format!(
                        "The setpoint was set to **{}°C** in zone **{device_name}**.",
                        setpoint.celsius
                    ),
                )
                .with_tag("thermometer"),
            );
            recognized = true;
        }

        if let Some(power) = change.power {
            let state = if power { "activated" } else { "deactivated" };
            info!(installation = %installation, zone = %device_name, power, "Power updated");
            notifications.push(
                Notification::new(
                    format!("{installation} - Power {state}"),
                    format!("Power was **{state}** in zone **{device_name}**."),
                )
                .with_tag("zap"),
            );
            recognized = true;
        }

        if let Some(mode) = change.mode {
            if self.tracked.mode != Some(mode) {
                self.tracked.mode = Some(mode);
                info!(
                    installation = %installation,
                    zone = %device_name,
                    mode = mode_name(mode),
                    "Mode changed"
                );
                notifications.push(
                    Notification::new(
                        format!("{installation} - Mode changed"),
                        format!("The mode was changed to **{}**.", mode_name(mode)),
                    )
                    .with_tag("gear"),
                );
            }
            recognized = true;
        }

        if let Some(eco_conf) = change.eco_conf {
            if self.tracked.eco_conf.as_ref() != Some(&eco_conf) {
                info!(
                    installation = %installation,
                    zone = %device_name,
                    eco_conf = eco_conf_name(&eco_conf),
                    "Eco mode changed"
                );
                notifications.push(
                    Notification::new(
                        format!("{installation} - Eco mode changed"),
                        format!("The eco mode was changed to **{}**.", eco_conf_name(&eco_conf)),
                    )
                    .with_tag("seedling"),
                );
                self.tracked.eco_conf = Some(eco_conf);
            }
            recognized = true;
        }

        if let Some(sleep) = change.sleep {
            info!(installation = %installation, zone = %device_name, sleep, "Sleep timer updated");
            notifications.push(
                Notification::new(
                    format!("{installation} - Sleep timer updated"),
                    format!("The sleep timer was set to **{sleep} hours** in zone **{device_name}**."),
                )
                .with_tag("zzz"),
            );
            recognized = true;
        }

        if let Some(antifreeze) = change.antifreeze {
            let state = if antifreeze { "enabled" } else { "disabled" };
            info!(installation = %installation, zone = %device_name, antifreeze, "Antifreeze updated");
            notifications.push(
                Notification::new(
                    format!("{installation} - Antifreeze updated"),
                    format!("Antifreeze protection was **{state}** in zone **{device_name}**."),
                )
                .with_tag("snowflake"),
            );
            recognized = true;
        }

        if let Some(new_name) = change.name {
            info!(
                installation = %installation,
                zone = %device_name,
                new_name = %new_name,
                "Zone renamed"
            );
            notifications.push(
                Notification::new(
                    format!("{installation} - Zone renamed"),
                    format!("Zone **{device_name}** was renamed to **{new_name}**."),
                )
                .with_tag("label"),
            );
            self.registry.insert(device_id.to_string(), new_name);
            recognized = true;
        }

        if !recognized {
            debug!(
                installation = %installation,
                zone = %device_name,
                change = %raw,
                "Update received without notification"
            );
        }

        notifications
    }
}
