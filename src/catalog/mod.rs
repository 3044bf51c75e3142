// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device catalog: which VE.Direct fields a device type reports and how
//! each one maps to a Home Assistant sensor.
//!
//! The catalog is plain configuration data. It loads once at startup, either
//! from the built-in defaults shipped with the crate or from a user-supplied
//! JSON document, so new device types never require a rebuild.
//!
//! # Examples
//!
//! ```
//! use vedirect_bridge::DeviceCatalog;
//!
//! let catalog = DeviceCatalog::builtin();
//! let mppt = catalog.device_type("mppt").unwrap();
//!
//! assert_eq!(mppt.model, "BlueSolar 100/50");
//! assert_eq!(mppt.sensors["V"].multiplier, Some(0.001));
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Built-in catalog covering the Victron MPPT charger and SmartShunt.
const DEFAULT_CATALOG: &str = include_str!("../../data/default_catalog.json");

/// How one VE.Direct field becomes a Home Assistant sensor.
///
/// A `multiplier` of `None` marks a categorical field (alarm state, alarm
/// reason): its raw value is published verbatim, with no smoothing. Numeric
/// fields are averaged over a rolling window and scaled by the multiplier
/// before publication.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorDefinition {
    /// Display name of the sensor entity.
    pub name: String,

    /// Unit of measurement, if the field has one.
    #[serde(default)]
    pub unit_of_measurement: Option<String>,

    /// Home Assistant device class, if the field has one.
    #[serde(default)]
    pub device_class: Option<String>,

    /// Home Assistant state class (`measurement`, `total_increasing`, ...).
    pub state_class: String,

    /// Scale applied to the smoothed raw value, or `None` for categorical
    /// fields published verbatim.
    pub multiplier: Option<f64>,

    /// Per-sensor smoothing window override, in samples. When absent the
    /// bridge-wide window from [`BridgeConfig`](crate::BridgeConfig) is used.
    /// Only meaningful for numeric fields.
    #[serde(default)]
    pub window: Option<usize>,
}

/// One device type: its hardware identity plus its sensor definitions,
/// keyed by VE.Direct field code.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceType {
    /// Hardware model string (e.g. `BlueSolar 100/50`).
    pub model: String,

    /// Category prefixed to entity names (`Solar`, `Battery`).
    pub category: String,

    /// Manufacturer reported in the discovery device block.
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Sensor definitions keyed by field code (`V`, `SOC`, `H19`, ...).
    pub sensors: HashMap<String, SensorDefinition>,
}

fn default_manufacturer() -> String {
    "Victron".to_string()
}

/// The catalog of known device types.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct DeviceCatalog {
    types: HashMap<String, DeviceType>,
}

impl DeviceCatalog {
    /// Returns the catalog shipped with the crate (`mppt` and `shunt`).
    #[must_use]
    pub fn builtin() -> Self {
        // The shipped data file is validated by tests.
        serde_json::from_str(DEFAULT_CATALOG).expect("built-in catalog is valid JSON")
    }

    /// Parses a catalog from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedCatalog`] if the document does not
    /// parse, or [`ConfigError::InvalidDefinition`] if an entry is
    /// structurally invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Looks up a device type by its catalog key.
    #[must_use]
    pub fn device_type(&self, key: &str) -> Option<&DeviceType> {
        self.types.get(key)
    }

    /// Looks up a device type, failing with a configuration error when the
    /// key is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDeviceType`] if the key is not present.
    pub fn require(&self, key: &str) -> Result<&DeviceType, ConfigError> {
        self.types
            .get(key)
            .ok_or_else(|| ConfigError::UnknownDeviceType(key.to_string()))
    }

    /// Returns the known device-type keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for device_type in self.types.values() {
            for (field, sensor) in &device_type.sensors {
                if sensor.name.is_empty() {
                    return Err(ConfigError::InvalidDefinition {
                        field: field.clone(),
                        message: "sensor name must not be empty".to_string(),
                    });
                }
                if sensor.window == Some(0) {
                    return Err(ConfigError::InvalidDefinition {
                        field: field.clone(),
                        message: "window size must be non-zero".to_string(),
                    });
                }
                if sensor.multiplier.is_none() && sensor.window.is_some() {
                    return Err(ConfigError::InvalidDefinition {
                        field: field.clone(),
                        message: "categorical fields cannot be smoothed".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = DeviceCatalog::builtin();
        assert!(catalog.device_type("mppt").is_some());
        assert!(catalog.device_type("shunt").is_some());
        assert!(catalog.device_type("inverter").is_none());
    }

    #[test]
    fn builtin_mppt_definitions() {
        let catalog = DeviceCatalog::builtin();
        let mppt = catalog.device_type("mppt").unwrap();

        assert_eq!(mppt.model, "BlueSolar 100/50");
        assert_eq!(mppt.category, "Solar");
        assert_eq!(mppt.manufacturer, "Victron");
        assert_eq!(mppt.sensors.len(), 6);

        let voltage = &mppt.sensors["V"];
        assert_eq!(voltage.name, "Output Voltage");
        assert_eq!(voltage.unit_of_measurement.as_deref(), Some("V"));
        assert_eq!(voltage.device_class.as_deref(), Some("voltage"));
        assert_eq!(voltage.state_class, "measurement");
        assert_eq!(voltage.multiplier, Some(0.001));
    }

    #[test]
    fn builtin_shunt_has_categorical_fields() {
        let catalog = DeviceCatalog::builtin();
        let shunt = catalog.device_type("shunt").unwrap();

        let alarm = &shunt.sensors["Alarm"];
        assert!(alarm.multiplier.is_none());
        assert!(alarm.unit_of_measurement.is_none());
        assert!(alarm.device_class.is_none());
    }

    #[test]
    fn require_unknown_key_fails() {
        let catalog = DeviceCatalog::builtin();
        let err = catalog.require("toaster").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDeviceType(key) if key == "toaster"));
    }

    #[test]
    fn from_json_custom_type() {
        let json = r#"{
            "inverter": {
                "model": "Phoenix 12/800",
                "category": "Inverter",
                "sensors": {
                    "AC_OUT_V": {
                        "name": "AC Output Voltage",
                        "unit_of_measurement": "V",
                        "device_class": "voltage",
                        "state_class": "measurement",
                        "multiplier": 0.01
                    }
                }
            }
        }"#;

        let catalog = DeviceCatalog::from_json(json).unwrap();
        let inverter = catalog.require("inverter").unwrap();
        assert_eq!(inverter.manufacturer, "Victron");
        assert_eq!(inverter.sensors["AC_OUT_V"].multiplier, Some(0.01));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = DeviceCatalog::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedCatalog(_)));
    }

    #[test]
    fn from_json_rejects_zero_window() {
        let json = r#"{
            "t": {
                "model": "m", "category": "c",
                "sensors": {
                    "V": { "name": "v", "state_class": "measurement", "multiplier": 1, "window": 0 }
                }
            }
        }"#;
        let err = DeviceCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefinition { .. }));
    }

    #[test]
    fn from_json_rejects_window_on_categorical() {
        let json = r#"{
            "t": {
                "model": "m", "category": "c",
                "sensors": {
                    "Alarm": { "name": "a", "state_class": "measurement", "multiplier": null, "window": 5 }
                }
            }
        }"#;
        let err = DeviceCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefinition { .. }));
    }
}
