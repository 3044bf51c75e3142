// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `VE.Direct` Bridge - Victron telemetry to Home Assistant over MQTT.
//!
//! This library decodes the checksummed `VE.Direct` serial protocol spoken
//! by Victron solar charge controllers and battery monitors, and
//! republishes the decoded fields as smoothed, unit-converted sensor
//! states to an MQTT broker. Each sensor announces itself through Home
//! Assistant's MQTT discovery schema, so the hub auto-registers every
//! entity before the first state arrives.
//!
//! # Pipeline
//!
//! - [`FrameDecoder`]: turns the raw serial byte stream into validated
//!   field maps, silently discarding corrupt frames.
//! - [`SensorChannel`](sensor::SensorChannel): converts one field's raw
//!   values into published states, averaged over a rolling window.
//! - [`DeviceRegistry`](sensor::DeviceRegistry): groups the channels of a
//!   device and drives its one-time discovery registration per session.
//! - [`Bridge`]: supervises both connections, fans frames out to channels,
//!   and rebuilds the whole session on any fault.
//!
//! # Quick Start
//!
//! ```no_run
//! use vedirect_bridge::{Bridge, BridgeConfig, DeviceCatalog};
//!
//! #[tokio::main]
//! async fn main() -> vedirect_bridge::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .serial_path("/dev/ttyUSB0")
//!         .device_type("mppt")
//!         .device_name("Garden Array")
//!         .broker("192.168.1.50")
//!         .credentials("mqtt_user", "mqtt_pass")
//!         .build()?;
//!
//!     let bridge = Bridge::new(config, &DeviceCatalog::builtin())?;
//!
//!     // Runs until the process is terminated, reconnecting across every
//!     // recoverable fault.
//!     bridge.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Device Catalogs
//!
//! The mapping from `VE.Direct` field codes to Home Assistant sensors is
//! plain configuration. The built-in catalog covers the MPPT charger and
//! the `SmartShunt`; other device types load from JSON without a rebuild:
//!
//! ```
//! use vedirect_bridge::DeviceCatalog;
//!
//! let catalog = DeviceCatalog::from_json(r#"{
//!     "inverter": {
//!         "model": "Phoenix 12/800",
//!         "category": "Inverter",
//!         "sensors": {
//!             "AC_OUT_V": {
//!                 "name": "AC Output Voltage",
//!                 "unit_of_measurement": "V",
//!                 "device_class": "voltage",
//!                 "state_class": "measurement",
//!                 "multiplier": 0.01
//!             }
//!         }
//!     }
//! }"#).unwrap();
//!
//! assert!(catalog.device_type("inverter").is_some());
//! ```

pub mod bridge;
pub mod catalog;
mod config;
pub mod error;
pub mod frame;
pub mod publish;
pub mod sensor;

#[cfg(test)]
pub(crate) mod test_util;

pub use bridge::{Bridge, ConnectionState, Fault, FaultSignal};
pub use catalog::{DeviceCatalog, DeviceType, SensorDefinition};
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use error::{ConfigError, Error, ProtocolError, Result, SerialError};
pub use frame::{Frame, FrameDecoder, open_serial};
pub use publish::{MqttPublisher, StatePublisher};
pub use sensor::{Device, DeviceRegistry, SensorChannel};
