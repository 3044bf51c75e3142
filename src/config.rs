// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! [`BridgeConfig`] collects everything the supervisor needs: the serial
//! port, the device identity, the broker endpoint and the tuning knobs
//! (smoothing window, reconnect backoff, read timeout). Values arrive from
//! whatever outer layer drives the bridge (CLI, config file); this crate
//! only validates them.
//!
//! # Examples
//!
//! ```
//! use vedirect_bridge::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::builder()
//!     .serial_path("/dev/ttyUSB0")
//!     .device_type("mppt")
//!     .device_name("Garden Array")
//!     .broker("192.168.1.50")
//!     .credentials("mqtt_user", "mqtt_pass")
//!     .reconnect_backoff(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.broker_port(), 1883);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default VE.Direct baud rate.
const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Default smoothing window, in samples.
const DEFAULT_WINDOW: usize = 60;

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    serial_path: String,
    baud_rate: u32,
    device_type: String,
    device_name: String,
    broker_host: String,
    broker_port: u16,
    credentials: Option<(String, String)>,
    ca_certificate: Option<PathBuf>,
    smoothing_window: usize,
    reconnect_backoff: Duration,
    read_timeout: Duration,
    keep_alive: Duration,
    connect_timeout: Duration,
    discovery_prefix: String,
}

impl BridgeConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// The serial device path (e.g. `/dev/ttyUSB0`).
    #[must_use]
    pub fn serial_path(&self) -> &str {
        &self.serial_path
    }

    /// The serial baud rate (default: 19200, per the VE.Direct spec).
    #[must_use]
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// The catalog key selecting which device type this port carries.
    #[must_use]
    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// The display name for the device in Home Assistant.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The MQTT broker host.
    #[must_use]
    pub fn broker_host(&self) -> &str {
        &self.broker_host
    }

    /// The MQTT broker port (default: 1883).
    #[must_use]
    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    /// Broker credentials, if configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// Path to a CA certificate enabling TLS, if configured.
    #[must_use]
    pub fn ca_certificate(&self) -> Option<&PathBuf> {
        self.ca_certificate.as_ref()
    }

    /// Number of samples averaged before a numeric state is published
    /// (default: 60).
    #[must_use]
    pub fn smoothing_window(&self) -> usize {
        self.smoothing_window
    }

    /// Fixed delay between reconnect attempts (default: 30 seconds).
    #[must_use]
    pub fn reconnect_backoff(&self) -> Duration {
        self.reconnect_backoff
    }

    /// Serial read timeout (default: 60 seconds).
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// MQTT keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Timeout for the broker connect handshake (default: 10 seconds).
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Home Assistant discovery topic prefix (default: `homeassistant`).
    #[must_use]
    pub fn discovery_prefix(&self) -> &str {
        &self.discovery_prefix
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    serial_path: String,
    baud_rate: u32,
    device_type: String,
    device_name: String,
    broker_host: String,
    broker_port: u16,
    credentials: Option<(String, String)>,
    ca_certificate: Option<PathBuf>,
    smoothing_window: usize,
    reconnect_backoff: Duration,
    read_timeout: Duration,
    keep_alive: Duration,
    connect_timeout: Duration,
    discovery_prefix: String,
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self {
            serial_path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            device_type: String::new(),
            device_name: String::new(),
            broker_host: String::new(),
            broker_port: 1883,
            credentials: None,
            ca_certificate: None,
            smoothing_window: DEFAULT_WINDOW,
            reconnect_backoff: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            discovery_prefix: "homeassistant".to_string(),
        }
    }
}

impl BridgeConfigBuilder {
    /// Sets the serial device path.
    #[must_use]
    pub fn serial_path(mut self, path: impl Into<String>) -> Self {
        self.serial_path = path.into();
        self
    }

    /// Sets the serial baud rate.
    #[must_use]
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Sets the device-type catalog key (e.g. `mppt`, `shunt`).
    #[must_use]
    pub fn device_type(mut self, key: impl Into<String>) -> Self {
        self.device_type = key.into();
        self
    }

    /// Sets the device display name.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the broker host.
    #[must_use]
    pub fn broker(mut self, host: impl Into<String>) -> Self {
        self.broker_host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn broker_port(mut self, port: u16) -> Self {
        self.broker_port = port;
        self
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Enables TLS using the given CA certificate file.
    #[must_use]
    pub fn ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    /// Sets the smoothing window size, in samples.
    #[must_use]
    pub fn smoothing_window(mut self, samples: usize) -> Self {
        self.smoothing_window = samples;
        self
    }

    /// Sets the fixed reconnect backoff.
    #[must_use]
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Sets the serial read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Sets the broker connect handshake timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the Home Assistant discovery prefix.
    #[must_use]
    pub fn discovery_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.discovery_prefix = prefix.into();
        self
    }

    /// Validates the configuration and builds a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a required field is missing
    /// or a tuning value is out of range.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        if self.serial_path.is_empty() {
            return Err(ConfigError::InvalidValue(
                "serial device path is required".to_string(),
            ));
        }
        if self.device_type.is_empty() {
            return Err(ConfigError::InvalidValue(
                "device type is required".to_string(),
            ));
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "device name is required".to_string(),
            ));
        }
        if self.broker_host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MQTT broker host is required".to_string(),
            ));
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::InvalidValue(
                "smoothing window must be at least 1 sample".to_string(),
            ));
        }

        Ok(BridgeConfig {
            serial_path: self.serial_path,
            baud_rate: self.baud_rate,
            device_type: self.device_type,
            device_name: self.device_name,
            broker_host: self.broker_host,
            broker_port: self.broker_port,
            credentials: self.credentials,
            ca_certificate: self.ca_certificate,
            smoothing_window: self.smoothing_window,
            reconnect_backoff: self.reconnect_backoff,
            read_timeout: self.read_timeout,
            keep_alive: self.keep_alive,
            connect_timeout: self.connect_timeout,
            discovery_prefix: self.discovery_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BridgeConfigBuilder {
        BridgeConfig::builder()
            .serial_path("/dev/ttyUSB0")
            .device_type("mppt")
            .device_name("Solar Charger")
            .broker("localhost")
    }

    #[test]
    fn builder_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.baud_rate(), 19_200);
        assert_eq!(config.broker_port(), 1883);
        assert_eq!(config.smoothing_window(), 60);
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(30));
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.discovery_prefix(), "homeassistant");
        assert!(config.credentials().is_none());
        assert!(config.ca_certificate().is_none());
    }

    #[test]
    fn builder_missing_serial_path_fails() {
        let result = BridgeConfig::builder()
            .device_type("mppt")
            .device_name("x")
            .broker("localhost")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn builder_missing_broker_fails() {
        let result = BridgeConfig::builder()
            .serial_path("/dev/ttyUSB0")
            .device_type("mppt")
            .device_name("x")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn builder_zero_window_fails() {
        let result = minimal().smoothing_window(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn builder_chain() {
        let config = minimal()
            .broker_port(8883)
            .credentials("user", "pass")
            .smoothing_window(10)
            .discovery_prefix("ha")
            .build()
            .unwrap();

        assert_eq!(config.broker_port(), 8883);
        assert_eq!(config.credentials(), Some(("user", "pass")));
        assert_eq!(config.smoothing_window(), 10);
        assert_eq!(config.discovery_prefix(), "ha");
    }
}
