// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the VE.Direct bridge.
//!
//! This module provides the error hierarchy used across the crate:
//! configuration/catalog validation, serial I/O, and MQTT protocol failures.
//!
//! Checksum mismatches are deliberately absent here: they are recoverable,
//! internal to the frame decoder, and never surfaced to callers.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error in the bridge configuration or the device catalog.
    ///
    /// Fatal at startup; never retried.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serial I/O failure on the VE.Direct port.
    ///
    /// Fatal to the current session; the supervisor tears down and retries.
    #[error("serial error: {0}")]
    Serial(#[from] SerialError),

    /// MQTT protocol or connection failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors related to configuration and the device catalog.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested device-type key is not present in the catalog.
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    /// The catalog document could not be parsed.
    #[error("malformed device catalog: {0}")]
    MalformedCatalog(#[from] serde_json::Error),

    /// A catalog entry is structurally invalid.
    #[error("invalid catalog entry for {field}: {message}")]
    InvalidDefinition {
        /// The field code of the offending definition.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A required configuration value is missing or invalid.
    #[error("invalid configuration: {0}")]
    InvalidValue(String),

    /// The TLS CA certificate could not be read.
    #[error("failed to read CA certificate: {0}")]
    CaCertificate(#[source] std::io::Error),
}

/// Errors related to the serial VE.Direct link.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The port could not be opened.
    #[error("failed to open serial port {path}: {source}")]
    Open {
        /// The device path that failed to open.
        path: String,
        /// The underlying serial error.
        #[source]
        source: tokio_serial::Error,
    },

    /// Reading from the port failed (device unplugged, permission lost).
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),

    /// No bytes arrived within the configured read timeout.
    #[error("serial read timed out after {0} s")]
    Timeout(u64),

    /// The byte stream ended.
    #[error("serial stream closed")]
    Closed,
}

/// Errors related to MQTT communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The MQTT client rejected an operation.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker handshake did not complete in time.
    #[error("broker connection timed out after {0} s")]
    ConnectTimeout(u64),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::UnknownDeviceType("inverter".to_string());
        assert_eq!(err.to_string(), "unknown device type: inverter");
    }

    #[test]
    fn error_from_config_error() {
        let err: Error = ConfigError::InvalidValue("broker host is required".to_string()).into();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn serial_timeout_display() {
        let err = SerialError::Timeout(60);
        assert_eq!(err.to_string(), "serial read timed out after 60 s");
    }

    #[test]
    fn invalid_definition_display() {
        let err = ConfigError::InvalidDefinition {
            field: "V".to_string(),
            message: "window size must be non-zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid catalog entry for V: window size must be non-zero"
        );
    }
}
