// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The supervisor loop.
//!
//! [`Bridge::run`] owns both connection lifecycles: the VE.Direct serial
//! link and the MQTT broker session. On every new session it rebuilds the
//! [`DeviceRegistry`], republishes discovery, then pumps frames from the
//! decoder into detached fan-out tasks. Any session-fatal condition —
//! serial I/O failure, broker loss, publish fault — tears the session down,
//! and the loop retries after a fixed backoff, forever.
//!
//! # Examples
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
//!         .build()?;
//!
//!     let bridge = Bridge::new(config, &DeviceCatalog::builtin())?;
//!     bridge.run().await;
//!     Ok(())
//! }
//! ```

mod fault;

pub use fault::{Fault, FaultSignal};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, TlsConfiguration, Transport};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_serial::SerialStream;

use crate::catalog::{DeviceCatalog, DeviceType};
use crate::config::BridgeConfig;
use crate::error::{ConfigError, Error, ProtocolError};
use crate::frame::{FrameDecoder, open_serial};
use crate::publish::MqttPublisher;
use crate::sensor::DeviceRegistry;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cap on concurrently in-flight frame dispatch tasks.
const MAX_INFLIGHT_DISPATCH: usize = 32;

/// Lifecycle state of one side of the bridge.
///
/// The serial link and the broker session each move through this machine
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and carrying traffic.
    Ready,
    /// Failed; waiting out the backoff before the next attempt.
    Faulted,
}

impl ConnectionState {
    /// Returns true if this side is carrying traffic.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The VE.Direct to MQTT supervisor.
pub struct Bridge {
    config: BridgeConfig,
    device_type: DeviceType,
    ca_certificate: Option<Vec<u8>>,
    faults: FaultSignal,
    serial_state: watch::Sender<ConnectionState>,
    broker_state: watch::Sender<ConnectionState>,
}

impl Bridge {
    /// Creates a bridge, resolving the configured device type against the
    /// catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the device-type key is unknown or the
    /// configured CA certificate cannot be read. Configuration errors are
    /// the one class that is never retried.
    pub fn new(config: BridgeConfig, catalog: &DeviceCatalog) -> Result<Self, Error> {
        let device_type = catalog.require(config.device_type())?.clone();

        let ca_certificate = match config.ca_certificate() {
            Some(path) => Some(std::fs::read(path).map_err(ConfigError::CaCertificate)?),
            None => None,
        };

        let (serial_state, _) = watch::channel(ConnectionState::Disconnected);
        let (broker_state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            config,
            device_type,
            ca_certificate,
            faults: FaultSignal::new(),
            serial_state,
            broker_state,
        })
    }

    /// Watches the serial-side connection state.
    #[must_use]
    pub fn watch_serial_state(&self) -> watch::Receiver<ConnectionState> {
        self.serial_state.subscribe()
    }

    /// Watches the broker-side connection state.
    #[must_use]
    pub fn watch_broker_state(&self) -> watch::Receiver<ConnectionState> {
        self.broker_state.subscribe()
    }

    /// Runs the supervisor until the process is terminated.
    ///
    /// Every recoverable fault (serial I/O, broker loss, publish failure)
    /// tears down the session, waits the configured backoff, and retries.
    pub async fn run(self) {
        let mut decoder: Option<FrameDecoder<SerialStream>> = None;

        loop {
            if decoder.is_none() {
                self.serial_state.send_replace(ConnectionState::Connecting);
                match open_serial(
                    self.config.serial_path(),
                    self.config.baud_rate(),
                    self.config.read_timeout(),
                ) {
                    Ok(opened) => {
                        self.serial_state.send_replace(ConnectionState::Ready);
                        decoder = Some(opened);
                    }
                    Err(error) => {
                        self.serial_state.send_replace(ConnectionState::Faulted);
                        tracing::error!(
                            path = self.config.serial_path(),
                            %error,
                            backoff_secs = self.config.reconnect_backoff().as_secs(),
                            "Failed to open serial port, retrying"
                        );
                        tokio::time::sleep(self.config.reconnect_backoff()).await;
                        continue;
                    }
                }
            }

            let Some(active_decoder) = decoder.as_mut() else {
                continue;
            };

            let Err(error) = self.run_session(active_decoder).await else {
                continue;
            };

            self.broker_state.send_replace(ConnectionState::Faulted);
            if matches!(error, Error::Serial(_)) {
                // The port itself failed; reopen it on the next attempt.
                // A broker-only fault keeps the decoder and its buffer.
                self.serial_state.send_replace(ConnectionState::Faulted);
                decoder = None;
            }

            tracing::error!(
                %error,
                backoff_secs = self.config.reconnect_backoff().as_secs(),
                "Session ended, reconnecting after backoff"
            );
            tokio::time::sleep(self.config.reconnect_backoff()).await;
        }
    }

    /// Runs one broker session to its fatal end.
    async fn run_session(&self, decoder: &mut FrameDecoder<SerialStream>) -> Result<(), Error> {
        // Faults raised while the previous session died belong to it, not
        // to the session starting now.
        let _ = self.faults.take();

        self.broker_state.send_replace(ConnectionState::Connecting);
        tracing::info!(
            host = self.config.broker_host(),
            port = self.config.broker_port(),
            "Initiating connection to broker"
        );

        let (client, event_loop_handle) = self.connect_broker().await?;
        tracing::info!("Connection to broker successful");

        let result = self.pump(decoder, &client).await;

        // Teardown: drop the session client and its event loop. In-flight
        // dispatches died with the JoinSet inside pump.
        let _ = client.disconnect().await;
        event_loop_handle.abort();
        self.broker_state.send_replace(ConnectionState::Disconnected);

        result
    }

    /// Decodes frames and fans them out until a fault surfaces.
    async fn pump(
        &self,
        decoder: &mut FrameDecoder<SerialStream>,
        client: &AsyncClient,
    ) -> Result<(), Error> {
        let publisher = MqttPublisher::new(client.clone());
        let registry = Arc::new(DeviceRegistry::new(
            &self.device_type,
            self.config.device_name(),
            publisher,
            self.config.discovery_prefix(),
            self.config.smoothing_window(),
        ));

        // Discovery must be fully registered before the first state
        // publish of the session can happen.
        registry.publish_discovery().await.map_err(Error::Protocol)?;
        self.broker_state.send_replace(ConnectionState::Ready);

        tracing::info!(
            path = self.config.serial_path(),
            "Listening for VE.Direct frames"
        );

        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            if let Some(fault) = self.faults.take() {
                return Err(fault.into_error());
            }

            // Keep the dispatch set bounded and observable: drain finished
            // tasks, and wait for a slot when at capacity.
            while inflight.try_join_next().is_some() {}
            if inflight.len() >= MAX_INFLIGHT_DISPATCH {
                tracing::warn!(
                    inflight = inflight.len(),
                    "Dispatch backlog at capacity, awaiting a slot"
                );
                let _ = inflight.join_next().await;
            }

            let frame = decoder.read_frame().await.map_err(Error::Serial)?;

            let registry = Arc::clone(&registry);
            let faults = self.faults.clone();
            inflight.spawn(async move {
                registry.dispatch(&frame, &faults).await;
            });
        }
    }

    /// Connects the MQTT client and gates on the broker's ConnAck.
    async fn connect_broker(&self) -> Result<(AsyncClient, JoinHandle<()>), Error> {
        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("vedirect_{}_{}", std::process::id(), counter);

        let mut options = MqttOptions::new(
            &client_id,
            self.config.broker_host(),
            self.config.broker_port(),
        );
        options.set_keep_alive(self.config.keep_alive());
        options.set_clean_session(true);

        if let Some((username, password)) = self.config.credentials() {
            options.set_credentials(username, password);
        }

        if let Some(ca) = &self.ca_certificate {
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, event_loop) = AsyncClient::new(options, 10);

        let (connack_tx, connack_rx) = oneshot::channel();
        let faults = self.faults.clone();
        let handle = tokio::spawn(drive_event_loop(event_loop, faults, connack_tx));

        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => Ok((client, handle)),
            Ok(Err(_)) => {
                handle.abort();
                Err(Error::Protocol(ProtocolError::ConnectionFailed(
                    "MQTT event loop terminated before ConnAck".to_string(),
                )))
            }
            Err(_) => {
                handle.abort();
                Err(Error::Protocol(ProtocolError::ConnectTimeout(
                    timeout.as_secs(),
                )))
            }
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("serial_path", &self.config.serial_path())
            .field("device_type", &self.config.device_type())
            .field("broker_host", &self.config.broker_host())
            .field("broker_port", &self.config.broker_port())
            .finish_non_exhaustive()
    }
}

/// Polls the MQTT event loop, gating the session start on ConnAck and
/// raising a broker fault when the connection dies.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    faults: FaultSignal,
    connack_tx: oneshot::Sender<()>,
) {
    let mut connack_tx = Some(connack_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "Broker connection acknowledged");
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker sent disconnect");
                faults.raise(Fault::Broker("broker disconnected".to_string()));
                break;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(%error, "MQTT event loop error");
                faults.raise(Fault::Broker(error.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::builder()
            .serial_path("/dev/ttyUSB0")
            .device_type("mppt")
            .device_name("Garden Array")
            .broker("localhost")
            .build()
            .unwrap()
    }

    #[test]
    fn new_resolves_device_type() {
        let bridge = Bridge::new(config(), &DeviceCatalog::builtin()).unwrap();
        assert_eq!(bridge.device_type.model, "BlueSolar 100/50");
    }

    #[test]
    fn new_rejects_unknown_device_type() {
        let config = BridgeConfig::builder()
            .serial_path("/dev/ttyUSB0")
            .device_type("toaster")
            .device_name("x")
            .broker("localhost")
            .build()
            .unwrap();

        let err = Bridge::new(config, &DeviceCatalog::builtin()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn initial_states_are_disconnected() {
        let bridge = Bridge::new(config(), &DeviceCatalog::builtin()).unwrap();
        assert_eq!(
            *bridge.watch_serial_state().borrow(),
            ConnectionState::Disconnected
        );
        assert_eq!(
            *bridge.watch_broker_state().borrow(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn fault_maps_to_protocol_error() {
        let err = Fault::Publish("write failed".to_string()).into_error();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn connection_state_readiness() {
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());
        assert!(!ConnectionState::Faulted.is_ready());
    }
}
