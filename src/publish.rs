// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The broker publish seam.
//!
//! Sensors publish through the [`StatePublisher`] trait rather than a
//! concrete client, so the whole pipeline can run against an in-memory
//! publisher in tests. The production implementation is [`MqttPublisher`],
//! a thin wrapper over a shared `rumqttc::AsyncClient`.

use rumqttc::{AsyncClient, QoS};

use crate::error::ProtocolError;

/// A sink for discovery and state messages.
#[allow(async_fn_in_trait)]
pub trait StatePublisher {
    /// Publishes one message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the broker write fails. Callers treat
    /// this as a publish fault, not a synchronous abort.
    async fn publish(&self, topic: &str, payload: String, retain: bool)
    -> Result<(), ProtocolError>;
}

/// [`StatePublisher`] backed by a `rumqttc` client.
///
/// Cheap to clone; every sensor channel of a session holds one.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Wraps an async MQTT client.
    #[must_use]
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl StatePublisher for MqttPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        tracing::trace!(topic, retain, payload = %payload, "Publishing MQTT message");

        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }
}
