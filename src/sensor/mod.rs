// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensor entities and their publication pipeline.
//!
//! A [`Device`] groups the [`SensorChannel`]s of one physical VE.Direct
//! device. Channels are session-scoped: the supervisor rebuilds them on
//! every new broker session, so discovery state never outlives the
//! connection it was announced on.

mod discovery;
mod registry;

pub use discovery::{DeviceBlock, DiscoveryPayload};
pub use registry::DeviceRegistry;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::catalog::SensorDefinition;
use crate::error::ProtocolError;
use crate::publish::StatePublisher;

/// Reduces a display string to a topic-safe slug.
fn slug(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// One physical VE.Direct device, as presented to Home Assistant.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    model: String,
    manufacturer: String,
    identity: String,
}

impl Device {
    /// Creates a device identity. The stable identity slug is derived from
    /// the display name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let identity = slug(&name);
        Self {
            name,
            model: model.into(),
            manufacturer: manufacturer.into(),
            identity,
        }
    }

    /// Device display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Manufacturer.
    #[must_use]
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    /// Stable identity slug grouping this device's entities.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// One telemetry field bound to one device and one broker session.
///
/// Numeric channels keep a bounded rolling buffer of raw samples and
/// publish the scaled mean; categorical channels pass raw values through
/// verbatim. The discovery flag is scoped to this instance, which is
/// scoped to the session.
#[derive(Debug)]
pub struct SensorChannel<P> {
    field: String,
    definition: SensorDefinition,
    device: Arc<Device>,
    publisher: P,
    display_name: String,
    unique_id: String,
    config_topic: String,
    state_topic: String,
    window: Mutex<VecDeque<f64>>,
    window_capacity: usize,
    discovery_published: AtomicBool,
}

impl<P: StatePublisher> SensorChannel<P> {
    pub(crate) fn new(
        field: &str,
        definition: SensorDefinition,
        category: &str,
        device: Arc<Device>,
        publisher: P,
        discovery_prefix: &str,
        default_window: usize,
    ) -> Self {
        let field_slug = slug(field);
        let unique_id = format!("{}_{}", device.identity(), field_slug);
        let topic_base = format!(
            "{discovery_prefix}/sensor/{}/{field_slug}",
            device.identity()
        );
        let display_name = format!("{category} {}", definition.name);
        let window_capacity = if definition.multiplier.is_some() {
            definition.window.unwrap_or(default_window)
        } else {
            0
        };

        Self {
            field: field.to_string(),
            definition,
            device,
            publisher,
            display_name,
            unique_id,
            config_topic: format!("{topic_base}/config"),
            state_topic: format!("{topic_base}/state"),
            window: Mutex::new(VecDeque::with_capacity(window_capacity)),
            window_capacity,
            discovery_published: AtomicBool::new(false),
        }
    }

    /// The VE.Direct field code this channel consumes.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The topic this channel publishes states to.
    #[must_use]
    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    /// Whether discovery has been announced in this session.
    #[must_use]
    pub fn discovery_published(&self) -> bool {
        self.discovery_published.load(Ordering::Acquire)
    }

    /// Publishes the retained discovery document for this channel.
    ///
    /// Idempotent within the session: at most one message is ever sent,
    /// and it must precede the channel's first state publish.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the broker write fails; the session is
    /// torn down rather than left partially registered.
    pub async fn publish_discovery(&self) -> Result<(), ProtocolError> {
        if self.discovery_published.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let payload = DiscoveryPayload {
            name: &self.display_name,
            unique_id: &self.unique_id,
            state_topic: &self.state_topic,
            unit_of_measurement: self.definition.unit_of_measurement.as_deref(),
            device_class: self.definition.device_class.as_deref(),
            state_class: &self.definition.state_class,
            device: DeviceBlock::for_device(&self.device),
        };

        tracing::debug!(
            topic = %self.config_topic,
            unique_id = %self.unique_id,
            "Publishing sensor discovery"
        );

        self.publisher
            .publish(&self.config_topic, payload.render(), true)
            .await
    }

    /// Converts a raw field value into a state publish.
    ///
    /// Numeric fields are appended to the rolling buffer (evicting the
    /// oldest sample at capacity) and published as `mean * multiplier`;
    /// categorical fields are published verbatim. Unparseable numeric
    /// values are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the broker write fails. Callers record
    /// this as a publish fault for the supervisor instead of aborting the
    /// decode path.
    pub async fn send(&self, raw_value: &str) -> Result<(), ProtocolError> {
        let payload = if let Some(multiplier) = self.definition.multiplier {
            let Ok(sample) = raw_value.trim().parse::<f64>() else {
                tracing::warn!(
                    field = %self.field,
                    raw = raw_value,
                    "Ignoring unparseable numeric value"
                );
                return Ok(());
            };
            self.smooth(sample, multiplier).to_string()
        } else {
            raw_value.to_string()
        };

        self.publisher
            .publish(&self.state_topic, payload, false)
            .await
    }

    /// Pushes a sample and returns the scaled mean of the window.
    fn smooth(&self, sample: f64, multiplier: f64) -> f64 {
        let mut window = self.window.lock();
        if window.len() == self.window_capacity {
            window.pop_front();
        }
        window.push_back(sample);

        #[allow(clippy::cast_precision_loss)]
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        mean * multiplier
    }
}
