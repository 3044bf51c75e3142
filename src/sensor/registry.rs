// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session setup: building the channels of a device and dispatching frames
//! to them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::{Fault, FaultSignal};
use crate::catalog::DeviceType;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::publish::StatePublisher;
use crate::sensor::{Device, SensorChannel};

/// The [`SensorChannel`]s of one device, for one broker session.
///
/// A registry is rebuilt on every new session: channel discovery state is
/// session-scoped and must not survive a reconnect.
#[derive(Debug)]
pub struct DeviceRegistry<P> {
    device: Arc<Device>,
    channels: HashMap<String, Arc<SensorChannel<P>>>,
}

impl<P: StatePublisher + Clone> DeviceRegistry<P> {
    /// Builds a device and one channel per catalog sensor definition, all
    /// bound to `publisher` (the current session's client).
    pub fn new(
        device_type: &DeviceType,
        device_name: &str,
        publisher: P,
        discovery_prefix: &str,
        default_window: usize,
    ) -> Self {
        let device = Arc::new(Device::new(
            device_name,
            device_type.model.clone(),
            device_type.manufacturer.clone(),
        ));

        let channels = device_type
            .sensors
            .iter()
            .map(|(field, definition)| {
                let channel = SensorChannel::new(
                    field,
                    definition.clone(),
                    &device_type.category,
                    Arc::clone(&device),
                    publisher.clone(),
                    discovery_prefix,
                    default_window,
                );
                (field.clone(), Arc::new(channel))
            })
            .collect();

        Self { device, channels }
    }

    /// The device identity this registry publishes under.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the registry holds no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Looks up the channel for a field code.
    #[must_use]
    pub fn channel(&self, field: &str) -> Option<&Arc<SensorChannel<P>>> {
        self.channels.get(field)
    }

    /// Announces every channel of this session to the hub.
    ///
    /// This is a sequencing barrier: it completes only after every
    /// discovery publish has been issued and acknowledged by the client,
    /// so no entity can receive state before its registration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProtocolError`]; the caller tears the session
    /// down rather than continuing half-registered.
    pub async fn publish_discovery(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            device = %self.device.name(),
            sensors = self.channels.len(),
            "Publishing sensor discovery to the hub"
        );

        for channel in self.channels.values() {
            channel.publish_discovery().await?;
        }
        Ok(())
    }

    /// Fans one frame out to its matching channels.
    ///
    /// Fields without a channel are ignored. A publish failure is recorded
    /// on `faults` and the remaining fields still get their chance; the
    /// decode path is never blocked from here.
    pub async fn dispatch(&self, frame: &Frame, faults: &FaultSignal) {
        for (field, raw_value) in frame.iter() {
            let Some(channel) = self.channels.get(field) else {
                continue;
            };

            if let Err(error) = channel.send(raw_value).await {
                tracing::warn!(field, %error, "State publish failed");
                faults.raise(Fault::Publish(error.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    use crate::catalog::DeviceCatalog;
    use crate::test_util::MockPublisher;

    fn mppt_registry(publisher: MockPublisher) -> DeviceRegistry<MockPublisher> {
        let catalog = DeviceCatalog::builtin();
        let mppt = catalog.device_type("mppt").unwrap();
        DeviceRegistry::new(mppt, "Garden Array", publisher, "homeassistant", 4)
    }

    fn frame(fields: &[(&str, &str)]) -> Frame {
        Frame::new(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn builds_channel_per_definition() {
        let registry = mppt_registry(MockPublisher::default());
        assert_eq!(registry.len(), 6);
        assert!(registry.channel("V").is_some());
        assert!(registry.channel("SOC").is_none());
        assert_eq!(registry.device().identity(), "garden_array");
    }

    #[tokio::test]
    async fn discovery_barrier_covers_all_channels() {
        let publisher = MockPublisher::default();
        let registry = mppt_registry(publisher.clone());

        registry.publish_discovery().await.unwrap();

        let records = publisher.records();
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.retain));
        assert!(records.iter().all(|r| r.topic.ends_with("/config")));
    }

    #[tokio::test]
    async fn dispatch_routes_known_fields_only() {
        let publisher = MockPublisher::default();
        let registry = mppt_registry(publisher.clone());
        let faults = FaultSignal::new();

        let frame = frame(&[("V", "24100"), ("PPV", "89"), ("FW", "159")]);
        registry.dispatch(&frame, &faults).await;

        let records = publisher.records();
        assert_eq!(records.len(), 2);
        assert!(!faults.is_set());

        let by_topic: Map<_, _> = records
            .iter()
            .map(|r| (r.topic.clone(), r.payload.clone()))
            .collect();
        assert_eq!(
            by_topic["homeassistant/sensor/garden_array/v/state"],
            "24.1"
        );
        assert_eq!(by_topic["homeassistant/sensor/garden_array/ppv/state"], "89");
    }

    #[tokio::test]
    async fn publish_failure_raises_fault_but_continues() {
        let publisher = MockPublisher::default();
        let registry = mppt_registry(publisher.clone());
        let faults = FaultSignal::new();

        publisher.fail_next(1);
        let frame = frame(&[("V", "24100"), ("PPV", "89")]);
        registry.dispatch(&frame, &faults).await;

        // One field failed, the other was still attempted.
        assert_eq!(publisher.records().len(), 1);
        assert!(matches!(faults.take(), Some(Fault::Publish(_))));
    }

    #[tokio::test]
    async fn fresh_registry_republishes_discovery() {
        let publisher = MockPublisher::default();

        let first = mppt_registry(publisher.clone());
        first.publish_discovery().await.unwrap();
        drop(first);

        // A rebuilt registry has no memory of the previous session.
        let second = mppt_registry(publisher.clone());
        second.publish_discovery().await.unwrap();

        assert_eq!(publisher.records().len(), 12);
    }
}
