// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Home Assistant MQTT discovery payloads.
//!
//! One retained JSON document per sensor, published to
//! `<prefix>/sensor/<device>/<field>/config`, lets the hub auto-register
//! the entity before any state arrives.

use serde::Serialize;

use crate::sensor::Device;

/// The discovery document for one sensor entity.
#[derive(Debug, Serialize)]
pub struct DiscoveryPayload<'a> {
    /// Entity display name.
    pub name: &'a str,
    /// Stable unique id; Home Assistant keys the entity on this.
    pub unique_id: &'a str,
    /// Topic the entity's states will arrive on.
    pub state_topic: &'a str,
    /// Unit of measurement, omitted for unitless fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'a str>,
    /// Home Assistant device class, omitted when the field has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'a str>,
    /// Home Assistant state class.
    pub state_class: &'a str,
    /// Device grouping block.
    pub device: DeviceBlock<'a>,
}

/// The device block grouping all entities of one physical device.
#[derive(Debug, Serialize)]
pub struct DeviceBlock<'a> {
    /// Stable identity strings; a single slug here.
    pub identifiers: [&'a str; 1],
    /// Device display name.
    pub name: &'a str,
    /// Hardware model.
    pub model: &'a str,
    /// Manufacturer.
    pub manufacturer: &'a str,
}

impl<'a> DeviceBlock<'a> {
    pub(crate) fn for_device(device: &'a Device) -> Self {
        Self {
            identifiers: [device.identity()],
            name: device.name(),
            model: device.model(),
            manufacturer: device.manufacturer(),
        }
    }
}

impl DiscoveryPayload<'_> {
    /// Renders the payload as JSON.
    pub(crate) fn render(&self) -> String {
        // A struct of borrowed strings cannot fail to serialize.
        serde_json::to_string(self).expect("discovery payload serializes")
    }
}
