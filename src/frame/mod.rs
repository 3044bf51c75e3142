// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VE.Direct frame decoding.
//!
//! The VE.Direct text protocol is a stream of `label<TAB>value<CRLF>`
//! records. A frame ends at the reserved `Checksum` record, whose single
//! value byte brings the modulo-256 sum of every frame byte to zero.
//! Interleaved HEX-protocol messages (marked by a leading `:`) are skipped
//! as opaque spans.
//!
//! [`FrameDecoder`] turns any async byte stream into validated [`Frame`]s;
//! [`open_serial`] connects it to a real VE.Direct port.

mod decoder;
mod serial;

pub use decoder::FrameDecoder;
pub use serial::open_serial;

use std::collections::HashMap;

/// One complete, checksum-validated unit of decoded field data.
///
/// A frame maps VE.Direct field codes (`V`, `SOC`, `H19`, ...) to their raw
/// string values. The `Checksum` record is consumed during validation and
/// never appears here. Frames are ephemeral: the supervisor distributes one
/// and drops it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    fields: HashMap<String, String>,
}

impl Frame {
    pub(crate) fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    /// Returns the raw value for a field code, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Returns the number of fields in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the frame carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(field code, raw value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
