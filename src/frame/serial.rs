// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Opening the VE.Direct serial port.

use std::time::Duration;

use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::SerialError;
use crate::frame::FrameDecoder;

/// Opens a VE.Direct port and wraps it in a [`FrameDecoder`].
///
/// VE.Direct is fixed at 8 data bits, no parity, one stop bit; the baud
/// rate is 19200 on every current device but stays configurable.
///
/// # Errors
///
/// Returns [`SerialError::Open`] if the port cannot be opened (missing
/// device, insufficient permissions).
pub fn open_serial(
    path: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<FrameDecoder<SerialStream>, SerialError> {
    let mut port = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(|source| SerialError::Open {
            path: path.to_string(),
            source,
        })?;

    // The cable is read-only for the text protocol; leave the port shareable
    // so diagnostic tools can attach.
    #[cfg(unix)]
    if let Err(e) = port.set_exclusive(false) {
        tracing::warn!(path, error = %e, "Failed to clear exclusive mode");
    }

    tracing::info!(path, baud_rate, "Opened VE.Direct serial port");

    Ok(FrameDecoder::new(port, read_timeout))
}
