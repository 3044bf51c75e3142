// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-task fault signalling.
//!
//! Publish failures happen inside detached fan-out tasks; broker failures
//! happen inside the MQTT event-loop task. Neither can abort the decode
//! path synchronously, so both raise on a shared [`FaultSignal`] that the
//! supervisor polls before every frame and clears when it rebuilds the
//! session.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, ProtocolError};

/// A session-fatal fault observed outside the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A state or discovery publish failed.
    Publish(String),
    /// The broker connection failed or was closed.
    Broker(String),
}

impl Fault {
    pub(crate) fn into_error(self) -> Error {
        match self {
            Self::Publish(message) | Self::Broker(message) => {
                Error::Protocol(ProtocolError::ConnectionFailed(message))
            }
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish(message) => write!(f, "publish fault: {message}"),
            Self::Broker(message) => write!(f, "broker fault: {message}"),
        }
    }
}

/// Shared fault slot with defined ownership: fan-out tasks and the event
/// loop raise; only the supervisor takes.
#[derive(Debug, Clone, Default)]
pub struct FaultSignal {
    slot: Arc<Mutex<Option<Fault>>>,
}

impl FaultSignal {
    /// Creates an empty signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault. The first fault of a session wins; later ones are
    /// logged and dropped, since one teardown covers them all.
    pub fn raise(&self, fault: Fault) {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            tracing::debug!(%fault, %existing, "Dropping fault raised during teardown");
        } else {
            *slot = Some(fault);
        }
    }

    /// Takes and clears the pending fault, if any.
    #[must_use]
    pub fn take(&self) -> Option<Fault> {
        self.slot.lock().take()
    }

    /// Returns true if a fault is pending.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}
