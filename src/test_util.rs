// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory publisher for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::ProtocolError;
use crate::publish::StatePublisher;

/// One captured publish.
#[derive(Debug, Clone)]
pub(crate) struct PublishRecord {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// A [`StatePublisher`] that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockPublisher {
    records: Arc<Mutex<Vec<PublishRecord>>>,
    failures_left: Arc<AtomicUsize>,
}

impl MockPublisher {
    /// Makes the next `count` publishes fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Returns a snapshot of everything published so far.
    pub fn records(&self) -> Vec<PublishRecord> {
        self.records.lock().clone()
    }
}

impl StatePublisher for MockPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ProtocolError::ConnectionFailed(
                "mock publish failure".to_string(),
            ));
        }

        self.records.lock().push(PublishRecord {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }
}
