// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Immutable device snapshot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::decoder::DecodeContext;
use crate::error::DecodeError;
use crate::types::{ChannelId, ChannelValue};

/// One fully decoded observation of a device.
///
/// A snapshot is never mutated after construction; the next successful poll
/// supersedes it wholesale. Fields keep the order in which the decoder
/// declared them, which is the order deltas are published in.
///
/// `sequence` is the per-session version of the snapshot. The scheduler
/// hands out strictly increasing sequence numbers so a snapshot can only
/// ever be compared against its immediate predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    sequence: u64,
    observed_at: DateTime<Utc>,
    fields: Vec<(ChannelId, ChannelValue)>,
}

impl DeviceSnapshot {
    /// Starts building a snapshot for the given decode context.
    #[must_use]
    pub fn builder(ctx: &DecodeContext) -> SnapshotBuilder {
        SnapshotBuilder {
            sequence: ctx.sequence(),
            observed_at: ctx.observed_at(),
            fields: Vec::new(),
        }
    }

    /// Returns the per-session version of this snapshot.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the time the observation was made.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Returns the value of a channel, if the snapshot carries it.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<&ChannelValue> {
        self.fields
            .iter()
            .find(|(id, _)| id.as_str() == channel)
            .map(|(_, value)| value)
    }

    /// Iterates over the fields in declared order.
    pub fn fields(&self) -> impl Iterator<Item = (&ChannelId, &ChannelValue)> {
        self.fields.iter().map(|(id, value)| (id, value))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the snapshot carries no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`DeviceSnapshot`].
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pollsync_lib::decoder::DecodeContext;
/// use pollsync_lib::snapshot::DeviceSnapshot;
///
/// let ctx = DecodeContext::new(Utc::now(), 7);
/// let snapshot = DeviceSnapshot::builder(&ctx)
///     .field("temperature", 21.5)
///     .field("status", 3_i64)
///     .build()
///     .unwrap();
///
/// assert_eq!(snapshot.sequence(), 7);
/// assert_eq!(snapshot.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    sequence: u64,
    observed_at: DateTime<Utc>,
    fields: Vec<(ChannelId, ChannelValue)>,
}

impl SnapshotBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, channel: impl Into<ChannelId>, value: impl Into<ChannelValue>) -> Self {
        self.push(channel, value);
        self
    }

    /// Appends a field in place.
    pub fn push(&mut self, channel: impl Into<ChannelId>, value: impl Into<ChannelValue>) {
        self.fields.push((channel.into(), value.into()));
    }

    /// Finishes the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::DuplicateChannel`] if two fields share a channel.
    pub fn build(self) -> Result<DeviceSnapshot, DecodeError> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for (id, _) in &self.fields {
            if !seen.insert(id) {
                return Err(DecodeError::DuplicateChannel(id.to_string()));
            }
        }

        Ok(DeviceSnapshot {
            sequence: self.sequence,
            observed_at: self.observed_at,
            fields: self.fields,
        })
    }
}
