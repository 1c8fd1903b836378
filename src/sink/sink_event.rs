// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sink event types.

use crate::snapshot::ChannelDelta;
use crate::types::DeviceId;

use super::DeviceStatus;

/// Events broadcast by the [`EventBus`](super::EventBus) sink.
///
/// # Examples
///
/// ```
/// use pollsync_lib::sink::{DeviceStatus, SinkEvent};
/// use pollsync_lib::snapshot::ChannelDelta;
/// use pollsync_lib::types::DeviceId;
///
/// let device_id = DeviceId::new("inverter");
///
/// let update = SinkEvent::channel_updated(device_id.clone(), ChannelDelta::new("power", 812.5));
/// let status = SinkEvent::status_changed(device_id, DeviceStatus::Online);
///
/// assert!(update.is_channel_update());
/// assert!(status.is_status_change());
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    /// A channel changed value.
    ChannelUpdated {
        /// The device the channel belongs to.
        device_id: DeviceId,
        /// The changed channel.
        delta: ChannelDelta,
    },

    /// The device status changed.
    StatusChanged {
        /// The device.
        device_id: DeviceId,
        /// The new status.
        status: DeviceStatus,
    },
}

impl SinkEvent {
    /// Returns the device ID associated with this event.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::ChannelUpdated { device_id, .. } | Self::StatusChanged { device_id, .. } => {
                device_id
            }
        }
    }

    /// Returns `true` if this is a channel update.
    #[must_use]
    pub fn is_channel_update(&self) -> bool {
        matches!(self, Self::ChannelUpdated { .. })
    }

    /// Returns `true` if this is a status change.
    #[must_use]
    pub fn is_status_change(&self) -> bool {
        matches!(self, Self::StatusChanged { .. })
    }

    /// Creates a channel update event.
    #[must_use]
    pub fn channel_updated(device_id: DeviceId, delta: ChannelDelta) -> Self {
        Self::ChannelUpdated { device_id, delta }
    }

    /// Creates a status change event.
    #[must_use]
    pub fn status_changed(device_id: DeviceId, status: DeviceStatus) -> Self {
        Self::StatusChanged { device_id, status }
    }
}
