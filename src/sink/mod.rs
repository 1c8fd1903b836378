// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound interface to the host integration.
//!
//! The engine reports channel updates and device status through a
//! [`PublisherSink`]. The host integration implements it (typically by
//! forwarding to its own state-update API); [`EventBus`] is a ready-made
//! implementation fanning updates out over a tokio broadcast channel.
//!
//! # Examples
//!
//! ```
//! use pollsync_lib::sink::{EventBus, SinkEvent};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! // In a task:
//! // while let Ok(event) = rx.recv().await {
//! //     match event {
//! //         SinkEvent::ChannelUpdated { device_id, delta } => { ... }
//! //         SinkEvent::StatusChanged { device_id, status } => { ... }
//! //     }
//! // }
//! ```

mod event_bus;
mod sink_event;

pub use event_bus::EventBus;
pub use sink_event::SinkEvent;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::snapshot::ChannelDelta;
use crate::types::DeviceId;

/// Why a device is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusDetail {
    /// The device could not be reached or answered garbage; polling goes on.
    CommunicationError,
    /// The device rejected the configuration (e.g. credentials); polling stopped.
    ConfigurationError,
}

/// Device status as reported to the host integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Polling started, no answer yet.
    Unknown,
    /// The last poll succeeded.
    Online,
    /// The device is unreachable or misconfigured.
    Offline {
        /// Classification of the failure.
        detail: StatusDetail,
        /// Human-readable reason.
        reason: String,
    },
}

impl DeviceStatus {
    /// Creates an offline status caused by communication failures.
    #[must_use]
    pub fn communication_error(reason: impl Into<String>) -> Self {
        Self::Offline {
            detail: StatusDetail::CommunicationError,
            reason: reason.into(),
        }
    }

    /// Creates an offline status caused by a configuration problem.
    #[must_use]
    pub fn configuration_error(reason: impl Into<String>) -> Self {
        Self::Offline {
            detail: StatusDetail::ConfigurationError,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the device is online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Returns `true` if the device is offline for any reason.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("UNKNOWN"),
            Self::Online => f.write_str("ONLINE"),
            Self::Offline {
                detail: StatusDetail::CommunicationError,
                reason,
            } => write!(f, "OFFLINE (COMMUNICATION_ERROR): {reason}"),
            Self::Offline {
                detail: StatusDetail::ConfigurationError,
                reason,
            } => write!(f, "OFFLINE (CONFIGURATION_ERROR): {reason}"),
        }
    }
}

/// Receiver of channel updates and status changes.
///
/// Calls are bounded by the engine's sink timeout. A failing or slow sink
/// is logged and never affects poll scheduling.
pub trait PublisherSink: Send + Sync + 'static {
    /// Publishes one changed channel.
    fn publish(
        &self,
        device_id: &DeviceId,
        delta: ChannelDelta,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Reports a device status change.
    fn report_status(
        &self,
        device_id: &DeviceId,
        status: DeviceStatus,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl<S: PublisherSink> PublisherSink for Arc<S> {
    fn publish(
        &self,
        device_id: &DeviceId,
        delta: ChannelDelta,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        S::publish(self, device_id, delta)
    }

    fn report_status(
        &self,
        device_id: &DeviceId,
        status: DeviceStatus,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        S::report_status(self, device_id, status)
    }
}
