// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device snapshots and change detection.
//!
//! A [`DeviceSnapshot`] is one fully decoded observation of a device. The
//! [`diff`] function compares two consecutive snapshots and yields the
//! [`ChannelDelta`]s that must be published to the host.
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use pollsync_lib::decoder::DecodeContext;
//! use pollsync_lib::snapshot::{DeviceSnapshot, diff};
//!
//! let ctx = DecodeContext::new(Utc::now(), 1);
//! let first = DeviceSnapshot::builder(&ctx)
//!     .field("power", 120.0)
//!     .field("online", true)
//!     .build()
//!     .unwrap();
//!
//! // First poll: everything is published
//! assert_eq!(diff(None, &first).len(), 2);
//!
//! let ctx = DecodeContext::new(Utc::now(), 2);
//! let second = DeviceSnapshot::builder(&ctx)
//!     .field("power", 95.5)
//!     .field("online", true)
//!     .build()
//!     .unwrap();
//!
//! // Only the changed channel is published
//! let deltas = diff(Some(&first), &second);
//! assert_eq!(deltas.len(), 1);
//! assert_eq!(deltas[0].channel().as_str(), "power");
//! ```

mod channel_delta;
mod device_snapshot;
mod differ;

pub use channel_delta::ChannelDelta;
pub use device_snapshot::{DeviceSnapshot, SnapshotBuilder};
pub use differ::diff;
