// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier and value types shared across the engine.
//!
//! # Types
//!
//! - [`DeviceId`] - Host-supplied identifier of one polled device
//! - [`SessionId`] - Identifier of one poll session (minted on every start)
//! - [`ChannelId`] - Name of one observable attribute of a device
//! - [`ChannelValue`] - Value published on a channel

mod channel;
mod device_id;

pub use channel::{ChannelId, ChannelValue};
pub use device_id::{DeviceId, SessionId};
