// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Snapshot comparison.

use std::collections::HashMap;

use crate::types::{ChannelId, ChannelValue};

use super::{ChannelDelta, DeviceSnapshot};

/// Computes the channels that changed between two consecutive snapshots.
///
/// - With no previous snapshot (first successful poll, or a forced
///   refresh), every field of `current` is emitted.
/// - Otherwise a field is emitted when it is new or its value differs
///   under [`ChannelValue`] equality.
/// - Channels carried by `previous` but absent from `current` are emitted
///   as [`ChannelValue::Undefined`].
///
/// Deltas follow the declared field order of `current`, then the declared
/// order of `previous` for vanished channels. The output never depends on
/// hash order.
#[must_use]
pub fn diff(previous: Option<&DeviceSnapshot>, current: &DeviceSnapshot) -> Vec<ChannelDelta> {
    let Some(previous) = previous else {
        return current
            .fields()
            .map(|(id, value)| ChannelDelta::new(id.clone(), value.clone()))
            .collect();
    };

    let before: HashMap<&ChannelId, &ChannelValue> = previous.fields().collect();

    let mut deltas: Vec<ChannelDelta> = current
        .fields()
        .filter(|(id, value)| before.get(id).is_none_or(|old| *old != *value))
        .map(|(id, value)| ChannelDelta::new(id.clone(), value.clone()))
        .collect();

    let vanished = previous
        .fields()
        .filter(|(id, value)| !value.is_undefined() && current.get(id.as_str()).is_none())
        .map(|(id, _)| ChannelDelta::new(id.clone(), ChannelValue::Undefined));
    deltas.extend(vanished);

    deltas
}
