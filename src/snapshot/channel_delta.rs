// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel delta representation.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, ChannelValue};

/// A single changed channel: the channel identifier and its new value.
///
/// Deltas are produced by [`diff`](super::diff) and handed straight to the
/// [`PublisherSink`](crate::sink::PublisherSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDelta {
    channel: ChannelId,
    value: ChannelValue,
}

impl ChannelDelta {
    /// Creates a delta.
    #[must_use]
    pub fn new(channel: impl Into<ChannelId>, value: impl Into<ChannelValue>) -> Self {
        Self {
            channel: channel.into(),
            value: value.into(),
        }
    }

    /// Returns the channel identifier.
    #[must_use]
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Returns the new value.
    #[must_use]
    pub fn value(&self) -> &ChannelValue {
        &self.value
    }

    /// Splits the delta into its parts.
    #[must_use]
    pub fn into_parts(self) -> (ChannelId, ChannelValue) {
        (self.channel, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let delta = ChannelDelta::new("power", 42.0);
        assert_eq!(delta.channel().as_str(), "power");
        assert_eq!(delta.value(), &ChannelValue::Decimal(42.0));

        let (channel, value) = delta.into_parts();
        assert_eq!(channel, ChannelId::new("power"));
        assert_eq!(value, ChannelValue::Decimal(42.0));
    }
}
