// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel identifiers and values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of one observable attribute of a device (e.g. `power`, `temperature`).
///
/// # Examples
///
/// ```
/// use pollsync_lib::types::ChannelId;
///
/// let id = ChannelId::new("power");
/// assert_eq!(id.as_str(), "power");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    /// Creates a channel identifier.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A value observed on a channel.
///
/// Equality is exact for every variant. Decimals are compared by bit
/// pattern: devices report discretized readings, so no tolerance is
/// applied, and a `NaN` reading compares equal to itself.
///
/// # Examples
///
/// ```
/// use pollsync_lib::types::ChannelValue;
///
/// assert_eq!(ChannelValue::Decimal(21.5), ChannelValue::Decimal(21.5));
/// assert_ne!(ChannelValue::Decimal(21.5), ChannelValue::Decimal(21.500_001));
/// assert_ne!(ChannelValue::Integer(1), ChannelValue::Decimal(1.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ChannelValue {
    /// Switch or contact state.
    Bool(bool),
    /// Integer reading or enumerated status code.
    Integer(i64),
    /// Decimal reading.
    Decimal(f64),
    /// Free-form text.
    Text(String),
    /// The device no longer reports this channel.
    Undefined,
}

impl ChannelValue {
    /// Returns `true` for [`ChannelValue::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns the value as `f64` for numeric variants.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for ChannelValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Undefined, Self::Undefined) => true,
            _ => false,
        }
    }
}

impl Eq for ChannelValue {}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", if *v { "ON" } else { "OFF" }),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Undefined => f.write_str("UNDEF"),
        }
    }
}

impl From<bool> for ChannelValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ChannelValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for ChannelValue {
    fn from(v: f64) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for ChannelValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}
