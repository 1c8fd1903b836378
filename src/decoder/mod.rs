// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload decoders.
//!
//! A [`Decoder`] turns the raw bytes returned by a
//! [`Transport`](crate::protocol::Transport) into a [`DeviceSnapshot`].
//! Decoders are pure: identical bytes and an identical [`DecodeContext`]
//! always produce an identical snapshot. The observation time is passed in
//! through the context, decoders never read a clock.
//!
//! # Decoders
//!
//! - [`JsonDecoder`]: maps JSON pointers to channels (REST APIs, MQTT payloads)
//! - [`TypedJsonDecoder`]: deserializes a `serde` DTO implementing [`SnapshotFields`]
//! - [`DelimitedDecoder`]: maps columns of a delimited text line to channels
//! - [`RegisterDecoder`]: maps 16-bit register offsets to channels (Modbus)
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use pollsync_lib::decoder::{DecodeContext, Decoder, FieldKind, JsonDecoder};
//!
//! let decoder = JsonDecoder::new()
//!     .field("power", "/Body/Data/PAC/Value", FieldKind::Decimal)
//!     .field("status", "/Body/Data/DeviceStatus/StatusCode", FieldKind::Integer);
//!
//! let payload = br#"{"Body":{"Data":{"PAC":{"Value":812.5},"DeviceStatus":{"StatusCode":7}}}}"#;
//! let snapshot = decoder.decode(payload, &DecodeContext::new(Utc::now(), 1)).unwrap();
//!
//! assert_eq!(snapshot.len(), 2);
//! ```

mod delimited;
mod json;
mod registers;

pub use delimited::DelimitedDecoder;
pub use json::{JsonDecoder, SnapshotFields, TypedJsonDecoder};
pub use registers::{RegisterDecoder, RegisterType};

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::snapshot::DeviceSnapshot;
use crate::types::ChannelValue;

/// Inputs a decoder may use besides the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeContext {
    observed_at: DateTime<Utc>,
    sequence: u64,
}

impl DecodeContext {
    /// Creates a decode context.
    ///
    /// # Arguments
    ///
    /// * `observed_at` - When the payload was fetched
    /// * `sequence` - Version number the resulting snapshot must carry
    #[must_use]
    pub fn new(observed_at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            observed_at,
            sequence,
        }
    }

    /// Returns the observation time.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Returns the snapshot sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Turns raw bytes into a snapshot.
///
/// Implemented for closures, which keeps one-off decoders short:
///
/// ```
/// use pollsync_lib::decoder::{DecodeContext, Decoder};
/// use pollsync_lib::error::DecodeError;
/// use pollsync_lib::snapshot::DeviceSnapshot;
///
/// let decoder = |raw: &[u8], ctx: &DecodeContext| -> Result<DeviceSnapshot, DecodeError> {
///     let text = std::str::from_utf8(raw)?;
///     DeviceSnapshot::builder(ctx).field("raw", text).build()
/// };
/// # let _ = decoder.decode(b"ok", &DecodeContext::new(chrono::Utc::now(), 1));
/// ```
pub trait Decoder: Send + Sync + 'static {
    /// Decodes one payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is malformed or reports an
    /// authentication failure.
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError>;
}

impl<F> Decoder for F
where
    F: Fn(&[u8], &DecodeContext) -> Result<DeviceSnapshot, DecodeError> + Send + Sync + 'static,
{
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        self(raw, ctx)
    }
}

/// Declared type of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// `ON`/`OFF`, `true`/`false`, `1`/`0`.
    Bool,
    /// Signed integer.
    Integer,
    /// Decimal number.
    Decimal,
    /// Free-form text.
    Text,
}

impl FieldKind {
    /// Parses a textual literal into a value of this kind.
    ///
    /// `scale` multiplies numeric values; a scaled integer becomes a decimal.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidNumber`] for unparseable numbers and
    /// [`DecodeError::UnexpectedSchema`] for unknown boolean literals.
    pub fn parse_literal(
        self,
        field: &str,
        literal: &str,
        scale: Option<f64>,
    ) -> Result<ChannelValue, DecodeError> {
        let literal = literal.trim();
        let invalid = || DecodeError::InvalidNumber {
            field: field.to_string(),
            value: literal.to_string(),
        };

        match self {
            Self::Bool => parse_bool(literal).map(ChannelValue::Bool).ok_or_else(|| {
                DecodeError::UnexpectedSchema(format!("{field}: {literal:?} is not a boolean"))
            }),
            Self::Integer => {
                let value: i64 = literal.parse().map_err(|_| invalid())?;
                Ok(scale_integer(value, scale))
            }
            Self::Decimal => {
                let value: f64 = literal.parse().map_err(|_| invalid())?;
                Ok(ChannelValue::Decimal(apply_scale(value, scale)))
            }
            Self::Text => Ok(ChannelValue::Text(literal.to_string())),
        }
    }
}

fn parse_bool(literal: &str) -> Option<bool> {
    match literal.to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "1" | "OPEN" | "YES" => Some(true),
        "OFF" | "FALSE" | "0" | "CLOSED" | "NO" => Some(false),
        _ => None,
    }
}

fn apply_scale(value: f64, scale: Option<f64>) -> f64 {
    scale.map_or(value, |factor| value * factor)
}

#[allow(clippy::cast_precision_loss)]
fn scale_integer(value: i64, scale: Option<f64>) -> ChannelValue {
    match scale {
        Some(factor) => ChannelValue::Decimal(value as f64 * factor),
        None => ChannelValue::Integer(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_literals() {
        for on in ["ON", "on", "true", "1", "OPEN"] {
            assert_eq!(
                FieldKind::Bool.parse_literal("f", on, None).unwrap(),
                ChannelValue::Bool(true)
            );
        }
        assert_eq!(
            FieldKind::Bool.parse_literal("f", " off ", None).unwrap(),
            ChannelValue::Bool(false)
        );
        assert!(matches!(
            FieldKind::Bool.parse_literal("f", "maybe", None),
            Err(DecodeError::UnexpectedSchema(_))
        ));
    }

    #[test]
    fn parse_integer_with_and_without_scale() {
        assert_eq!(
            FieldKind::Integer.parse_literal("f", "42", None).unwrap(),
            ChannelValue::Integer(42)
        );
        assert_eq!(
            FieldKind::Integer.parse_literal("f", "215", Some(0.1)).unwrap(),
            ChannelValue::Decimal(215.0 * 0.1)
        );
    }

    #[test]
    fn parse_invalid_number() {
        let err = FieldKind::Decimal
            .parse_literal("temperature", "12,5", None)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidNumber { ref field, ref value } if field == "temperature" && value == "12,5"
        ));
    }

    #[test]
    fn closure_is_a_decoder() {
        let decoder = |_: &[u8], ctx: &DecodeContext| DeviceSnapshot::builder(ctx).build();
        let snapshot = decoder
            .decode(b"", &DecodeContext::new(DateTime::<Utc>::UNIX_EPOCH, 3))
            .unwrap();
        assert_eq!(snapshot.sequence(), 3);
    }
}
