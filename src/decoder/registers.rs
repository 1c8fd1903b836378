// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder for blocks of 16-bit registers (Modbus).

use crate::error::DecodeError;
use crate::snapshot::DeviceSnapshot;
use crate::types::{ChannelId, ChannelValue};

use super::{DecodeContext, Decoder, apply_scale, scale_integer};

/// Data type stored at a register offset.
///
/// 32-bit types span two registers, high word first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// IEEE 754 single precision.
    F32,
}

impl RegisterType {
    /// Number of registers the type occupies.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U16 | Self::I16 => 1,
            Self::U32 | Self::I32 | Self::F32 => 2,
        }
    }
}

#[derive(Debug, Clone)]
struct RegisterField {
    channel: ChannelId,
    offset: usize,
    ty: RegisterType,
    scale: Option<f64>,
}

/// Decoder for a register block returned by
/// [`ModbusTransport`](crate::protocol::ModbusTransport) (or any transport
/// returning big-endian 16-bit words).
///
/// Offsets are relative to the first register of the block.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pollsync_lib::decoder::{DecodeContext, Decoder, RegisterDecoder, RegisterType};
/// use pollsync_lib::types::ChannelValue;
///
/// let decoder = RegisterDecoder::new()
///     .field("battery_soc", 0, RegisterType::U16)
///     .field("grid_power", 1, RegisterType::I32);
///
/// // 81, then -1500 as two big-endian words
/// let raw = [0x00, 0x51, 0xFF, 0xFF, 0xFA, 0x24];
/// let snapshot = decoder.decode(&raw, &DecodeContext::new(Utc::now(), 1)).unwrap();
///
/// assert_eq!(snapshot.get("grid_power"), Some(&ChannelValue::Integer(-1500)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegisterDecoder {
    fields: Vec<RegisterField>,
}

impl RegisterDecoder {
    /// Creates a decoder without any field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field at `offset`.
    #[must_use]
    pub fn field(mut self, channel: impl Into<ChannelId>, offset: usize, ty: RegisterType) -> Self {
        self.fields.push(RegisterField {
            channel: channel.into(),
            offset,
            ty,
            scale: None,
        });
        self
    }

    /// Declares a field at `offset` multiplied by `scale`.
    #[must_use]
    pub fn scaled_field(
        mut self,
        channel: impl Into<ChannelId>,
        offset: usize,
        ty: RegisterType,
        scale: f64,
    ) -> Self {
        self.fields.push(RegisterField {
            channel: channel.into(),
            offset,
            ty,
            scale: Some(scale),
        });
        self
    }

    /// Number of registers the declared fields span.
    #[must_use]
    pub fn register_count(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.offset + f.ty.width())
            .max()
            .unwrap_or(0)
    }
}

impl Decoder for RegisterDecoder {
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        if raw.len() % 2 != 0 {
            return Err(DecodeError::UnexpectedSchema(format!(
                "register block has odd length {}",
                raw.len()
            )));
        }

        let words: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        let needed = self.register_count();
        if words.len() < needed {
            return Err(DecodeError::FieldCount {
                expected: needed,
                actual: words.len(),
            });
        }

        let mut builder = DeviceSnapshot::builder(ctx);
        for field in &self.fields {
            let word = |i: usize| words[field.offset + i];
            let value = match field.ty {
                RegisterType::U16 => scale_integer(i64::from(word(0)), field.scale),
                RegisterType::I16 => scale_integer(i64::from(word(0).cast_signed()), field.scale),
                RegisterType::U32 => scale_integer(i64::from(double_word(word(0), word(1))), field.scale),
                RegisterType::I32 => scale_integer(
                    i64::from(double_word(word(0), word(1)).cast_signed()),
                    field.scale,
                ),
                RegisterType::F32 => {
                    let raw = f32::from_bits(double_word(word(0), word(1)));
                    ChannelValue::Decimal(apply_scale(f64::from(raw), field.scale))
                }
            };
            builder.push(field.channel.clone(), value);
        }
        builder.build()
    }
}

fn double_word(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::new(DateTime::<Utc>::UNIX_EPOCH, 1)
    }

    fn bytes(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn decodes_all_types() {
        let decoder = RegisterDecoder::new()
            .field("u16", 0, RegisterType::U16)
            .field("i16", 1, RegisterType::I16)
            .field("u32", 2, RegisterType::U32)
            .field("i32", 4, RegisterType::I32)
            .field("f32", 6, RegisterType::F32);

        let f = 12.5_f32.to_bits();
        #[allow(clippy::cast_possible_truncation)]
        let raw = bytes(&[
            65535,
            0xFFFE,
            0x0001,
            0x0000,
            0xFFFF,
            0xFFFF,
            (f >> 16) as u16,
            f as u16,
        ]);
        let snapshot = decoder.decode(&raw, &ctx()).unwrap();

        assert_eq!(snapshot.get("u16"), Some(&ChannelValue::Integer(65535)));
        assert_eq!(snapshot.get("i16"), Some(&ChannelValue::Integer(-2)));
        assert_eq!(snapshot.get("u32"), Some(&ChannelValue::Integer(65536)));
        assert_eq!(snapshot.get("i32"), Some(&ChannelValue::Integer(-1)));
        assert_eq!(snapshot.get("f32"), Some(&ChannelValue::Decimal(12.5)));
    }

    #[test]
    fn scaled_register() {
        let decoder = RegisterDecoder::new().scaled_field("voltage", 0, RegisterType::U16, 0.1);
        let snapshot = decoder.decode(&bytes(&[2301]), &ctx()).unwrap();
        assert_eq!(
            snapshot.get("voltage"),
            Some(&ChannelValue::Decimal(2301.0 * 0.1))
        );
    }

    #[test]
    fn short_block() {
        let decoder = RegisterDecoder::new().field("energy", 2, RegisterType::U32);
        assert_eq!(decoder.register_count(), 4);

        let err = decoder.decode(&bytes(&[1, 2, 3]), &ctx()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::FieldCount {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn odd_length() {
        let decoder = RegisterDecoder::new().field("x", 0, RegisterType::U16);
        let err = decoder.decode(&[0x00, 0x01, 0x02], &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedSchema(_)));
    }
}
