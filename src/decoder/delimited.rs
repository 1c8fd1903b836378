// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delimited text decoder.

use crate::error::DecodeError;
use crate::snapshot::DeviceSnapshot;
use crate::types::ChannelId;

use super::{DecodeContext, Decoder, FieldKind};

#[derive(Debug, Clone)]
struct Column {
    channel: ChannelId,
    kind: FieldKind,
    scale: Option<f64>,
}

/// Decoder for line-oriented devices answering with one delimited record,
/// such as `21.5;48;1013;ON`.
///
/// Columns are mapped by position. The record must carry exactly as many
/// columns as declared (skipped columns included), otherwise the payload is
/// rejected with [`DecodeError::FieldCount`]. An empty column is treated as
/// "not reported" and left out of the snapshot.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pollsync_lib::decoder::{DecodeContext, Decoder, DelimitedDecoder, FieldKind};
/// use pollsync_lib::types::ChannelValue;
///
/// let decoder = DelimitedDecoder::new(';')
///     .column("temperature", FieldKind::Decimal)
///     .skip_column()
///     .column("relay", FieldKind::Bool);
///
/// let snapshot = decoder.decode(b"21.5;x;ON\n", &DecodeContext::new(Utc::now(), 1)).unwrap();
/// assert_eq!(snapshot.get("relay"), Some(&ChannelValue::Bool(true)));
/// ```
#[derive(Debug, Clone)]
pub struct DelimitedDecoder {
    separator: char,
    skip_lines: usize,
    columns: Vec<Option<Column>>,
}

impl DelimitedDecoder {
    /// Creates a decoder splitting on `separator`.
    #[must_use]
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            skip_lines: 0,
            columns: Vec::new(),
        }
    }

    /// Skips leading lines (e.g. a header row) before the record.
    #[must_use]
    pub fn with_skip_lines(mut self, lines: usize) -> Self {
        self.skip_lines = lines;
        self
    }

    /// Declares the next column.
    #[must_use]
    pub fn column(mut self, channel: impl Into<ChannelId>, kind: FieldKind) -> Self {
        self.columns.push(Some(Column {
            channel: channel.into(),
            kind,
            scale: None,
        }));
        self
    }

    /// Declares the next column as a numeric value multiplied by `scale`.
    #[must_use]
    pub fn scaled_column(mut self, channel: impl Into<ChannelId>, kind: FieldKind, scale: f64) -> Self {
        self.columns.push(Some(Column {
            channel: channel.into(),
            kind,
            scale: Some(scale),
        }));
        self
    }

    /// Declares the next column as ignored.
    #[must_use]
    pub fn skip_column(mut self) -> Self {
        self.columns.push(None);
        self
    }
}

impl Decoder for DelimitedDecoder {
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        let text = std::str::from_utf8(raw)?;
        let record = text
            .lines()
            .skip(self.skip_lines)
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| DecodeError::UnexpectedSchema("no record in payload".to_string()))?;

        let values: Vec<&str> = record.split(self.separator).collect();
        if values.len() != self.columns.len() {
            return Err(DecodeError::FieldCount {
                expected: self.columns.len(),
                actual: values.len(),
            });
        }

        let mut builder = DeviceSnapshot::builder(ctx);
        for (column, literal) in self.columns.iter().zip(values) {
            let Some(column) = column else { continue };
            if literal.trim().is_empty() {
                continue;
            }
            let value = column
                .kind
                .parse_literal(column.channel.as_str(), literal, column.scale)?;
            builder.push(column.channel.clone(), value);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::types::ChannelValue;

    fn ctx() -> DecodeContext {
        DecodeContext::new(DateTime::<Utc>::UNIX_EPOCH, 1)
    }

    fn weather() -> DelimitedDecoder {
        DelimitedDecoder::new(';')
            .column("temperature", FieldKind::Decimal)
            .column("humidity", FieldKind::Integer)
            .scaled_column("pressure", FieldKind::Integer, 0.1)
            .column("rain", FieldKind::Bool)
    }

    #[test]
    fn decodes_record() {
        let snapshot = weather().decode(b"21.5;48;10132;OFF\r\n", &ctx()).unwrap();

        assert_eq!(snapshot.get("temperature"), Some(&ChannelValue::Decimal(21.5)));
        assert_eq!(snapshot.get("humidity"), Some(&ChannelValue::Integer(48)));
        assert_eq!(
            snapshot.get("pressure"),
            Some(&ChannelValue::Decimal(10132.0 * 0.1))
        );
        assert_eq!(snapshot.get("rain"), Some(&ChannelValue::Bool(false)));
    }

    #[test]
    fn wrong_field_count() {
        let err = weather().decode(b"21.5;48;10132", &ctx()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::FieldCount {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn empty_column_is_not_reported() {
        let snapshot = weather().decode(b"21.5;;10132;ON", &ctx()).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("humidity"), None);
    }

    #[test]
    fn header_is_skipped() {
        let snapshot = weather()
            .with_skip_lines(1)
            .decode(b"temp;hum;press;rain\n19.0;50;10100;ON\n", &ctx())
            .unwrap();
        assert_eq!(snapshot.get("temperature"), Some(&ChannelValue::Decimal(19.0)));
    }

    #[test]
    fn empty_payload() {
        let err = weather().decode(b"\n\n", &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedSchema(_)));
    }

    #[test]
    fn invalid_utf8() {
        let err = weather().decode(&[0xff, 0xfe], &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }

    #[test]
    fn unparseable_number() {
        let err = weather().decode(b"warm;48;10132;ON", &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { ref field, .. } if field == "temperature"));
    }
}
