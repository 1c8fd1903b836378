// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON payload decoders.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;
use crate::snapshot::{DeviceSnapshot, SnapshotBuilder};
use crate::types::{ChannelId, ChannelValue};

use super::{DecodeContext, Decoder, FieldKind, apply_scale, scale_integer};

/// One channel extracted from a JSON document.
#[derive(Debug, Clone)]
struct JsonField {
    channel: ChannelId,
    pointer: String,
    kind: FieldKind,
    scale: Option<f64>,
    required: bool,
}

/// Decoder mapping JSON pointers (RFC 6901) to channels.
///
/// Fields are published in the order they are declared. A missing or `null`
/// value is skipped unless the field is marked required, in which case the
/// payload is rejected with [`DecodeError::MissingField`].
///
/// Cloud APIs often answer `200 OK` with an error document when a token
/// expires. [`with_auth_error_pointer`](Self::with_auth_error_pointer) names
/// the member that carries such an error; when it is present the payload is
/// rejected with [`DecodeError::Unauthorized`].
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pollsync_lib::decoder::{DecodeContext, Decoder, FieldKind, JsonDecoder};
/// use pollsync_lib::types::ChannelValue;
///
/// let decoder = JsonDecoder::new()
///     .required_field("pm25", "/current/pm25/conc", FieldKind::Decimal)
///     .field("co2", "/current/co2", FieldKind::Integer)
///     .scaled_field("temperature", "/current/tp", FieldKind::Integer, 0.1);
///
/// let payload = br#"{"current":{"pm25":{"conc":8.5},"co2":412,"tp":215}}"#;
/// let snapshot = decoder.decode(payload, &DecodeContext::new(Utc::now(), 1)).unwrap();
///
/// assert_eq!(snapshot.get("co2"), Some(&ChannelValue::Integer(412)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    fields: Vec<JsonField>,
    auth_error_pointer: Option<String>,
}

impl JsonDecoder {
    /// Creates a decoder without any field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an optional field.
    #[must_use]
    pub fn field(self, channel: impl Into<ChannelId>, pointer: impl Into<String>, kind: FieldKind) -> Self {
        self.push(channel.into(), pointer.into(), kind, None, false)
    }

    /// Declares a field that must be present.
    #[must_use]
    pub fn required_field(
        self,
        channel: impl Into<ChannelId>,
        pointer: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        self.push(channel.into(), pointer.into(), kind, None, true)
    }

    /// Declares an optional numeric field multiplied by `scale`.
    #[must_use]
    pub fn scaled_field(
        self,
        channel: impl Into<ChannelId>,
        pointer: impl Into<String>,
        kind: FieldKind,
        scale: f64,
    ) -> Self {
        self.push(channel.into(), pointer.into(), kind, Some(scale), false)
    }

    /// Names the member whose presence signals rejected credentials.
    #[must_use]
    pub fn with_auth_error_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.auth_error_pointer = Some(pointer.into());
        self
    }

    /// Returns the number of declared fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn push(
        mut self,
        channel: ChannelId,
        pointer: String,
        kind: FieldKind,
        scale: Option<f64>,
        required: bool,
    ) -> Self {
        self.fields.push(JsonField {
            channel,
            pointer,
            kind,
            scale,
            required,
        });
        self
    }

    fn check_auth(&self, document: &Value) -> Result<(), DecodeError> {
        let Some(pointer) = &self.auth_error_pointer else {
            return Ok(());
        };

        match document.pointer(pointer) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(message)) => Err(DecodeError::Unauthorized(message.clone())),
            Some(other) => Err(DecodeError::Unauthorized(other.to_string())),
        }
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        let document: Value = serde_json::from_slice(raw)?;
        self.check_auth(&document)?;

        if !document.is_object() && !document.is_array() {
            return Err(DecodeError::UnexpectedSchema(format!(
                "expected a JSON object or array, got {document}"
            )));
        }

        let mut builder = DeviceSnapshot::builder(ctx);
        for field in &self.fields {
            match document.pointer(&field.pointer) {
                None | Some(Value::Null) if field.required => {
                    return Err(DecodeError::MissingField(field.pointer.clone()));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    let converted = convert(field, value)?;
                    builder.push(field.channel.clone(), converted);
                }
            }
        }
        builder.build()
    }
}

fn convert(field: &JsonField, value: &Value) -> Result<ChannelValue, DecodeError> {
    let name = field.channel.as_str();
    let schema_error = || {
        DecodeError::UnexpectedSchema(format!(
            "{name}: {value} cannot be read as {:?}",
            field.kind
        ))
    };

    match (field.kind, value) {
        (_, Value::String(literal)) => field.kind.parse_literal(name, literal, field.scale),
        (FieldKind::Bool, Value::Bool(b)) => Ok(ChannelValue::Bool(*b)),
        (FieldKind::Bool, Value::Number(n)) => Ok(ChannelValue::Bool(n.as_f64() != Some(0.0))),
        (FieldKind::Integer, Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(scale_integer(v, field.scale)),
            None => Err(DecodeError::InvalidNumber {
                field: name.to_string(),
                value: n.to_string(),
            }),
        },
        (FieldKind::Decimal, Value::Number(n)) => n
            .as_f64()
            .map(|v| ChannelValue::Decimal(apply_scale(v, field.scale)))
            .ok_or_else(schema_error),
        (FieldKind::Text, Value::Bool(_) | Value::Number(_)) => {
            Ok(ChannelValue::Text(value.to_string()))
        }
        _ => Err(schema_error()),
    }
}

/// A `serde` DTO that knows how to lay itself out as snapshot fields.
///
/// Implement this for a strongly typed response struct and decode it with
/// [`TypedJsonDecoder`].
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use pollsync_lib::decoder::{DecodeContext, Decoder, SnapshotFields, TypedJsonDecoder};
/// use pollsync_lib::snapshot::SnapshotBuilder;
///
/// #[derive(serde::Deserialize)]
/// struct NodeData {
///     temperature: f64,
///     humidity: i64,
/// }
///
/// impl SnapshotFields for NodeData {
///     fn write_fields(&self, builder: &mut SnapshotBuilder) {
///         builder.push("temperature", self.temperature);
///         builder.push("humidity", self.humidity);
///     }
/// }
///
/// let decoder = TypedJsonDecoder::<NodeData>::new();
/// let snapshot = decoder
///     .decode(br#"{"temperature":19.5,"humidity":48}"#, &DecodeContext::new(Utc::now(), 1))
///     .unwrap();
/// assert_eq!(snapshot.len(), 2);
/// ```
pub trait SnapshotFields {
    /// Appends this value's fields, in declared order.
    fn write_fields(&self, builder: &mut SnapshotBuilder);
}

/// Decoder for a strongly typed JSON DTO.
pub struct TypedJsonDecoder<T> {
    _dto: PhantomData<fn() -> T>,
}

impl<T> TypedJsonDecoder<T> {
    /// Creates the decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { _dto: PhantomData }
    }
}

impl<T> Default for TypedJsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedJsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedJsonDecoder")
            .field("dto", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Decoder for TypedJsonDecoder<T>
where
    T: DeserializeOwned + SnapshotFields + 'static,
{
    fn decode(&self, raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        let dto: T = serde_json::from_slice(raw)?;
        let mut builder = DeviceSnapshot::builder(ctx);
        dto.write_fields(&mut builder);
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::new(DateTime::<Utc>::UNIX_EPOCH, 1)
    }

    fn airvisual() -> JsonDecoder {
        JsonDecoder::new()
            .required_field("pm25", "/current/pm25/conc", FieldKind::Decimal)
            .field("co2", "/current/co2", FieldKind::Integer)
            .scaled_field("temperature", "/current/tp", FieldKind::Integer, 0.1)
            .field("status", "/status", FieldKind::Text)
            .with_auth_error_pointer("/error")
    }

    #[test]
    fn decodes_declared_fields_in_order() {
        let payload = br#"{"status":"ok","current":{"tp":215,"co2":412,"pm25":{"conc":8.5}}}"#;
        let snapshot = airvisual().decode(payload, &ctx()).unwrap();

        let channels: Vec<&str> = snapshot.fields().map(|(id, _)| id.as_str()).collect();
        assert_eq!(channels, ["pm25", "co2", "temperature", "status"]);
        assert_eq!(snapshot.get("pm25"), Some(&ChannelValue::Decimal(8.5)));
        assert_eq!(
            snapshot.get("temperature"),
            Some(&ChannelValue::Decimal(215.0 * 0.1))
        );
    }

    #[test]
    fn optional_field_may_be_absent() {
        let payload = br#"{"current":{"pm25":{"conc":8.5},"co2":null}}"#;
        let snapshot = airvisual().decode(payload, &ctx()).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("co2"), None);
    }

    #[test]
    fn required_field_missing() {
        let err = airvisual()
            .decode(br#"{"current":{"co2":400}}"#, &ctx())
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(ref p) if p == "/current/pm25/conc"));
    }

    #[test]
    fn numbers_sent_as_strings_are_parsed() {
        let payload = br#"{"current":{"pm25":{"conc":"9.25"},"co2":"415"}}"#;
        let snapshot = airvisual().decode(payload, &ctx()).unwrap();

        assert_eq!(snapshot.get("pm25"), Some(&ChannelValue::Decimal(9.25)));
        assert_eq!(snapshot.get("co2"), Some(&ChannelValue::Integer(415)));
    }

    #[test]
    fn unparseable_numeric_literal() {
        let err = airvisual()
            .decode(br#"{"current":{"pm25":{"conc":"n/a"}}}"#, &ctx())
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { .. }));
    }

    #[test]
    fn fractional_integer_is_rejected() {
        let err = airvisual()
            .decode(br#"{"current":{"pm25":{"conc":1},"co2":410.5}}"#, &ctx())
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidNumber { ref field, .. } if field == "co2"));
    }

    #[test]
    fn auth_error_member_is_unauthorized() {
        let err = airvisual()
            .decode(br#"{"error":"invalid api key"}"#, &ctx())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unauthorized(ref m) if m == "invalid api key"));
    }

    #[test]
    fn malformed_json() {
        let err = airvisual().decode(b"{\"current\":", &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn scalar_document_is_unexpected() {
        let err = airvisual().decode(b"42", &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedSchema(_)));
    }

    #[test]
    fn object_where_number_expected() {
        let err = airvisual()
            .decode(br#"{"current":{"pm25":{"conc":{"v":1}}}}"#, &ctx())
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedSchema(_)));
    }

    #[test]
    fn bool_from_number_and_text() {
        let decoder = JsonDecoder::new()
            .field("relay", "/relay", FieldKind::Bool)
            .field("label", "/flag", FieldKind::Text);
        let snapshot = decoder
            .decode(br#"{"relay":1,"flag":true}"#, &ctx())
            .unwrap();

        assert_eq!(snapshot.get("relay"), Some(&ChannelValue::Bool(true)));
        assert_eq!(
            snapshot.get("label"),
            Some(&ChannelValue::Text("true".into()))
        );
    }

    #[test]
    fn same_bytes_same_snapshot() {
        let payload = br#"{"current":{"pm25":{"conc":8.5},"co2":412}}"#;
        let a = airvisual().decode(payload, &ctx()).unwrap();
        let b = airvisual().decode(payload, &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[derive(serde::Deserialize)]
    struct BatteryDto {
        soc: i64,
        charging: bool,
    }

    impl SnapshotFields for BatteryDto {
        fn write_fields(&self, builder: &mut SnapshotBuilder) {
            builder.push("soc", self.soc);
            builder.push("charging", self.charging);
        }
    }

    #[test]
    fn typed_decoder() {
        let decoder = TypedJsonDecoder::<BatteryDto>::new();
        let snapshot = decoder
            .decode(br#"{"soc":81,"charging":false}"#, &ctx())
            .unwrap();

        assert_eq!(snapshot.get("soc"), Some(&ChannelValue::Integer(81)));
        assert_eq!(snapshot.get("charging"), Some(&ChannelValue::Bool(false)));
    }

    #[test]
    fn typed_decoder_rejects_wrong_shape() {
        let decoder = TypedJsonDecoder::<BatteryDto>::new();
        let err = decoder.decode(br#"{"soc":"x"}"#, &ctx()).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
