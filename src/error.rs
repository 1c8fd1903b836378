// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `PollSync` library.
//!
//! This module provides the error hierarchy used across the library:
//! network round-trips ([`TransportError`]), payload decoding
//! ([`DecodeError`]), configuration validation ([`ConfigError`]) and
//! publishing to the host integration ([`SinkError`]). Sink failures never
//! reach callers of the engine: they are logged and the poll carries on.
//!
//! None of these errors ever stop the process. The poll scheduler promotes
//! transport and decode errors into a [`PollResult`](crate::engine::PollResult)
//! and decides between backoff and a hard stop.

use std::fmt;

use thiserror::Error;

use crate::types::DeviceId;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A network round-trip failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A device configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Device is not managed by the engine.
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    /// Device already has an active poll session.
    #[error("device {0} is already running")]
    AlreadyRunning(DeviceId),
}

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// No answer within the caller-specified timeout.
    Timeout,
    /// The remote end refused or dropped the connection.
    ConnectionRefused,
    /// The remote end rejected the credentials.
    AuthFailure,
    /// Anything else (unexpected status code, protocol error, bad address).
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::AuthFailure => "authentication failed",
            Self::Other => "transport failure",
        };
        f.write_str(name)
    }
}

/// Error returned by a [`Transport`](crate::protocol::Transport) round-trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Creates a transport error of the given kind.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout error for the given duration.
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout,
            format!("no answer after {} ms", after.as_millis()),
        )
    }

    /// Creates a connection-refused error.
    #[must_use]
    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionRefused, message)
    }

    /// Creates an authentication failure.
    #[must_use]
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::AuthFailure, message)
    }

    /// Creates an unclassified transport failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Returns the failure classification.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while turning raw bytes into a snapshot.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Payload has the wrong number of fields.
    #[error("expected {expected} fields, got {actual}")]
    FieldCount {
        /// Number of fields the decoder declares.
        expected: usize,
        /// Number of fields found in the payload.
        actual: usize,
    },

    /// A numeric literal could not be parsed.
    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber {
        /// The field that failed to parse.
        field: String,
        /// The offending literal.
        value: String,
    },

    /// A required field is absent.
    #[error("missing field in payload: {0}")]
    MissingField(String),

    /// The payload does not have the expected shape.
    #[error("unexpected payload schema: {0}")]
    UnexpectedSchema(String),

    /// Two fields of one snapshot map to the same channel.
    #[error("channel {0} declared twice")]
    DuplicateChannel(String),

    /// The decoder panicked on this payload.
    #[error("decoder panicked: {0}")]
    Panicked(String),

    /// The device answered, but the payload says the credentials were rejected.
    #[error("device rejected credentials: {0}")]
    Unauthorized(String),
}

impl DecodeError {
    /// Returns `true` if the payload reports an authentication failure.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Errors raised by [`PollConfig::validate`](crate::engine::PollConfig::validate).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Device address is empty.
    #[error("device address must not be empty")]
    EmptyAddress,

    /// Poll interval is zero.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    /// Request timeout is zero.
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    /// Failure threshold is zero.
    #[error("failure threshold must be at least 1")]
    ZeroThreshold,

    /// Backoff ceiling is below the base interval.
    #[error("backoff ceiling ({ceiling_secs}s) is below the poll interval ({interval_secs}s)")]
    CeilingBelowInterval {
        /// Configured ceiling.
        ceiling_secs: u64,
        /// Configured base interval.
        interval_secs: u64,
    },

    /// Backoff multiplier would not grow the interval.
    #[error("backoff multiplier must be a finite number > 1.0, got {0}")]
    InvalidMultiplier(String),
}

/// Errors reported by a [`PublisherSink`](crate::sink::PublisherSink).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The host integration is gone.
    #[error("sink closed: {0}")]
    Closed(String),

    /// The host integration did not answer in time.
    #[error("sink did not answer within {0} ms")]
    Timeout(u64),

    /// The host integration refused the update.
    #[error("sink rejected update: {0}")]
    Rejected(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::connection_refused("127.0.0.1:80");
        assert_eq!(err.to_string(), "connection refused: 127.0.0.1:80");
        assert_eq!(err.kind(), TransportErrorKind::ConnectionRefused);
    }

    #[test]
    fn timeout_error_mentions_duration() {
        let err = TransportError::timeout(std::time::Duration::from_millis(1500));
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
        assert_eq!(err.message(), "no answer after 1500 ms");
    }

    #[test]
    fn error_from_transport_error() {
        let err: Error = TransportError::auth_failure("401").into();
        assert!(matches!(err, Error::Transport(e) if e.kind() == TransportErrorKind::AuthFailure));
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::FieldCount {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.to_string(), "expected 4 fields, got 3");
    }

    #[test]
    fn decode_error_auth_classification() {
        assert!(DecodeError::Unauthorized("token expired".into()).is_auth());
        assert!(!DecodeError::MissingField("power".into()).is_auth());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::CeilingBelowInterval {
            ceiling_secs: 5,
            interval_secs: 10,
        };
        assert_eq!(
            err.to_string(),
            "backoff ceiling (5s) is below the poll interval (10s)"
        );
    }
}
