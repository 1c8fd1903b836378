// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outcome of one poll.

use crate::error::{Error, TransportErrorKind};
use crate::snapshot::DeviceSnapshot;

/// Outcome of one fetch + decode cycle, as seen by the scheduler.
///
/// Failures never escape the poll worker as errors: they are classified
/// here and drive the session's backoff or stop logic.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// The device answered with a decodable payload.
    Success(DeviceSnapshot),
    /// The poll failed in a way that may resolve by itself.
    TransientFailure(String),
    /// The poll failed in a way that needs new configuration.
    FatalFailure(String),
}

impl PollResult {
    /// Classifies the outcome of a fetch + decode cycle.
    ///
    /// Authentication failures (rejected by the transport or reported in
    /// the payload) are fatal unless `recoverable_auth` is set. Every other
    /// failure, including malformed payloads, is transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use pollsync_lib::engine::PollResult;
    /// use pollsync_lib::error::{Error, TransportError};
    ///
    /// let timeout: Error = TransportError::timeout(std::time::Duration::from_secs(5)).into();
    /// assert!(PollResult::from_outcome(Err(timeout), false).is_transient());
    ///
    /// let denied: Error = TransportError::auth_failure("HTTP 401").into();
    /// assert!(PollResult::from_outcome(Err(denied), false).is_fatal());
    /// ```
    #[must_use]
    pub fn from_outcome(outcome: Result<DeviceSnapshot, Error>, recoverable_auth: bool) -> Self {
        let error = match outcome {
            Ok(snapshot) => return Self::Success(snapshot),
            Err(error) => error,
        };

        let auth = match &error {
            Error::Transport(e) => e.kind() == TransportErrorKind::AuthFailure,
            Error::Decode(e) => e.is_auth(),
            _ => false,
        };

        let reason = match &error {
            Error::Transport(e) => e.to_string(),
            Error::Decode(e) => e.to_string(),
            other => other.to_string(),
        };

        if auth && !recoverable_auth {
            Self::FatalFailure(reason)
        } else {
            Self::TransientFailure(reason)
        }
    }

    /// Returns `true` for a successful poll.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` for a transient failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }

    /// Returns `true` for a fatal failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::decoder::DecodeContext;
    use crate::error::{DecodeError, TransportError};

    fn classify(error: impl Into<Error>) -> PollResult {
        PollResult::from_outcome(Err(error.into()), false)
    }

    #[test]
    fn success_passes_snapshot_through() {
        let snapshot = DeviceSnapshot::builder(&DecodeContext::new(Utc::now(), 1))
            .field("power", 1.0)
            .build()
            .unwrap();
        let result = PollResult::from_outcome(Ok(snapshot.clone()), false);
        assert_eq!(result, PollResult::Success(snapshot));
    }

    #[test]
    fn network_failures_are_transient() {
        assert!(classify(TransportError::timeout(Duration::from_secs(1))).is_transient());
        assert!(classify(TransportError::connection_refused("refused")).is_transient());
        assert!(classify(TransportError::other("HTTP 500 - Internal Server Error")).is_transient());
    }

    #[test]
    fn malformed_payload_is_transient() {
        assert!(classify(DecodeError::MissingField("power".into())).is_transient());
        assert!(
            classify(DecodeError::FieldCount {
                expected: 3,
                actual: 1
            })
            .is_transient()
        );
        assert!(classify(DecodeError::Panicked("index out of bounds".into())).is_transient());
    }

    #[test]
    fn auth_failures_are_fatal() {
        let result = classify(TransportError::auth_failure("HTTP 401"));
        assert_eq!(
            result,
            PollResult::FatalFailure("authentication failed: HTTP 401".to_string())
        );
        assert!(classify(DecodeError::Unauthorized("bad token".into())).is_fatal());
    }

    #[test]
    fn recoverable_auth_downgrades_to_transient() {
        let error: Error = TransportError::auth_failure("HTTP 403").into();
        assert!(PollResult::from_outcome(Err(error), true).is_transient());
    }
}
