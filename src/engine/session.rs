// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device poll session.
//!
//! [`DeviceSession`] holds everything the scheduler remembers about a
//! device between two polls. Its transition function is synchronous and
//! free of I/O: it takes a [`PollResult`] and returns a [`Transition`]
//! telling the scheduler what to publish and whether to keep polling.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::poll_config::PollConfig;
use super::poll_result::PollResult;
use super::scheduler::StopReason;
use crate::decoder::DecodeContext;
use crate::sink::DeviceStatus;
use crate::snapshot::{ChannelDelta, DeviceSnapshot, diff};
use crate::types::SessionId;

/// What the scheduler must do after a poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Status to report, only present when it changed.
    pub status: Option<DeviceStatus>,
    /// Channel updates to publish, in declared order.
    pub deltas: Vec<ChannelDelta>,
    /// Set when polling must stop.
    pub stop: Option<StopReason>,
    /// Set when the next-tick interval changed.
    pub interval_changed: bool,
}

/// State of one device between polls.
///
/// Created on every start, so a restarted device always begins with an
/// empty snapshot and a fresh [`SessionId`].
#[derive(Debug, Clone)]
pub struct DeviceSession {
    session_id: SessionId,
    config: PollConfig,
    snapshot: Option<DeviceSnapshot>,
    current_interval: Duration,
    consecutive_failures: u32,
    status: DeviceStatus,
    force_full: bool,
    next_sequence: u64,
}

impl DeviceSession {
    /// Creates a session for a validated configuration.
    #[must_use]
    pub fn new(config: PollConfig) -> Self {
        Self {
            session_id: SessionId::new(),
            current_interval: config.poll_interval(),
            config,
            snapshot: None,
            consecutive_failures: 0,
            status: DeviceStatus::Unknown,
            force_full: false,
            next_sequence: 1,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the configuration the session runs with.
    #[must_use]
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Returns the last accepted snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<&DeviceSnapshot> {
        self.snapshot.as_ref()
    }

    /// Returns the interval until the next tick.
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Returns the number of transient failures since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the last reported status.
    #[must_use]
    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    /// Returns `true` if the next success publishes every field.
    #[must_use]
    pub fn full_refresh_pending(&self) -> bool {
        self.force_full
    }

    /// Makes the next successful poll publish every field.
    pub fn request_full_refresh(&mut self) {
        self.force_full = true;
    }

    /// Reserves the sequence number for the next poll.
    pub fn next_context(&mut self, observed_at: DateTime<Utc>) -> DecodeContext {
        let ctx = DecodeContext::new(observed_at, self.next_sequence);
        self.next_sequence += 1;
        ctx
    }

    /// Applies the result of one poll.
    pub fn on_result(&mut self, result: PollResult) -> Transition {
        match result {
            PollResult::Success(snapshot) => self.on_success(snapshot),
            PollResult::TransientFailure(reason) => self.on_transient(reason),
            PollResult::FatalFailure(reason) => self.on_fatal(reason),
        }
    }

    fn on_success(&mut self, snapshot: DeviceSnapshot) -> Transition {
        if let Some(current) = &self.snapshot
            && snapshot.sequence() <= current.sequence()
        {
            tracing::debug!(
                session_id = %self.session_id,
                sequence = snapshot.sequence(),
                current = current.sequence(),
                "Ignoring stale snapshot"
            );
            return Transition::default();
        }

        let deltas = if self.force_full {
            self.force_full = false;
            let mut all = diff(None, &snapshot);
            // Channels that vanished since the previous snapshot still go undefined
            all.extend(
                diff(self.snapshot.as_ref(), &snapshot)
                    .into_iter()
                    .filter(|d| snapshot.get(d.channel().as_str()).is_none()),
            );
            all
        } else {
            diff(self.snapshot.as_ref(), &snapshot)
        };

        let base = self.config.poll_interval();
        let interval_changed = self.current_interval != base;
        self.current_interval = base;
        self.consecutive_failures = 0;
        self.snapshot = Some(snapshot);

        Transition {
            status: self.set_status(DeviceStatus::Online),
            deltas,
            stop: None,
            interval_changed,
        }
    }

    fn on_transient(&mut self, reason: String) -> Transition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let next = self.config.next_interval(self.current_interval);
        let interval_changed = next != self.current_interval;
        self.current_interval = next;

        let status = if self.consecutive_failures == self.config.failure_threshold {
            self.set_status(DeviceStatus::communication_error(reason))
        } else {
            None
        };

        Transition {
            status,
            deltas: Vec::new(),
            stop: None,
            interval_changed,
        }
    }

    fn on_fatal(&mut self, reason: String) -> Transition {
        Transition {
            status: self.set_status(DeviceStatus::configuration_error(reason.clone())),
            deltas: Vec::new(),
            stop: Some(StopReason::Fatal(reason)),
            interval_changed: false,
        }
    }

    /// Records `status` and returns it if it differs from the previous one.
    fn set_status(&mut self, status: DeviceStatus) -> Option<DeviceStatus> {
        if self.status == status {
            return None;
        }
        self.status = status.clone();
        Some(status)
    }
}

/// Read-only view of a running session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session identifier.
    pub session_id: SessionId,
    /// Transient failures since the last success.
    pub consecutive_failures: u32,
    /// Interval until the next tick.
    pub current_interval: Duration,
    /// Last reported status.
    pub status: DeviceStatus,
    /// Last accepted snapshot.
    pub last_snapshot: Option<DeviceSnapshot>,
}

impl From<&DeviceSession> for SessionInfo {
    fn from(session: &DeviceSession) -> Self {
        Self {
            session_id: session.session_id,
            consecutive_failures: session.consecutive_failures,
            current_interval: session.current_interval,
            status: session.status.clone(),
            last_snapshot: session.snapshot.clone(),
        }
    }
}
