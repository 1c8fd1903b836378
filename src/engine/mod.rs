// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Poll scheduling and device lifecycle.
//!
//! - [`PollEngine`]: starts, stops and reconfigures devices
//! - [`PollScheduler`]: drives the timer and the poll worker of one device
//! - [`DeviceSession`]: what the scheduler remembers between two polls
//! - [`PollResult`]: classified outcome of one poll
//! - [`PollConfig`]: per-device timings and credentials
//!
//! # Scheduling
//!
//! After [`PollEngine::start`], the first poll runs after
//! `first_poll_delay` and then every `poll_interval`. Each transient
//! failure multiplies the interval by `backoff_multiplier`, capped at
//! `backoff_ceiling`; the device is reported offline once
//! `failure_threshold` consecutive failures are reached. A success restores
//! the base interval. Authentication failures stop polling until the
//! device is reconfigured.

mod controller;
mod poll_config;
mod poll_result;
mod scheduler;
mod session;

pub use controller::PollEngine;
pub use poll_config::PollConfig;
pub use poll_result::PollResult;
pub use scheduler::{PollContext, PollScheduler, PollState, StopReason, TickOutcome};
pub use session::{DeviceSession, SessionInfo, Transition};
