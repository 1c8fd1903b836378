// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `PollSync` Lib - A Rust library to poll devices and publish their state.
//!
//! The library periodically fetches the state of network devices, decodes
//! it into snapshots, compares each snapshot with the previous one and
//! publishes only the channels that changed. One generic engine replaces
//! per-device polling loops: plug in a transport and a decoder, and the
//! engine takes care of timing, backoff, offline detection and lifecycle.
//!
//! # Building Blocks
//!
//! - **Transports** ([`protocol`]): HTTP, MQTT and Modbus TCP round-trips
//! - **Decoders** ([`decoder`]): JSON, typed JSON, delimited text, registers
//! - **Differ** ([`snapshot`]): snapshot comparison into channel deltas
//! - **Engine** ([`engine`]): per-device scheduling, backoff and lifecycle
//! - **Sink** ([`sink`]): outbound updates to the host integration
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use pollsync_lib::decoder::{FieldKind, JsonDecoder};
//! use pollsync_lib::engine::{PollConfig, PollEngine};
//! use pollsync_lib::protocol::HttpTransport;
//! use pollsync_lib::sink::{EventBus, SinkEvent};
//! use pollsync_lib::types::DeviceId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Fronius inverter realtime API
//!     let transport = HttpTransport::builder()
//!         .path("/solar_api/v1/GetInverterRealtimeData.cgi")
//!         .query("Scope", "Device")
//!         .query("DataCollection", "CommonInverterData")
//!         .build()?;
//!     let decoder = JsonDecoder::new()
//!         .field("power", "/Body/Data/PAC/Value", FieldKind::Decimal)
//!         .field("day_energy", "/Body/Data/DAY_ENERGY/Value", FieldKind::Decimal);
//!
//!     let bus = EventBus::new();
//!     let mut events = bus.subscribe();
//!     let engine = PollEngine::new(transport, decoder, bus);
//!
//!     engine
//!         .start(
//!             DeviceId::new("inverter"),
//!             PollConfig::new("192.168.1.50").with_poll_interval(Duration::from_secs(10)),
//!         )
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             SinkEvent::ChannelUpdated { device_id, delta } => {
//!                 println!("{device_id}: {} = {}", delta.channel(), delta.value());
//!             }
//!             SinkEvent::StatusChanged { device_id, status } => {
//!                 println!("{device_id} is now {status}");
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom Devices
//!
//! Any type implementing [`protocol::Transport`] or [`decoder::Decoder`]
//! plugs into the engine, and closures are decoders too:
//!
//! ```
//! use pollsync_lib::decoder::{DecodeContext, Decoder};
//! use pollsync_lib::error::DecodeError;
//! use pollsync_lib::snapshot::DeviceSnapshot;
//!
//! // "OK;23.5" -> state, temperature
//! let decoder = |raw: &[u8], ctx: &DecodeContext| -> Result<DeviceSnapshot, DecodeError> {
//!     let text = std::str::from_utf8(raw)?;
//!     let (state, temp) = text
//!         .split_once(';')
//!         .ok_or_else(|| DecodeError::UnexpectedSchema(text.to_string()))?;
//!     let temp: f64 = temp.trim().parse().map_err(|_| DecodeError::InvalidNumber {
//!         field: "temperature".into(),
//!         value: temp.to_string(),
//!     })?;
//!     DeviceSnapshot::builder(ctx)
//!         .field("state", state)
//!         .field("temperature", temp)
//!         .build()
//! };
//!
//! let snapshot = decoder
//!     .decode(b"OK;23.5", &DecodeContext::new(chrono::Utc::now(), 1))
//!     .unwrap();
//! assert_eq!(snapshot.len(), 2);
//! ```

pub mod decoder;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod sink;
pub mod snapshot;
pub mod types;

pub use decoder::{DecodeContext, Decoder};
pub use engine::{PollConfig, PollEngine, PollResult, PollState};
pub use error::{ConfigError, DecodeError, Error, Result, SinkError, TransportError};
pub use protocol::{Credentials, Transport};
pub use sink::{DeviceStatus, EventBus, PublisherSink, SinkEvent, StatusDetail};
pub use snapshot::{ChannelDelta, DeviceSnapshot, diff};
pub use types::{ChannelId, ChannelValue, DeviceId, SessionId};
