// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport adapters performing one network round-trip per poll.
//!
//! A [`Transport`] fetches the raw state of a device and classifies any
//! failure as a [`TransportError`]. Transports never retry: retry and
//! backoff belong to the poll scheduler.
//!
//! # Transports
//!
//! - [`HttpTransport`]: HTTP GET/POST against a REST endpoint (feature `http`)
//! - [`MqttTransport`]: request/response over MQTT topics (feature `mqtt`)
//! - [`ModbusTransport`]: register block read over Modbus TCP (feature `modbus`)

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "modbus")]
mod modbus;
#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "http")]
pub use http::{HttpMethod, HttpTransport, HttpTransportBuilder};
#[cfg(feature = "modbus")]
pub use modbus::{ModbusTransport, RegisterKind};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttTransport, MqttTransportBuilder};

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Authentication credentials for a device or broker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username for authentication.
    pub username: String,
    /// Password or API token.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One network round-trip to a device.
///
/// Implementations must honour `timeout` and must report every failure as a
/// [`TransportError`] instead of panicking.
///
/// # Examples
///
/// A transport serving a canned payload, handy in tests:
///
/// ```
/// use std::future::Future;
/// use std::time::Duration;
/// use pollsync_lib::error::TransportError;
/// use pollsync_lib::protocol::{Credentials, Transport};
///
/// struct Canned(&'static [u8]);
///
/// impl Transport for Canned {
///     fn fetch(
///         &self,
///         _address: &str,
///         _credentials: Option<&Credentials>,
///         _timeout: Duration,
///     ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
///         let body = self.0.to_vec();
///         async move { Ok(body) }
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Fetches the raw device state.
    ///
    /// # Arguments
    ///
    /// * `address` - Device address (host, URL, topic) from the device configuration
    /// * `credentials` - Optional credentials from the device configuration
    /// * `timeout` - Upper bound for the whole round-trip
    fn fetch(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}
