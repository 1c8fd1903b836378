// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Modbus TCP transport.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio_modbus::client::Reader;
use tokio_modbus::slave::Slave;

use crate::error::TransportError;
use crate::protocol::{Credentials, Transport};

/// Modbus TCP default port.
const DEFAULT_PORT: u16 = 502;

/// Register table to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterKind {
    /// Holding registers (function code 3).
    #[default]
    Holding,
    /// Input registers (function code 4).
    Input,
}

/// Transport reading one block of registers over Modbus TCP.
///
/// The device address is `host` or `host:port` (default port 502). The
/// registers are returned as big-endian bytes, two per register, ready for
/// [`RegisterDecoder`](crate::decoder::RegisterDecoder). Credentials are
/// ignored: Modbus has no authentication.
///
/// # Examples
///
/// ```
/// use pollsync_lib::protocol::{ModbusTransport, RegisterKind};
///
/// // E3DC simple-mode block: 40001..40104
/// let transport = ModbusTransport::new(40000, 104)
///     .with_kind(RegisterKind::Holding)
///     .with_unit_id(1);
/// assert_eq!(transport.register_count(), 104);
/// ```
#[derive(Debug, Clone)]
pub struct ModbusTransport {
    start: u16,
    count: u16,
    kind: RegisterKind,
    unit_id: Option<u8>,
}

impl ModbusTransport {
    /// Creates a transport reading `count` registers starting at `start`
    /// (zero-based protocol address).
    #[must_use]
    pub fn new(start: u16, count: u16) -> Self {
        Self {
            start,
            count,
            kind: RegisterKind::default(),
            unit_id: None,
        }
    }

    /// Sets the register table.
    #[must_use]
    pub fn with_kind(mut self, kind: RegisterKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the Modbus unit (slave) id.
    #[must_use]
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    /// Returns the number of registers read per fetch.
    #[must_use]
    pub fn register_count(&self) -> u16 {
        self.count
    }

    async fn read_block(&self, address: &str) -> Result<Vec<u8>, TransportError> {
        let socket_addr = resolve(address).await?;

        let mut ctx = match self.unit_id {
            Some(unit) => tokio_modbus::client::tcp::connect_slave(socket_addr, Slave(unit)).await,
            None => tokio_modbus::client::tcp::connect(socket_addr).await,
        }
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset => {
                TransportError::connection_refused(e.to_string())
            }
            _ => TransportError::other(e.to_string()),
        })?;

        let response = match self.kind {
            RegisterKind::Holding => ctx.read_holding_registers(self.start, self.count).await,
            RegisterKind::Input => ctx.read_input_registers(self.start, self.count).await,
        };

        let words = match response {
            Ok(Ok(words)) => words,
            Ok(Err(exception)) => {
                return Err(TransportError::other(format!(
                    "device answered with exception {exception:?}"
                )));
            }
            Err(e) => return Err(TransportError::other(format!("modbus read failed: {e:?}"))),
        };

        tracing::trace!(%address, registers = words.len(), "Read Modbus register block");

        Ok(words.iter().flat_map(|w| w.to_be_bytes()).collect())
    }
}

impl Transport for ModbusTransport {
    fn fetch(
        &self,
        address: &str,
        _credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let address = address.to_string();
        async move {
            tokio::time::timeout(timeout, self.read_block(&address))
                .await
                .map_err(|_| TransportError::timeout(timeout))?
        }
    }
}

/// Resolves `host[:port]` to a socket address.
async fn resolve(address: &str) -> Result<SocketAddr, TransportError> {
    let target = if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_PORT}")
    };

    tokio::net::lookup_host(&target)
        .await
        .map_err(|e| TransportError::other(format!("cannot resolve {target}: {e}")))?
        .next()
        .ok_or_else(|| TransportError::other(format!("no address for {target}")))
}
