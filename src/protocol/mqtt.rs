// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};

use crate::error::TransportError;
use crate::protocol::{Credentials, Transport};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// MQTT transport treating a state topic as the device endpoint.
///
/// Each fetch opens one broker session, subscribes to the topic given as
/// the device address, optionally publishes a request payload (for devices
/// that only report on demand) and returns the first message received on
/// the state topic. Retained state messages are returned immediately.
///
/// Credentials passed to [`fetch`](Transport::fetch) are used for the
/// broker connection.
///
/// # Examples
///
/// ```
/// use pollsync_lib::protocol::MqttTransport;
///
/// let transport = MqttTransport::builder()
///     .broker("mqtt://192.168.1.50:1883")
///     .request("cmnd/plug/STATUS", "8")
///     .build()
///     .unwrap();
///
/// assert_eq!(transport.broker_host(), "192.168.1.50");
/// assert_eq!(transport.broker_port(), 1883);
/// ```
#[derive(Debug, Clone)]
pub struct MqttTransport {
    host: String,
    port: u16,
    request: Option<(String, String)>,
    keep_alive: Duration,
    client_prefix: String,
}

impl MqttTransport {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MqttTransportBuilder {
        MqttTransportBuilder::new()
    }

    /// Returns the broker host.
    #[must_use]
    pub fn broker_host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn broker_port(&self) -> u16 {
        self.port
    }

    fn options(&self, credentials: Option<&Credentials>) -> MqttOptions {
        // Unique per fetch (PID + counter) so concurrent polls never kick each other off
        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("{}_{}_{}", self.client_prefix, std::process::id(), counter);

        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(creds) = credentials {
            options.set_credentials(creds.username.clone(), creds.password.clone());
        }
        options
    }
}

impl Transport for MqttTransport {
    fn fetch(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let options = self.options(credentials);
        let state_topic = address.to_string();
        let request = self.request.clone();

        async move {
            let (client, event_loop) = AsyncClient::new(options, 10);

            client
                .subscribe(&state_topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| TransportError::other(e.to_string()))?;

            if let Some((topic, payload)) = request {
                tracing::debug!(topic = %topic, payload = %payload, "Publishing MQTT poll request");
                client
                    .publish(topic, QoS::AtLeastOnce, false, payload)
                    .await
                    .map_err(|e| TransportError::other(e.to_string()))?;
            }

            let result = tokio::time::timeout(timeout, wait_for_state(event_loop, &state_topic))
                .await
                .map_err(|_| TransportError::timeout(timeout))?;

            // The event loop is gone at this point; dropping the client closes the session
            drop(client);
            result
        }
    }
}

/// Drives the event loop until a message arrives on `state_topic`.
async fn wait_for_state(
    mut event_loop: EventLoop,
    state_topic: &str,
) -> Result<Vec<u8>, TransportError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::trace!(?connack, "MQTT connected");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == state_topic => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "Received MQTT state message"
                );
                return Ok(publish.payload.to_vec());
            }
            Ok(_) => {}
            Err(e) => return Err(classify(e)),
        }
    }
}

/// Maps a rumqttc connection failure onto the transport taxonomy.
fn classify(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(
            code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
        ) => TransportError::auth_failure(format!("broker refused connection: {code:?}")),
        ConnectionError::ConnectionRefused(code) => {
            TransportError::connection_refused(format!("broker refused connection: {code:?}"))
        }
        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => TransportError::connection_refused(e.to_string()),
            _ => TransportError::other(e.to_string()),
        },
        ConnectionError::NetworkTimeout => TransportError::new(
            crate::error::TransportErrorKind::Timeout,
            "broker network timeout",
        ),
        other => TransportError::other(other.to_string()),
    }
}

/// Parses an MQTT URL into host and port.
fn parse_mqtt_url(url: &str) -> Result<(String, u16), TransportError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| TransportError::other(format!("invalid broker port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), 1883)
    };

    if host.is_empty() {
        return Err(TransportError::other("broker host is empty"));
    }

    Ok((host, port))
}

/// Builder for [`MqttTransport`].
#[derive(Debug, Default)]
pub struct MqttTransportBuilder {
    broker: Option<String>,
    request: Option<(String, String)>,
    keep_alive: Option<Duration>,
    client_prefix: Option<String>,
}

impl MqttTransportBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the MQTT broker URL (`mqtt://host:port`, `tcp://host:port` or `host:port`).
    #[must_use]
    pub fn broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    /// Publishes `payload` on `topic` after subscribing, on every fetch.
    #[must_use]
    pub fn request(mut self, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        self.request = Some((topic.into(), payload.into()));
        self
    }

    /// Sets the MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Sets the prefix of generated client IDs.
    #[must_use]
    pub fn client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_prefix = Some(prefix.into());
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is missing or invalid.
    pub fn build(self) -> Result<MqttTransport, TransportError> {
        let broker = self
            .broker
            .ok_or_else(|| TransportError::other("broker URL is required"))?;
        let (host, port) = parse_mqtt_url(&broker)?;

        Ok(MqttTransport {
            host,
            port,
            request: self.request,
            keep_alive: self.keep_alive.unwrap_or(Duration::from_secs(30)),
            client_prefix: self.client_prefix.unwrap_or_else(|| "pollsync".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url_with_scheme() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1884").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1884);
    }

    #[test]
    fn parse_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://broker.local:1883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_url_default_port() {
        let (host, port) = parse_mqtt_url("broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_url_invalid_port() {
        assert!(parse_mqtt_url("mqtt://broker:abc").is_err());
    }

    #[test]
    fn builder_requires_broker() {
        assert!(MqttTransportBuilder::new().build().is_err());
    }

    #[test]
    fn classify_bad_credentials() {
        let err = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword,
        ));
        assert_eq!(err.kind(), crate::error::TransportErrorKind::AuthFailure);

        let err = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert_eq!(
            err.kind(),
            crate::error::TransportErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn classify_io_refused() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify(ConnectionError::Io(io));
        assert_eq!(
            err.kind(),
            crate::error::TransportErrorKind::ConnectionRefused
        );
    }
}
