// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT transport using mockforge-mqtt.

use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use pollsync_lib::error::TransportErrorKind;
use pollsync_lib::protocol::{MqttTransport, Transport};
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;
}

// ============================================================================
// MqttTransport Tests
// ============================================================================
//
// NOTE: The mockforge-mqtt broker used for testing doesn't fully support
// pub/sub message forwarding between clients, so a successful state fetch
// can only be tested against a real broker like Mosquitto.

mod mqtt_transport {
    use super::*;

    #[tokio::test]
    async fn silent_device_times_out() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let transport = MqttTransport::builder()
            .broker(format!("mqtt://127.0.0.1:{port}"))
            .request("cmnd/airq/STATUS", "10")
            .build()
            .unwrap();

        let err = transport
            .fetch("stat/airq/STATUS10", None, Duration::from_millis(800))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
    }

    #[tokio::test]
    async fn missing_broker_is_connection_refused() {
        // Nothing listens on this port
        let port = get_test_port();

        let transport = MqttTransport::builder()
            .broker(format!("127.0.0.1:{port}"))
            .build()
            .unwrap();

        let err = transport
            .fetch("stat/airq/STATUS10", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn builder_parses_broker_url() {
        let transport = MqttTransport::builder()
            .broker("tcp://broker.local:1884")
            .build()
            .unwrap();

        assert_eq!(transport.broker_host(), "broker.local");
        assert_eq!(transport.broker_port(), 1884);
    }
}
