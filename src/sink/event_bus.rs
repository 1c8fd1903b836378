// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast sink.

use std::future::Future;

use tokio::sync::broadcast;

use super::{DeviceStatus, PublisherSink, SinkEvent};
use crate::error::SinkError;
use crate::snapshot::ChannelDelta;
use crate::types::DeviceId;

/// Default channel capacity for the event bus.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Sink broadcasting every update to any number of subscribers.
///
/// The `EventBus` uses tokio's broadcast channel: each subscriber gets its
/// own copy of each event. Publishing never blocks the poll scheduler.
///
/// # Capacity
///
/// The event bus has a fixed capacity (default 256). If a subscriber is
/// slow, older events are dropped for that subscriber (it receives a
/// `RecvError::Lagged` error).
///
/// # Examples
///
/// ```
/// use pollsync_lib::sink::{DeviceStatus, EventBus, SinkEvent};
/// use pollsync_lib::types::DeviceId;
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.send(SinkEvent::status_changed(DeviceId::new("airq"), DeviceStatus::Online));
///
/// let event = rx.try_recv().unwrap();
/// assert!(event.is_status_change());
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SinkEvent>,
}

impl EventBus {
    /// Creates a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a new event bus with the specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events that can be buffered
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to sink events.
    ///
    /// Returns a receiver that will receive all events published after
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// If there are no subscribers, the event is silently discarded.
    pub fn send(&self, event: SinkEvent) {
        // No subscribers is not an error for a broadcast sink
        let _ = self.sender.send(event);
    }

    /// Broadcasts an event and returns the number of receivers that got it.
    #[must_use]
    pub fn send_counted(&self, event: SinkEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl PublisherSink for EventBus {
    fn publish(
        &self,
        device_id: &DeviceId,
        delta: ChannelDelta,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.send(SinkEvent::channel_updated(device_id.clone(), delta));
        std::future::ready(Ok(()))
    }

    fn report_status(
        &self,
        device_id: &DeviceId,
        status: DeviceStatus,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.send(SinkEvent::status_changed(device_id.clone(), status));
        std::future::ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_has_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_and_drop_track_count() {
        let bus = EventBus::new();

        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn publish_delivers_channel_update() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let id = DeviceId::new("inverter");

        bus.publish(&id, ChannelDelta::new("power", 812.5))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            SinkEvent::channel_updated(id, ChannelDelta::new("power", 812.5))
        );
    }

    #[tokio::test]
    async fn report_status_delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let id = DeviceId::new("inverter");

        bus.report_status(&id, DeviceStatus::Online).await.unwrap();

        assert!(rx1.recv().await.unwrap().is_status_change());
        assert!(rx2.recv().await.unwrap().is_status_change());
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = EventBus::new();
        let id = DeviceId::new("inverter");
        assert!(bus.report_status(&id, DeviceStatus::Unknown).await.is_ok());
    }

    #[test]
    fn send_counted_reports_receivers() {
        let bus = EventBus::new();
        let id = DeviceId::new("inverter");
        assert_eq!(
            bus.send_counted(SinkEvent::status_changed(id.clone(), DeviceStatus::Online)),
            0
        );

        let _rx = bus.subscribe();
        assert_eq!(
            bus.send_counted(SinkEvent::status_changed(id, DeviceStatus::Online)),
            1
        );
    }

    #[tokio::test]
    async fn cloned_bus_shares_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.send(SinkEvent::status_changed(DeviceId::new("a"), DeviceStatus::Online));
        assert!(rx.recv().await.unwrap().is_status_change());
    }
}
