// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle controller for polled devices.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};

use super::poll_config::PollConfig;
use super::scheduler::{PollContext, PollScheduler, PollState};
use super::session::SessionInfo;
use crate::decoder::Decoder;
use crate::error::Error;
use crate::protocol::Transport;
use crate::sink::PublisherSink;
use crate::types::{DeviceId, SessionId};

/// Entry point of the engine: starts, stops and reconfigures devices.
///
/// One engine serves one device type: a single transport, decoder and sink
/// are shared by every device it polls. Each device runs its own
/// [`PollScheduler`]; the device map is only locked by lifecycle calls,
/// never on the poll path.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use pollsync_lib::decoder::{FieldKind, JsonDecoder};
/// use pollsync_lib::engine::{PollConfig, PollEngine};
/// use pollsync_lib::protocol::HttpTransport;
/// use pollsync_lib::sink::{EventBus, SinkEvent};
/// use pollsync_lib::types::DeviceId;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = HttpTransport::builder().path("/data").build()?;
///     let decoder = JsonDecoder::new()
///         .field("co2", "/co2", FieldKind::Decimal)
///         .field("temperature", "/temperature", FieldKind::Decimal);
///     let bus = EventBus::new();
///     let mut events = bus.subscribe();
///
///     let engine = PollEngine::new(transport, decoder, bus);
///     engine
///         .start(
///             DeviceId::new("living-room"),
///             PollConfig::new("192.168.1.60").with_poll_interval(Duration::from_secs(30)),
///         )
///         .await?;
///
///     while let Ok(event) = events.recv().await {
///         if let SinkEvent::ChannelUpdated { device_id, delta } = event {
///             println!("{device_id}: {} = {}", delta.channel(), delta.value());
///         }
///     }
///
///     engine.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct PollEngine<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    context: Arc<PollContext<T, D, S>>,
    devices: Arc<RwLock<HashMap<DeviceId, PollScheduler<T, D, S>>>>,
}

impl<T, D, S> PollEngine<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    /// Creates an engine with the default sink timeout and no concurrency cap.
    #[must_use]
    pub fn new(transport: T, decoder: D, sink: S) -> Self {
        Self::with_context(PollContext::new(transport, decoder, sink))
    }

    /// Creates an engine from a customised context.
    #[must_use]
    pub fn with_context(context: PollContext<T, D, S>) -> Self {
        Self {
            context: Arc::new(context),
            devices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the sink updates are published to.
    #[must_use]
    pub fn sink(&self) -> &S {
        self.context.sink()
    }

    /// Returns the sink timeout.
    #[must_use]
    pub fn sink_timeout(&self) -> Duration {
        self.context.sink_timeout()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts polling a device.
    ///
    /// A device whose previous session stopped on a fatal failure may be
    /// started again; its old session is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid, or
    /// [`Error::AlreadyRunning`] if the device is being polled.
    pub async fn start(&self, device_id: DeviceId, config: PollConfig) -> Result<SessionId, Error> {
        config.validate()?;

        let mut devices = self.devices.write().await;
        if let Some(existing) = devices.get(&device_id)
            && !existing.state().is_stopped()
        {
            return Err(Error::AlreadyRunning(device_id));
        }

        let scheduler =
            PollScheduler::new(device_id.clone(), config, Arc::clone(&self.context));
        scheduler.start()?;
        let session_id = scheduler.session_id();

        tracing::info!(%device_id, %session_id, "Device polling started");

        devices.insert(device_id, scheduler);
        Ok(session_id)
    }

    /// Stops polling a device and forgets it.
    ///
    /// Waits for an in-flight poll to finish and discards its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown.
    pub async fn stop(&self, device_id: &DeviceId) -> Result<(), Error> {
        let scheduler = self
            .devices
            .write()
            .await
            .remove(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.clone()))?;

        scheduler.stop().await;
        tracing::info!(%device_id, "Device polling stopped");
        Ok(())
    }

    /// Replaces the configuration of a device.
    ///
    /// The running session (if any) is stopped and a fresh one started: the
    /// last snapshot is discarded, so the first poll republishes every
    /// channel. An invalid configuration leaves the running session alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid, or
    /// [`Error::AlreadyRunning`] if the device was started by another caller
    /// while its previous session was stopping.
    pub async fn reconfigure(
        &self,
        device_id: DeviceId,
        config: PollConfig,
    ) -> Result<SessionId, Error> {
        config.validate()?;

        // The map lock is released while the in-flight poll drains
        let previous = self.devices.write().await.remove(&device_id);
        if let Some(previous) = previous {
            previous.stop().await;
        }

        let mut devices = self.devices.write().await;
        if let Some(existing) = devices.get(&device_id)
            && !existing.state().is_stopped()
        {
            return Err(Error::AlreadyRunning(device_id));
        }

        let scheduler =
            PollScheduler::new(device_id.clone(), config, Arc::clone(&self.context));
        scheduler.start()?;
        let session_id = scheduler.session_id();

        tracing::info!(%device_id, %session_id, "Device reconfigured");

        devices.insert(device_id, scheduler);
        Ok(session_id)
    }

    /// Republishes every channel of a device on its next successful poll
    /// and polls it now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown.
    pub async fn refresh(&self, device_id: &DeviceId) -> Result<bool, Error> {
        self.with_device(device_id, PollScheduler::refresh).await
    }

    /// Stops every device.
    pub async fn shutdown(&self) {
        let schedulers: Vec<_> = self.devices.write().await.drain().collect();
        let count = schedulers.len();

        for (_, scheduler) in schedulers {
            scheduler.stop().await;
        }

        tracing::info!(devices = count, "Poll engine shut down");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the scheduler state of a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown.
    pub async fn state(&self, device_id: &DeviceId) -> Result<PollState, Error> {
        self.with_device(device_id, PollScheduler::state).await
    }

    /// Creates a watch receiver for the scheduler state of a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown.
    pub async fn watch_state(
        &self,
        device_id: &DeviceId,
    ) -> Result<watch::Receiver<PollState>, Error> {
        self.with_device(device_id, PollScheduler::watch_state).await
    }

    /// Returns failure count, interval, status and last snapshot of a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is unknown.
    pub async fn session_info(&self, device_id: &DeviceId) -> Result<SessionInfo, Error> {
        self.with_device(device_id, PollScheduler::session_info)
            .await
    }

    /// Returns a list of all device IDs.
    pub async fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.read().await.keys().cloned().collect()
    }

    /// Returns the number of devices.
    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    async fn with_device<R>(
        &self,
        device_id: &DeviceId,
        f: impl FnOnce(&PollScheduler<T, D, S>) -> R,
    ) -> Result<R, Error> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(f)
            .ok_or_else(|| Error::DeviceNotFound(device_id.clone()))
    }
}

impl<T, D, S> std::fmt::Debug for PollEngine<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollEngine")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
