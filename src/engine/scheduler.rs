// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device poll scheduler.
//!
//! Each started device owns one timer task and at most one poll worker.
//! The timer decides *when* to poll; the worker performs fetch + decode,
//! feeds the [`PollResult`] into the [`DeviceSession`] and publishes the
//! resulting deltas and status through the sink.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::poll_config::PollConfig;
use super::poll_result::PollResult;
use super::session::{DeviceSession, SessionInfo};
use crate::decoder::Decoder;
use crate::error::{DecodeError, Error, SinkError, TransportError};
use crate::protocol::Transport;
use crate::sink::{DeviceStatus, PublisherSink};
use crate::snapshot::{ChannelDelta, DeviceSnapshot};
use crate::types::{DeviceId, SessionId};

/// Why a scheduler stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// A poll failed in a way that needs new configuration.
    Fatal(String),
}

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Created, not started.
    Idle,
    /// Waiting for the next tick.
    Scheduled,
    /// A poll is in flight.
    Polling,
    /// No further ticks will run.
    Stopped(StopReason),
}

impl PollState {
    /// Returns `true` once the scheduler stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Returns `true` while the scheduler is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Polling)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Scheduled => f.write_str("scheduled"),
            Self::Polling => f.write_str("polling"),
            Self::Stopped(StopReason::Requested) => f.write_str("stopped"),
            Self::Stopped(StopReason::Fatal(reason)) => write!(f, "stopped: {reason}"),
        }
    }
}

/// What a call to [`PollScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A poll worker was spawned.
    Started,
    /// A poll was already in flight; the tick was coalesced into it.
    Skipped,
    /// The scheduler is stopped.
    Stopped,
}

/// Collaborators shared by every scheduler of one engine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pollsync_lib::decoder::JsonDecoder;
/// use pollsync_lib::engine::PollContext;
/// use pollsync_lib::protocol::HttpTransport;
/// use pollsync_lib::sink::EventBus;
///
/// let context = PollContext::new(HttpTransport::new().unwrap(), JsonDecoder::new(), EventBus::new())
///     .with_sink_timeout(Duration::from_secs(1))
///     .with_max_concurrent_polls(4);
/// assert_eq!(context.sink_timeout(), Duration::from_secs(1));
/// ```
pub struct PollContext<T, D, S> {
    transport: T,
    decoder: D,
    sink: S,
    sink_timeout: Duration,
    permits: Option<Arc<Semaphore>>,
}

impl<T, D, S> PollContext<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    /// Default upper bound for one sink call.
    pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

    /// Creates a context with the default sink timeout and no concurrency cap.
    #[must_use]
    pub fn new(transport: T, decoder: D, sink: S) -> Self {
        Self {
            transport,
            decoder,
            sink,
            sink_timeout: Self::DEFAULT_SINK_TIMEOUT,
            permits: None,
        }
    }

    /// Sets the upper bound for one sink call.
    #[must_use]
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    /// Caps the number of polls in flight across all devices.
    #[must_use]
    pub fn with_max_concurrent_polls(mut self, max: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max)));
        self
    }

    /// Returns the sink timeout.
    #[must_use]
    pub fn sink_timeout(&self) -> Duration {
        self.sink_timeout
    }

    /// Returns the sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    async fn fetch_and_decode(
        &self,
        config: &PollConfig,
        session: &Mutex<DeviceSession>,
    ) -> Result<DeviceSnapshot, Error> {
        let timeout = config.request_timeout();
        let raw = tokio::time::timeout(
            timeout,
            self.transport
                .fetch(&config.address, config.credentials.as_ref(), timeout),
        )
        .await
        .map_err(|_| TransportError::timeout(timeout))??;

        let ctx = session.lock().next_context(Utc::now());
        let decoded =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(&raw, &ctx)))
                .map_err(|panic| DecodeError::Panicked(panic_message(panic.as_ref())))?;
        Ok(decoded?)
    }

    async fn publish(&self, device_id: &DeviceId, delta: ChannelDelta) {
        let channel = delta.channel().clone();
        let result = self
            .bounded(self.sink.publish(device_id, delta))
            .await;
        if let Err(e) = result {
            tracing::warn!(%device_id, %channel, error = %e, "Failed to publish channel update");
        }
    }

    async fn report_status(&self, device_id: &DeviceId, status: DeviceStatus) {
        let label = status.to_string();
        let result = self
            .bounded(self.sink.report_status(device_id, status))
            .await;
        if let Err(e) = result {
            tracing::warn!(%device_id, status = %label, error = %e, "Failed to report device status");
        }
    }

    async fn bounded(
        &self,
        call: impl Future<Output = Result<(), SinkError>> + Send,
    ) -> Result<(), SinkError> {
        tokio::time::timeout(self.sink_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(SinkError::Timeout(
                    u64::try_from(self.sink_timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            })
    }
}

impl<T, D, S> fmt::Debug for PollContext<T, D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollContext")
            .field("sink_timeout", &self.sink_timeout)
            .field(
                "max_concurrent_polls",
                &self.permits.as_ref().map(|_| "capped"),
            )
            .finish_non_exhaustive()
    }
}

struct Inner<T, D, S> {
    device_id: DeviceId,
    config: PollConfig,
    context: Arc<PollContext<T, D, S>>,
    session: Mutex<DeviceSession>,
    state_tx: watch::Sender<PollState>,
    in_flight: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    refresh: Notify,
    rearm: Notify,
}

impl<T, D, S> Inner<T, D, S> {
    fn is_stopped(&self) -> bool {
        self.state_tx.borrow().is_stopped()
    }

    /// Returns `true` once `stop()` was requested.
    fn is_cancelled(&self) -> bool {
        matches!(*self.state_tx.borrow(), PollState::Stopped(StopReason::Requested))
    }

    /// Moves to `state` unless already stopped.
    fn set_running_state(&self, state: PollState) {
        self.state_tx.send_if_modified(|current| {
            if current.is_stopped() || *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Moves to `Stopped(reason)`; the first stop reason wins.
    fn set_stopped(&self, reason: StopReason) -> bool {
        self.state_tx.send_if_modified(|current| {
            if current.is_stopped() {
                return false;
            }
            *current = PollState::Stopped(reason);
            true
        })
    }
}

/// Drives the polling of one device.
///
/// Guarantees at most one poll in flight: a tick arriving while a poll is
/// running is skipped, never queued. Dropping the scheduler stops it
/// without waiting for an in-flight poll.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use pollsync_lib::decoder::JsonDecoder;
/// use pollsync_lib::engine::{PollConfig, PollContext, PollScheduler};
/// use pollsync_lib::protocol::HttpTransport;
/// use pollsync_lib::sink::EventBus;
/// use pollsync_lib::types::DeviceId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let context = Arc::new(PollContext::new(HttpTransport::new()?, JsonDecoder::new(), EventBus::new()));
/// let scheduler = PollScheduler::new(DeviceId::new("airq"), PollConfig::new("192.168.1.60"), context);
///
/// scheduler.start()?;
/// // ...
/// scheduler.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct PollScheduler<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    inner: Arc<Inner<T, D, S>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T, D, S> PollScheduler<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    /// Creates an idle scheduler with a fresh session.
    ///
    /// The configuration is expected to be valid.
    #[must_use]
    pub fn new(device_id: DeviceId, config: PollConfig, context: Arc<PollContext<T, D, S>>) -> Self {
        let (state_tx, _) = watch::channel(PollState::Idle);
        Self {
            inner: Arc::new(Inner {
                device_id,
                session: Mutex::new(DeviceSession::new(config.clone())),
                config,
                context,
                state_tx,
                in_flight: AtomicBool::new(false),
                worker: Mutex::new(None),
                refresh: Notify::new(),
                rearm: Notify::new(),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Returns the device this scheduler polls.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.session.lock().session_id()
    }

    /// Starts the timer: first tick after the first-poll delay.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the scheduler is not idle.
    pub fn start(&self) -> Result<(), Error> {
        let started = self.inner.state_tx.send_if_modified(|current| {
            if *current != PollState::Idle {
                return false;
            }
            *current = PollState::Scheduled;
            true
        });
        if !started {
            return Err(Error::AlreadyRunning(self.inner.device_id.clone()));
        }

        tracing::debug!(
            device_id = %self.inner.device_id,
            session_id = %self.session_id(),
            first_poll_ms = self.inner.config.first_poll_delay_ms,
            interval_secs = self.inner.config.poll_interval_secs,
            "Starting poll scheduler"
        );

        let handle = tokio::spawn(run_timer(Arc::clone(&self.inner)));
        *self.timer.lock() = Some(handle);
        Ok(())
    }

    /// Fires one poll now, unless stopped or already polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&self) -> TickOutcome {
        tick(&self.inner)
    }

    /// Makes the next successful poll publish every field and polls now.
    ///
    /// Returns `false` if the scheduler is stopped.
    pub fn refresh(&self) -> bool {
        if self.inner.is_stopped() {
            return false;
        }
        self.inner.session.lock().request_full_refresh();
        self.inner.refresh.notify_one();
        true
    }

    /// Stops the scheduler.
    ///
    /// The state becomes `Stopped` immediately. An in-flight poll is
    /// awaited (bounded by the request timeout) and its result discarded.
    /// A poll already publishing finishes its current sink call and drops
    /// the remaining updates.
    pub async fn stop(&self) {
        if self.inner.set_stopped(StopReason::Requested) {
            tracing::debug!(device_id = %self.inner.device_id, "Stopping poll scheduler");
        }

        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }

        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
            && e.is_panic()
        {
            tracing::warn!(device_id = %self.inner.device_id, "Poll worker panicked");
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.inner.state_tx.borrow().clone()
    }

    /// Creates a watch receiver for state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns a view of the session.
    #[must_use]
    pub fn session_info(&self) -> SessionInfo {
        SessionInfo::from(&*self.inner.session.lock())
    }
}

impl<T, D, S> Drop for PollScheduler<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    fn drop(&mut self) {
        self.inner.set_stopped(StopReason::Requested);
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

impl<T, D, S> fmt::Debug for PollScheduler<T, D, S>
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollScheduler")
            .field("device_id", &self.inner.device_id)
            .field("state", &*self.inner.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

fn tick<T, D, S>(inner: &Arc<Inner<T, D, S>>) -> TickOutcome
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    // Held across the stop check so stop() always sees the spawned worker
    let mut worker = inner.worker.lock();

    if inner.is_stopped() {
        return TickOutcome::Stopped;
    }

    if inner
        .in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!(device_id = %inner.device_id, "Poll still in flight, skipping tick");
        return TickOutcome::Skipped;
    }

    inner.set_running_state(PollState::Polling);
    *worker = Some(tokio::spawn(run_poll(Arc::clone(inner))));
    TickOutcome::Started
}

async fn run_timer<T, D, S>(inner: Arc<Inner<T, D, S>>)
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    let mut state_rx = inner.state_tx.subscribe();
    let mut armed_at = Instant::now();

    inner
        .context
        .report_status(&inner.device_id, DeviceStatus::Unknown)
        .await;

    let mut delay = inner.config.first_poll_delay();

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(armed_at + delay) => {
                armed_at = Instant::now();
                tick(&inner);
                delay = inner.session.lock().current_interval();
            }
            () = inner.refresh.notified() => {
                armed_at = Instant::now();
                tick(&inner);
                delay = inner.session.lock().current_interval();
            }
            () = inner.rearm.notified() => {
                // Interval changed by a finished poll; next tick is relative to the last one
                delay = inner.session.lock().current_interval();
            }
            changed = state_rx.changed() => {
                if changed.is_err() || state_rx.borrow_and_update().is_stopped() {
                    break;
                }
            }
        }
    }

    tracing::trace!(device_id = %inner.device_id, "Poll timer finished");
}

/// Clears the in-flight flag when a poll worker ends, unwinding included.
struct InFlightGuard<'a, T, D, S>(&'a Inner<T, D, S>);

impl<T, D, S> Drop for InFlightGuard<'_, T, D, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(device_id = %self.0.device_id, "Poll worker panicked");
            self.0.set_running_state(PollState::Scheduled);
        }
        self.0.in_flight.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

async fn run_poll<T, D, S>(inner: Arc<Inner<T, D, S>>)
where
    T: Transport,
    D: Decoder,
    S: PublisherSink,
{
    let _in_flight = InFlightGuard(&*inner);

    let _permit = match &inner.context.permits {
        Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
        None => None,
    };

    let recoverable_auth = inner.config.recoverable_auth;
    let outcome = inner
        .context
        .fetch_and_decode(&inner.config, &inner.session)
        .await;
    let result = PollResult::from_outcome(outcome, recoverable_auth);

    if inner.is_stopped() {
        tracing::debug!(device_id = %inner.device_id, "Discarding poll result of stopped scheduler");
        return;
    }

    let (transition, session_id) = {
        let mut session = inner.session.lock();
        let transition = session.on_result(result);
        (transition, session.session_id())
    };

    match &transition.stop {
        Some(reason) => {
            tracing::warn!(
                device_id = %inner.device_id,
                %session_id,
                reason = ?reason,
                "Polling stopped"
            );
            inner.set_stopped(reason.clone());
        }
        None => inner.set_running_state(PollState::Scheduled),
    }

    if transition.interval_changed {
        inner.rearm.notify_one();
    }

    tracing::debug!(
        device_id = %inner.device_id,
        %session_id,
        deltas = transition.deltas.len(),
        status_changed = transition.status.is_some(),
        "Poll finished"
    );

    if let Some(status) = transition.status {
        if inner.is_cancelled() {
            return;
        }
        inner.context.report_status(&inner.device_id, status).await;
    }
    for delta in transition.deltas {
        if inner.is_cancelled() {
            tracing::debug!(
                device_id = %inner.device_id,
                "Scheduler stopped, dropping remaining updates"
            );
            return;
        }
        inner.context.publish(&inner.device_id, delta).await;
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::decoder::DecodeContext;
    use crate::protocol::Credentials;
    use crate::sink::{EventBus, SinkEvent};

    /// Transport returning a fixed body after waiting on a gate.
    struct GatedTransport {
        calls: AtomicUsize,
        gate: Notify,
    }

    impl GatedTransport {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
            }
        }
    }

    impl Transport for Arc<GatedTransport> {
        fn fetch(
            &self,
            _address: &str,
            _credentials: Option<&Credentials>,
            _timeout: Duration,
        ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                self.gate.notified().await;
                Ok(b"42".to_vec())
            }
        }
    }

    fn decode(raw: &[u8], ctx: &DecodeContext) -> Result<DeviceSnapshot, DecodeError> {
        let text = std::str::from_utf8(raw)?;
        DeviceSnapshot::builder(ctx).field("value", text).build()
    }

    type TestScheduler = PollScheduler<
        Arc<GatedTransport>,
        fn(&[u8], &DecodeContext) -> Result<DeviceSnapshot, DecodeError>,
        EventBus,
    >;

    fn scheduler(transport: &Arc<GatedTransport>, bus: &EventBus) -> TestScheduler {
        let context = PollContext::new(
            Arc::clone(transport),
            decode as fn(&[u8], &DecodeContext) -> Result<DeviceSnapshot, DecodeError>,
            bus.clone(),
        );
        PollScheduler::new(
            DeviceId::new("dev"),
            PollConfig::new("host").with_poll_interval(Duration::from_secs(10)),
            Arc::new(context),
        )
    }

    #[test]
    fn poll_state_predicates() {
        assert!(PollState::Scheduled.is_active());
        assert!(PollState::Polling.is_active());
        assert!(!PollState::Idle.is_active());
        assert!(PollState::Stopped(StopReason::Requested).is_stopped());
        assert_eq!(
            PollState::Stopped(StopReason::Fatal("HTTP 401".into())).to_string(),
            "stopped: HTTP 401"
        );
    }

    #[tokio::test]
    async fn ticks_coalesce_while_poll_in_flight() {
        let transport = Arc::new(GatedTransport::new());
        let bus = EventBus::new();
        let scheduler = scheduler(&transport, &bus);

        assert_eq!(scheduler.tick(), TickOutcome::Started);
        for _ in 0..99 {
            assert_eq!(scheduler.tick(), TickOutcome::Skipped);
        }

        // Let the worker reach the transport
        tokio::task::yield_now().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), PollState::Polling);

        transport.gate.notify_one();
        scheduler.stop().await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let transport = Arc::new(GatedTransport::new());
        let bus = EventBus::new();
        let scheduler = scheduler(&transport, &bus);

        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(Error::AlreadyRunning(_))));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_discards_in_flight_result() {
        let transport = Arc::new(GatedTransport::new());
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let scheduler = scheduler(&transport, &bus);

        assert_eq!(scheduler.tick(), TickOutcome::Started);
        tokio::task::yield_now().await;

        let stopping = scheduler.stop();
        transport.gate.notify_one();
        stopping.await;

        assert_eq!(scheduler.state(), PollState::Stopped(StopReason::Requested));
        assert_eq!(scheduler.tick(), TickOutcome::Stopped);
        assert!(scheduler.session_info().last_snapshot.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manual_tick_publishes_status_then_values() {
        let transport = Arc::new(GatedTransport::new());
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let scheduler = scheduler(&transport, &bus);

        transport.gate.notify_one();
        assert_eq!(scheduler.tick(), TickOutcome::Started);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            SinkEvent::status_changed(DeviceId::new("dev"), DeviceStatus::Online)
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second,
            SinkEvent::channel_updated(DeviceId::new("dev"), ChannelDelta::new("value", "42"))
        );

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn refresh_on_stopped_scheduler_is_rejected() {
        let transport = Arc::new(GatedTransport::new());
        let bus = EventBus::new();
        let scheduler = scheduler(&transport, &bus);

        scheduler.stop().await;
        assert!(!scheduler.refresh());
    }
}
