//! Connection lifecycle state machine.
//!
//! [`Lifecycle`] is synchronous and owns everything mutable: the transport
//! handle, the single pending reconnect, the backoff, the registry and the
//! history. It reacts to three kinds of input: control calls, tagged
//! transport events and the reconnect deadline passing. The async driver in
//! [`crate::StreamClient`] feeds it those inputs from one task.
//!
//! ```text
//!            connect()                 opened
//!   Idle ───────────────► Connecting ───────────► Open
//!                            ▲   │ error              │ error
//!              timer fired,  │   ▼                    ▼
//!              handle closed └─ Reconnecting ◄────────┘
//!
//!   any ── close() ──► Closed ── connect() ──► Connecting
//! ```

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::registry::guarded;
use crate::{
    BoundedHistory, ConnectRequest, DEFAULT_EVENT, Frame, Listener, ReadyState, RetryState,
    StreamConfig, StreamEvent, StreamHooks, StreamResult, SubscriberId, SubscriptionRegistry,
    Transport, TransportEvent, TransportEvents, TransportFault, TransportHandle, TransportMessage,
};

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected, or address cleared.
    #[default]
    Idle,
    /// A connection has been requested and not yet opened.
    Connecting,
    /// Receiving events.
    Open,
    /// Dropped; waiting for the transport or the reconnect timer.
    Reconnecting,
    /// Closed by the caller. `connect()` restarts.
    Closed,
}

impl ConnectionState {
    /// Whether the lifecycle currently wants a connection.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The one outstanding reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    /// Delay the timer was scheduled with.
    pub delay: Duration,
    /// When it fires.
    pub deadline: Instant,
}

/// Observable client state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Whether the stream is open.
    pub connected: bool,
    /// Most recent event.
    pub last_message: Option<StreamEvent>,
    /// Bounded history, oldest first.
    pub messages: Vec<StreamEvent>,
    /// Reconnects scheduled since the last successful open.
    pub reconnect_attempts: u32,
    /// Delay of the pending reconnect, if one is scheduled.
    pub next_retry: Option<Duration>,
}

/// Connection lifecycle and everything it owns.
pub struct Lifecycle {
    url: Option<String>,
    config: StreamConfig,
    hooks: StreamHooks,
    transport: Box<dyn Transport>,
    events_tx: mpsc::UnboundedSender<TransportMessage>,
    state: ConnectionState,
    connected: bool,
    handle: Option<Box<dyn TransportHandle>>,
    generation: u64,
    pending: Option<PendingReconnect>,
    retry: RetryState,
    registry: SubscriptionRegistry,
    history: BoundedHistory,
    last_event_id: Option<String>,
    revision: u64,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .field("generation", &self.generation)
            .field("has_handle", &self.handle.is_some())
            .field("pending", &self.pending)
            .field("retry", &self.retry)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    /// Create an idle lifecycle.
    ///
    /// Transport events must be routed back through [`Self::handle_transport`]
    /// from the receiver paired with `events_tx`.
    #[must_use]
    pub fn new(
        url: Option<String>,
        config: StreamConfig,
        hooks: StreamHooks,
        transport: Box<dyn Transport>,
        events_tx: mpsc::UnboundedSender<TransportMessage>,
    ) -> Self {
        let mut registry = SubscriptionRegistry::new();
        registry.pin(DEFAULT_EVENT, None::<&mut dyn TransportHandle>);

        Self {
            url,
            retry: config.retry_state(),
            history: BoundedHistory::new(config.max_messages),
            config,
            hooks,
            transport,
            events_tx,
            state: ConnectionState::Idle,
            connected: false,
            handle: None,
            generation: 0,
            pending: None,
            registry,
            last_event_id: None,
            revision: 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────────────

    /// Open a fresh connection, replacing any existing one.
    ///
    /// Without a configured address this does nothing.
    pub fn connect(&mut self) {
        let Some(url) = self.url.clone() else {
            debug!("No stream address configured, not connecting");
            return;
        };

        self.cancel_pending();
        self.teardown();
        self.open_transport(url);
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub fn close(&mut self) {
        let had_timer = self.cancel_pending();
        self.teardown();
        if self.state != ConnectionState::Closed {
            info!(url = ?self.url, had_timer, "Closing event stream");
            self.set_state(ConnectionState::Closed);
        }
    }

    /// Change the stream address.
    ///
    /// While active, a new address fully reconnects and a cleared address
    /// tears down to `Idle`. Otherwise the address is stored for the next
    /// `connect()`.
    pub fn set_url(&mut self, url: Option<String>) {
        if self.url == url {
            return;
        }
        info!(from = ?self.url, to = ?url, "Stream address changed");
        self.url = url;
        self.last_event_id = None;

        if !self.state.is_active() {
            return;
        }
        if self.url.is_some() {
            self.connect();
        } else {
            self.cancel_pending();
            self.teardown();
            self.set_state(ConnectionState::Idle);
        }
    }

    /// Subscribe `listener` to `event`.
    pub fn subscribe(&mut self, event: &str, listener: Listener) -> StreamResult<SubscriberId> {
        self.registry
            .subscribe(event, listener, self.handle.as_deref_mut())
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, event: &str, id: SubscriberId) -> bool {
        self.registry
            .unsubscribe(event, id, self.handle.as_deref_mut())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────────────────────

    /// Apply an event reported by a connection.
    ///
    /// Events from a replaced or closed connection are dropped. A frame that
    /// was recorded in the history is returned for the caller to hand to
    /// [`Self::dispatch`] once the updated state is visible.
    pub fn handle_transport(&mut self, message: TransportMessage) -> Option<StreamEvent> {
        if message.generation != self.generation || self.handle.is_none() {
            trace!(
                generation = message.generation,
                current = self.generation,
                "Dropping event from stale connection"
            );
            return None;
        }

        match message.event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Error(fault) => self.on_fault(&fault),
            TransportEvent::Frame(frame) => return self.on_frame(frame),
        }
        None
    }

    /// Deliver a recorded event to its subscribers.
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let delivered = self.registry.dispatch(&event.event, event);
        trace!(event = %event.event, delivered, "Dispatched event");
        delivered
    }

    /// The reconnect deadline passed.
    ///
    /// Rebuilds the connection only if the handle is gone or closed; a handle
    /// that recovered by itself is left alone. Returns whether a new
    /// connection was opened.
    pub fn fire_reconnect(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.revision += 1;

        let stale = self
            .handle
            .as_ref()
            .is_none_or(|handle| handle.ready_state() == ReadyState::Closed);
        if !stale {
            debug!(
                delay_ms = pending.delay.as_millis(),
                "Transport recovered on its own, skipping scheduled reconnect"
            );
            return false;
        }

        info!(
            delay_ms = pending.delay.as_millis(),
            attempt = self.retry.attempts(),
            "Reconnecting event stream"
        );
        self.connect();
        true
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────────

    fn open_transport(&mut self, url: String) {
        self.generation += 1;
        let request = ConnectRequest {
            url,
            with_credentials: self.config.with_credentials,
            headers: self.hooks.request_headers(&self.config),
            last_event_id: self.last_event_id.clone(),
        };
        info!(
            url = %request.url,
            generation = self.generation,
            resume_from = ?request.last_event_id,
            "Connecting to event stream"
        );
        self.set_state(ConnectionState::Connecting);

        let events = TransportEvents::new(self.generation, self.events_tx.clone());
        match self.transport.open(request, events) {
            Ok(mut handle) => {
                self.registry.attach(&mut *handle);
                self.handle = Some(handle);
            }
            Err(fault) => self.on_fault(&fault),
        }
    }

    /// Drop the current handle, if any, detaching every listener first.
    fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.registry.detach(Some(&mut *handle));
            if let Err(fault) = handle.close() {
                debug!(error = %fault, "Ignoring fault while closing connection");
            }
        }
        self.set_connected(false);
    }

    fn on_open(&mut self) {
        self.retry.on_success();
        self.set_connected(true);
        self.set_state(ConnectionState::Open);
        info!(generation = self.generation, "Event stream open");

        if let Some(on_open) = &self.hooks.on_open {
            guarded("on_open hook", || on_open());
        }
        self.registry
            .pin(DEFAULT_EVENT, self.handle.as_deref_mut());
    }

    fn on_fault(&mut self, fault: &TransportFault) {
        warn!(
            url = ?self.url,
            error = %fault,
            generation = self.generation,
            "Event stream error"
        );
        self.set_connected(false);
        self.set_state(ConnectionState::Reconnecting);

        if let Some(on_error) = &self.hooks.on_error {
            guarded("on_error hook", || on_error(fault));
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if let Some(pending) = &self.pending {
            debug!(
                delay_ms = pending.delay.as_millis(),
                "Reconnect already scheduled"
            );
            return;
        }
        let delay = self.retry.on_failure_scheduled();
        self.pending = Some(PendingReconnect {
            delay,
            deadline: Instant::now() + delay,
        });
        self.revision += 1;
    }

    fn cancel_pending(&mut self) -> bool {
        let cancelled = self.pending.take().is_some();
        if cancelled {
            self.revision += 1;
        }
        cancelled
    }

    fn on_frame(&mut self, frame: Frame) -> Option<StreamEvent> {
        if let Some(id) = &frame.id {
            self.last_event_id = Some(id.clone());
        }
        if let Some(retry_ms) = frame.retry {
            self.retry.set_base_delay(Duration::from_millis(retry_ms));
            // A bare `retry:` block carries no event.
            if frame.data.is_empty() {
                return None;
            }
        }
        if !self.registry.is_listening(&frame.event) {
            trace!(event = %frame.event, "No listener for event");
            return None;
        }

        let event = StreamEvent::from(frame);
        self.history.append(event.clone());
        self.revision += 1;
        Some(event)
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "State transition");
            self.state = state;
            self.revision += 1;
        }
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.revision += 1;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the stream is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Configured address.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The pending reconnect, if any.
    #[must_use]
    pub const fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending
    }

    /// Whether a transport handle is held.
    #[must_use]
    pub const fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Generation of the current (or last) connection.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Backoff state.
    #[must_use]
    pub const fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Event history.
    #[must_use]
    pub const fn history(&self) -> &BoundedHistory {
        &self.history
    }

    /// Most recent event.
    #[must_use]
    pub const fn last_message(&self) -> Option<&StreamEvent> {
        self.history.last()
    }

    /// Last event ID received, sent on the next connect.
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Counter bumped on every observable change.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Observable state.
    #[must_use]
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.state,
            connected: self.connected,
            last_message: self.history.last().cloned(),
            messages: self.history.to_vec(),
            reconnect_attempts: self.retry.attempts(),
            next_retry: self.pending.map(|p| p.delay),
        }
    }
}
