//! Scripted transport with connection recording.
//!
//! [`MockTransport`] stands in for a real event-stream transport. Every
//! `open` is recorded and yields a [`MockConnection`] the test drives by hand
//! and inspects for installed listeners.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sse_client::{
    ConnectRequest, Frame, ReadyState, Transport, TransportEvents, TransportFault, TransportHandle,
};
use tracing::debug;

/// Number of scheduler turns [`settle`] yields for.
const SETTLE_TURNS: usize = 32;

/// Let the engine task drain its queues without advancing paused time.
pub async fn settle() {
    for _ in 0..SETTLE_TURNS {
        tokio::task::yield_now().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TransportState {
    requests: Vec<ConnectRequest>,
    connections: Vec<MockConnection>,
    open_failures: VecDeque<TransportFault>,
    close_fault: Option<TransportFault>,
}

/// Transport whose connections are driven by the test.
///
/// Cloning shares the recorded state, so keep one clone for assertions and
/// hand the other to the client.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    /// Create a transport with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with `fault`. Queued failures apply in order.
    pub fn fail_next_open(&self, fault: TransportFault) {
        self.state.lock().open_failures.push_back(fault);
    }

    /// Make `close()` on every later handle report `fault`.
    pub fn fail_close_with(&self, fault: TransportFault) {
        self.state.lock().close_fault = Some(fault);
    }

    /// Number of `open` calls, including failed ones.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Every request passed to `open`, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.state.lock().requests.clone()
    }

    /// The most recently opened connection.
    #[must_use]
    pub fn last_connection(&self) -> Option<MockConnection> {
        self.state.lock().connections.last().cloned()
    }

    /// Number of successfully opened connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }
}

impl Transport for MockTransport {
    fn open(
        &mut self,
        request: ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportFault> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        if let Some(fault) = state.open_failures.pop_front() {
            debug!(url = %request.url, error = %fault, "Mock open failing");
            return Err(fault);
        }

        debug!(url = %request.url, generation = events.generation(), "Mock open");
        let connection = MockConnection::new(request, events);
        state.connections.push(connection.clone());

        Ok(Box::new(MockHandle {
            connection: Arc::clone(&connection.inner),
            close_fault: state.close_fault.clone(),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ConnectionState {
    request: ConnectRequest,
    events: TransportEvents,
    ready_state: ReadyState,
    listeners: Vec<String>,
    close_calls: usize,
}

/// Test-side controller for one opened connection.
#[derive(Debug, Clone)]
pub struct MockConnection {
    inner: Arc<Mutex<ConnectionState>>,
}

impl MockConnection {
    fn new(request: ConnectRequest, events: TransportEvents) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectionState {
                request,
                events,
                ready_state: ReadyState::Connecting,
                listeners: Vec::new(),
                close_calls: 0,
            })),
        }
    }

    /// The request this connection was opened with.
    #[must_use]
    pub fn request(&self) -> ConnectRequest {
        self.inner.lock().request.clone()
    }

    /// Generation the client assigned to this connection.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().events.generation()
    }

    /// Raw event sink, bypassing listener checks.
    #[must_use]
    pub fn sink(&self) -> TransportEvents {
        self.inner.lock().events.clone()
    }

    /// Current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.lock().ready_state
    }

    /// Report a successful open.
    pub fn open(&self) {
        let mut inner = self.inner.lock();
        inner.ready_state = ReadyState::Open;
        inner.events.opened();
    }

    /// Fail for good: the connection ends up `Closed`.
    pub fn fail(&self, fault: TransportFault) {
        let mut inner = self.inner.lock();
        inner.ready_state = ReadyState::Closed;
        inner.events.failed(fault);
    }

    /// Drop but keep retrying on its own: the connection stays `Connecting`.
    pub fn drop_and_retry(&self, fault: TransportFault) {
        let mut inner = self.inner.lock();
        inner.ready_state = ReadyState::Connecting;
        inner.events.failed(fault);
    }

    /// Come back after [`Self::drop_and_retry`].
    pub fn recover(&self) {
        self.open();
    }

    /// Deliver `frame` if a listener for its event name is installed.
    ///
    /// Returns whether the frame was delivered.
    pub fn emit(&self, frame: Frame) -> bool {
        let inner = self.inner.lock();
        if inner.ready_state == ReadyState::Closed || !inner.listeners.contains(&frame.event) {
            return false;
        }
        inner.events.frame(frame);
        true
    }

    /// Deliver `data` on the default event.
    pub fn send(&self, data: impl Into<String>) -> bool {
        self.emit(Frame::new(data))
    }

    /// Deliver `data` on a named event.
    pub fn send_event(&self, event: &str, data: impl Into<String>) -> bool {
        self.emit(Frame::new(data).with_event(event))
    }

    /// Whether a listener for `event` is installed.
    #[must_use]
    pub fn is_listening(&self, event: &str) -> bool {
        self.inner.lock().listeners.iter().any(|e| e == event)
    }

    /// How many times a listener for `event` is installed.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    /// Installed listeners, in installation order.
    #[must_use]
    pub fn listeners(&self) -> Vec<String> {
        self.inner.lock().listeners.clone()
    }

    /// How many times the client called `close()`.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.inner.lock().close_calls
    }
}

/// Engine-side half of a [`MockConnection`].
struct MockHandle {
    connection: Arc<Mutex<ConnectionState>>,
    close_fault: Option<TransportFault>,
}

impl TransportHandle for MockHandle {
    fn ready_state(&self) -> ReadyState {
        self.connection.lock().ready_state
    }

    fn add_event_listener(&mut self, event: &str) {
        self.connection.lock().listeners.push(event.to_string());
    }

    fn remove_event_listener(&mut self, event: &str) {
        let mut inner = self.connection.lock();
        if let Some(pos) = inner.listeners.iter().position(|e| e == event) {
            inner.listeners.remove(pos);
        }
    }

    fn close(&mut self) -> Result<(), TransportFault> {
        let mut inner = self.connection.lock();
        inner.close_calls += 1;
        inner.ready_state = ReadyState::Closed;
        self.close_fault.clone().map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn request(url: &str) -> ConnectRequest {
        ConnectRequest {
            url: url.to_string(),
            with_credentials: false,
            headers: std::collections::HashMap::new(),
            last_event_id: None,
        }
    }

    #[test]
    fn test_records_requests_and_queued_failures() {
        let mut transport = MockTransport::new();
        transport.fail_next_open(TransportFault::http(503, "unavailable"));
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = transport.open(request("http://a"), TransportEvents::new(1, tx.clone()));
        let second = transport.open(request("http://b"), TransportEvents::new(2, tx));

        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.connection_count(), 1);
        assert_eq!(transport.last_connection().unwrap().generation(), 2);
    }

    #[test]
    fn test_emit_requires_listener() {
        let mut transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = transport
            .open(request("http://a"), TransportEvents::new(1, tx))
            .unwrap();
        let conn = transport.last_connection().unwrap();

        assert!(!conn.send("dropped"));
        handle.add_event_listener("message");
        assert!(conn.send("delivered"));

        assert_eq!(rx.try_recv().unwrap().generation, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_records_and_reports_fault() {
        let mut transport = MockTransport::new();
        transport.fail_close_with(TransportFault::network("reset"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = transport
            .open(request("http://a"), TransportEvents::new(1, tx))
            .unwrap();

        assert!(handle.close().is_err());
        let conn = transport.last_connection().unwrap();
        assert_eq!(conn.close_calls(), 1);
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }
}
