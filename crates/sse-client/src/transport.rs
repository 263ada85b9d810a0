//! Host-supplied transport capability.
//!
//! The engine never speaks HTTP itself. A [`Transport`] opens connections and
//! hands back a [`TransportHandle`]; the connection reports what happens to it
//! through the [`TransportEvents`] sink it was opened with.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::{Frame, TransportFault};

/// Everything needed to open one streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Stream address.
    pub url: String,
    /// Include cookies/credentials.
    pub with_credentials: bool,
    /// Request headers for this attempt.
    pub headers: HashMap<String, String>,
    /// Last event ID seen, for resumption.
    pub last_event_id: Option<String>,
}

/// Connection state as reported by the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Opening, or re-opening on its own after a drop.
    Connecting,
    /// Receiving events.
    Open,
    /// Finished; will not produce further events.
    Closed,
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Open,
    /// The connection failed or was closed.
    Error(TransportFault),
    /// A frame arrived for an event name with an installed listener.
    Frame(Frame),
}

/// A transport event tagged with the connection generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// Generation of the handle that emitted the event.
    pub generation: u64,
    /// The event.
    pub event: TransportEvent,
}

/// Sink a connection reports into.
///
/// Cheap to clone. Sending after the engine stopped is silently ignored.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportMessage>,
}

impl TransportEvents {
    /// Create a sink for connection `generation`.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::UnboundedSender<TransportMessage>) -> Self {
        Self { generation, tx }
    }

    /// Generation this sink reports for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a successful open.
    pub fn opened(&self) {
        self.send(TransportEvent::Open);
    }

    /// Report a connection failure.
    pub fn failed(&self, fault: TransportFault) {
        self.send(TransportEvent::Error(fault));
    }

    /// Deliver a frame.
    pub fn frame(&self, frame: Frame) {
        self.send(TransportEvent::Frame(frame));
    }

    fn send(&self, event: TransportEvent) {
        let _ = self.tx.send(TransportMessage {
            generation: self.generation,
            event,
        });
    }
}

/// Opens streaming connections.
pub trait Transport: Send + 'static {
    /// Open a connection. Returning an error counts as a transport fault.
    fn open(
        &mut self,
        request: ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportFault>;
}

/// A live connection owned by the engine.
pub trait TransportHandle: Send {
    /// Current state of the connection.
    fn ready_state(&self) -> ReadyState;

    /// Start delivering frames for `event`.
    fn add_event_listener(&mut self, event: &str);

    /// Stop delivering frames for `event`.
    fn remove_event_listener(&mut self, event: &str);

    /// Close the connection. Faults are reported but the engine ignores them.
    fn close(&mut self) -> Result<(), TransportFault>;
}

impl<F> Transport for F
where
    F: FnMut(ConnectRequest, TransportEvents) -> Result<Box<dyn TransportHandle>, TransportFault>
        + Send
        + 'static,
{
    fn open(
        &mut self,
        request: ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportFault> {
        self(request, events)
    }
}
