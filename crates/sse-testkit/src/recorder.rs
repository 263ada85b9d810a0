//! Subscriber and hook call recording.

use std::sync::Arc;

use parking_lot::Mutex;
use sse_client::{Listener, StreamEvent, TransportFault};

/// Records every event delivered to its callback.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl EventRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that appends to this recorder.
    #[must_use]
    pub fn callback(&self) -> impl Fn(&StreamEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &StreamEvent| events.lock().push(event.clone())
    }

    /// Shared listener that appends to this recorder.
    ///
    /// Each call returns a distinct listener identity.
    #[must_use]
    pub fn listener(&self) -> Listener {
        Arc::new(self.callback())
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Payloads as JSON values (text payloads become JSON strings).
    #[must_use]
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .iter()
            .map(|e| e.data.clone().into_value())
            .collect()
    }
}

/// Records `on_open` and `on_error` hook invocations.
#[derive(Debug, Clone, Default)]
pub struct HookRecorder {
    opens: Arc<Mutex<usize>>,
    faults: Arc<Mutex<Vec<TransportFault>>>,
}

impl HookRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `on_open` hook.
    #[must_use]
    pub fn on_open(&self) -> impl Fn() + Send + Sync + 'static {
        let opens = Arc::clone(&self.opens);
        move || *opens.lock() += 1
    }

    /// `on_error` hook.
    #[must_use]
    pub fn on_error(&self) -> impl Fn(&TransportFault) + Send + Sync + 'static {
        let faults = Arc::clone(&self.faults);
        move |fault: &TransportFault| faults.lock().push(fault.clone())
    }

    /// Number of `on_open` calls.
    #[must_use]
    pub fn opens(&self) -> usize {
        *self.opens.lock()
    }

    /// Faults passed to `on_error`, in order.
    #[must_use]
    pub fn faults(&self) -> Vec<TransportFault> {
        self.faults.lock().clone()
    }
}
