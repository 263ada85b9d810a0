//! Per-event-name subscriptions.
//!
//! Each event name with at least one subscriber owns exactly one listener on
//! the current transport handle. The listener is installed with the first
//! subscriber and removed with the last one; `subscribe` and `unsubscribe`
//! are the only places entries are created or destroyed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::{StreamError, StreamEvent, StreamResult, TransportHandle};

/// Subscriber callback.
pub type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Identifies one subscription within its event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct ListenerEntry {
    // Ids grow monotonically, so key order is subscription order.
    callbacks: BTreeMap<SubscriberId, Listener>,
    installed: bool,
    pinned: bool,
}

/// Event name → subscribers, plus the transport listener bookkeeping.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, ListenerEntry>,
    next_id: u64,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            map.entry(name, &(entry.callbacks.len(), entry.installed));
        }
        map.finish()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a listener for `event` alive even without subscribers.
    ///
    /// Used for the default `"message"` topic, which the lifecycle listens to
    /// on every connection. Pinning an existing entry does not duplicate it.
    pub fn pin<H>(&mut self, event: &str, handle: Option<&mut H>)
    where
        H: TransportHandle + ?Sized,
    {
        let entry = self.entries.entry(event.to_string()).or_default();
        entry.pinned = true;
        if let Some(handle) = handle {
            install(event, entry, handle);
        }
    }

    /// Add `listener` under `event`.
    ///
    /// The first subscriber for a name creates its entry and, when a handle is
    /// attached, installs the transport listener. Subscribing the same
    /// callback (by `Arc` identity) twice returns the existing id.
    pub fn subscribe<H>(
        &mut self,
        event: &str,
        listener: Listener,
        handle: Option<&mut H>,
    ) -> StreamResult<SubscriberId>
    where
        H: TransportHandle + ?Sized,
    {
        if event.is_empty() {
            return Err(StreamError::EmptyEventName);
        }

        let entry = self.entries.entry(event.to_string()).or_default();
        if let Some(handle) = handle {
            install(event, entry, handle);
        }

        if let Some((id, _)) = entry
            .callbacks
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &listener))
        {
            return Ok(*id);
        }

        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        entry.callbacks.insert(id, listener);
        trace!(event, %id, subscribers = entry.callbacks.len(), "Subscribed");
        Ok(id)
    }

    /// Remove subscription `id` from `event`.
    ///
    /// Returns `false` if it was not registered. Removing the last subscriber
    /// of an unpinned name removes its transport listener and entry.
    pub fn unsubscribe<H>(&mut self, event: &str, id: SubscriberId, handle: Option<&mut H>) -> bool
    where
        H: TransportHandle + ?Sized,
    {
        let Some(entry) = self.entries.get_mut(event) else {
            return false;
        };
        if entry.callbacks.remove(&id).is_none() {
            return false;
        }
        trace!(event, %id, subscribers = entry.callbacks.len(), "Unsubscribed");

        if entry.callbacks.is_empty() && !entry.pinned {
            if entry.installed {
                if let Some(handle) = handle {
                    handle.remove_event_listener(event);
                }
            }
            self.entries.remove(event);
        }
        true
    }

    /// Install every entry's listener on a new handle.
    pub fn attach<H>(&mut self, handle: &mut H)
    where
        H: TransportHandle + ?Sized,
    {
        for (name, entry) in &mut self.entries {
            install(name, entry, handle);
        }
    }

    /// Remove every installed listener ahead of the handle going away.
    ///
    /// Entries and their subscribers survive for the next handle.
    pub fn detach<H>(&mut self, handle: Option<&mut H>)
    where
        H: TransportHandle + ?Sized,
    {
        match handle {
            Some(handle) => {
                for (name, entry) in &mut self.entries {
                    if entry.installed {
                        handle.remove_event_listener(name);
                        entry.installed = false;
                    }
                }
            }
            None => {
                for entry in self.entries.values_mut() {
                    entry.installed = false;
                }
            }
        }
    }

    /// Whether a transport listener for `event` is installed.
    #[must_use]
    pub fn is_listening(&self, event: &str) -> bool {
        self.entries.get(event).is_some_and(|e| e.installed)
    }

    /// Whether an entry exists for `event`.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.entries.contains_key(event)
    }

    /// Number of subscribers for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.entries.get(event).map_or(0, |e| e.callbacks.len())
    }

    /// Event names with an entry.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Callbacks for `event` in subscription order, copied at call time.
    #[must_use]
    pub fn snapshot(&self, event: &str) -> Vec<Listener> {
        self.entries
            .get(event)
            .map(|e| e.callbacks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Invoke every subscriber of `event` with `payload`.
    ///
    /// Iterates a snapshot: changes made by a callback apply from the next
    /// dispatch. A panicking callback is logged and skipped. Returns the
    /// number of callbacks invoked.
    pub fn dispatch(&self, event: &str, payload: &StreamEvent) -> usize {
        let listeners = self.snapshot(event);
        for listener in &listeners {
            guarded(event, || listener(payload));
        }
        listeners.len()
    }
}

/// Run a host callback, containing any panic it raises.
///
/// Returns `false` if the callback panicked.
pub(crate) fn guarded(callback: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            warn!(callback, reason = %reason, "Callback panicked");
            false
        }
    }
}

fn install<H>(name: &str, entry: &mut ListenerEntry, handle: &mut H)
where
    H: TransportHandle + ?Sized,
{
    if !entry.installed {
        handle.add_event_listener(name);
        entry.installed = true;
    }
}
