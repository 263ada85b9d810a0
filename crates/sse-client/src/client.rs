//! Async stream client.
//!
//! [`StreamClient`] is a cheap, cloneable handle to an engine task that owns
//! the [`Lifecycle`]. Commands, transport events and the reconnect deadline
//! are processed one at a time on that task, so the lifecycle needs no locks.
//! Observable state is published through a `watch` channel after every
//! change.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::{
    ClientSnapshot, ConnectionState, DEFAULT_EVENT, Lifecycle, Listener, StreamConfig,
    StreamError, StreamEvent, StreamHooks, StreamResult, SubscriberId, Transport, TransportFault,
    TransportMessage,
};

enum Command {
    Connect {
        ack: oneshot::Sender<()>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
    SetUrl {
        url: Option<String>,
        ack: oneshot::Sender<()>,
    },
    Subscribe {
        event: String,
        listener: Listener,
        reply: oneshot::Sender<StreamResult<SubscriberId>>,
    },
    Unsubscribe {
        event: String,
        id: SubscriberId,
    },
}

/// Builder for [`StreamClient`].
pub struct StreamClientBuilder {
    transport: Box<dyn Transport>,
    url: Option<String>,
    config: StreamConfig,
    hooks: StreamHooks,
}

impl StreamClientBuilder {
    /// Start building a client on top of `transport`.
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Box::new(transport),
            url: None,
            config: StreamConfig::default(),
            hooks: StreamHooks::default(),
        }
    }

    /// Set the stream address.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Set all hooks at once.
    #[must_use]
    pub fn hooks(mut self, hooks: StreamHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Called after every successful open.
    #[must_use]
    pub fn on_open(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_open = Some(Arc::new(hook));
        self
    }

    /// Called on every transport fault.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&TransportFault) + Send + Sync + 'static) -> Self {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Produce request headers for each connection attempt.
    #[must_use]
    pub fn headers(
        mut self,
        provider: impl Fn() -> HashMap<String, String> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.headers = Some(Arc::new(provider));
        self
    }

    /// Validate the configuration and start the engine task.
    ///
    /// The client starts `Idle`; call [`StreamClient::connect`] to open the
    /// stream. Must be called from within a tokio runtime.
    pub fn spawn(self) -> StreamResult<StreamClient> {
        self.config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let lifecycle = Lifecycle::new(
            self.url,
            self.config,
            self.hooks,
            self.transport,
            events_tx,
        );
        let (snapshot_tx, snapshot_rx) = watch::channel(lifecycle.snapshot());

        let engine = Engine {
            published: lifecycle.revision(),
            lifecycle,
            snapshot_tx,
        };
        tokio::spawn(engine.run(commands_rx, events_rx));

        Ok(StreamClient {
            commands: commands_tx,
            snapshot: snapshot_rx,
        })
    }
}

/// Handle to a running stream engine.
///
/// Dropping every clone closes the connection and stops the engine.
#[derive(Debug, Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ClientSnapshot>,
}

impl StreamClient {
    /// Start building a client.
    #[must_use]
    pub fn builder(transport: impl Transport) -> StreamClientBuilder {
        StreamClientBuilder::new(transport)
    }

    /// Open the stream, replacing any current connection.
    ///
    /// Does nothing when no address is configured.
    pub async fn connect(&self) -> StreamResult<()> {
        self.request(|ack| Command::Connect { ack }).await
    }

    /// Force a fresh connection. Same as [`Self::connect`].
    pub async fn reconnect(&self) -> StreamResult<()> {
        self.connect().await
    }

    /// Close the stream and cancel any pending reconnect.
    ///
    /// When this returns, no timer or connection is left behind and no
    /// further events will be dispatched.
    pub async fn close(&self) -> StreamResult<()> {
        self.request(|ack| Command::Close { ack }).await
    }

    /// Change the stream address; an active client reconnects to it.
    pub async fn set_url(&self, url: Option<String>) -> StreamResult<()> {
        self.request(|ack| Command::SetUrl { url, ack }).await
    }

    /// Subscribe a callback to `event`.
    ///
    /// The returned guard unsubscribes when dropped.
    pub async fn subscribe<F>(
        &self,
        event: impl Into<String>,
        callback: F,
    ) -> StreamResult<Subscription>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscribe_listener(event, Arc::new(callback)).await
    }

    /// Subscribe a callback to the default `"message"` event.
    pub async fn subscribe_default<F>(&self, callback: F) -> StreamResult<Subscription>
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.subscribe(DEFAULT_EVENT, callback).await
    }

    /// Subscribe a shared listener.
    ///
    /// Subscribing the same `Arc` twice to one event yields the same
    /// subscription id and a single delivery per event.
    pub async fn subscribe_listener(
        &self,
        event: impl Into<String>,
        listener: Listener,
    ) -> StreamResult<Subscription> {
        let event = event.into();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                event: event.clone(),
                listener,
                reply,
            })
            .map_err(|_| StreamError::EngineStopped)?;
        let id = rx.await.map_err(|_| StreamError::EngineStopped)??;

        Ok(Subscription {
            event,
            id,
            commands: Some(self.commands.downgrade()),
        })
    }

    /// Whether the stream is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.snapshot.borrow().connected
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Most recent event.
    #[must_use]
    pub fn last_message(&self) -> Option<StreamEvent> {
        self.snapshot.borrow().last_message.clone()
    }

    /// Bounded history, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<StreamEvent> {
        self.snapshot.borrow().messages.clone()
    }

    /// Full observable state.
    #[must_use]
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every observable change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until `predicate` holds for the published state.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ClientSnapshot) -> bool,
    ) -> StreamResult<ClientSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| StreamError::EngineStopped)?;
        Ok(snapshot.clone())
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> StreamResult<()> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(command(ack))
            .map_err(|_| StreamError::EngineStopped)?;
        rx.await.map_err(|_| StreamError::EngineStopped)
    }
}

/// One active subscription. Unsubscribes on drop.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    event: String,
    id: SubscriberId,
    commands: Option<mpsc::WeakUnboundedSender<Command>>,
}

impl Subscription {
    /// Event name.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback. Takes effect before any later command.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(commands) = self.commands.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let _ = commands.send(Command::Unsubscribe {
            event: std::mem::take(&mut self.event),
            id: self.id,
        });
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { .. } => f.write_str("Connect"),
            Self::Close { .. } => f.write_str("Close"),
            Self::SetUrl { url, .. } => f.debug_struct("SetUrl").field("url", url).finish(),
            Self::Subscribe { event, .. } => {
                f.debug_struct("Subscribe").field("event", event).finish()
            }
            Self::Unsubscribe { event, id } => f
                .debug_struct("Unsubscribe")
                .field("event", event)
                .field("id", id)
                .finish(),
        }
    }
}

/// The task side: owns the lifecycle and publishes its state.
struct Engine {
    lifecycle: Lifecycle,
    snapshot_tx: watch::Sender<ClientSnapshot>,
    published: u64,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<TransportMessage>,
    ) {
        debug!("Stream engine started");
        loop {
            let deadline = self.lifecycle.pending_reconnect().map(|p| p.deadline);

            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                Some(message) = events.recv() => {
                    let recorded = self.lifecycle.handle_transport(message);
                    self.publish();
                    if let Some(event) = recorded {
                        self.lifecycle.dispatch(&event);
                    }
                }
                () = reconnect_timer(deadline) => {
                    self.lifecycle.fire_reconnect();
                    self.publish();
                }
            }
        }

        debug!("Stream engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { ack } => {
                self.lifecycle.connect();
                self.publish();
                let _ = ack.send(());
            }
            Command::Close { ack } => {
                self.lifecycle.close();
                self.publish();
                let _ = ack.send(());
            }
            Command::SetUrl { url, ack } => {
                self.lifecycle.set_url(url);
                self.publish();
                let _ = ack.send(());
            }
            Command::Subscribe {
                event,
                listener,
                reply,
            } => {
                let result = self.lifecycle.subscribe(&event, listener);
                if let Err(e) = &result {
                    warn!(error = %e, event = %event, "Rejected subscription");
                }
                let _ = reply.send(result);
            }
            Command::Unsubscribe { event, id } => {
                self.lifecycle.unsubscribe(&event, id);
            }
        }
    }

    fn publish(&mut self) {
        let revision = self.lifecycle.revision();
        if revision != self.published {
            self.published = revision;
            self.snapshot_tx.send_replace(self.lifecycle.snapshot());
        }
    }
}

// Also runs when the engine task unwinds.
impl Drop for Engine {
    fn drop(&mut self) {
        self.lifecycle.close();
        self.publish();
    }
}

/// Resolves at `deadline`, or never when no reconnect is pending.
async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
