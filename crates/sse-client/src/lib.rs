//! SSE Client - Reconnecting server-sent-events client engine
//!
//! This crate keeps one live connection to an event-stream endpoint and turns
//! its single inbound channel into independent, subscribable topics:
//!
//! - **Lifecycle**: `Idle → Connecting → Open ⇄ Reconnecting`, closable and restartable
//! - **Backoff**: exponential reconnect delay, reset on every successful open
//! - **Subscriptions**: one transport listener per event name, reference counted
//! - **History**: bounded FIFO of the most recent events plus the last one
//!
//! The wire transport is supplied by the host through the [`Transport`] and
//! [`TransportHandle`] traits.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sse_client::{StreamClient, StreamConfig};
//!
//! let client = StreamClient::builder(my_transport)
//!     .url("https://api.example.com/events")
//!     .config(StreamConfig::default().with_max_messages(50))
//!     .on_error(|fault| tracing::warn!(%fault, "stream dropped"))
//!     .spawn()?;
//!
//! client.connect().await?;
//!
//! let sub = client
//!     .subscribe("update", |event| println!("update: {:?}", event.data))
//!     .await?;
//!
//! // ...
//! sub.unsubscribe();
//! client.close().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod client;
mod config;
mod error;
mod event;
mod history;
mod lifecycle;
mod registry;
mod transport;

pub use backoff::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use history::*;
pub use lifecycle::*;
pub use registry::*;
pub use transport::*;

use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default cap on the reconnection delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Default capacity of the message history.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Event name used by frames that carry no explicit `event:` field.
pub const DEFAULT_EVENT: &str = "message";
