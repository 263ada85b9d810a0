//! Test kit for `sse-client`.
//!
//! - [`MockTransport`] - scripted transport that records every connection
//! - [`EventRecorder`] and [`HookRecorder`] - capture callbacks
//! - [`fixtures`] - frames, payloads and configurations
//! - Assertion helpers for listener bookkeeping and published state
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use sse_client::StreamClient;
//! use sse_testkit::{EventRecorder, MockTransport, fixtures, settle};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_delivery() {
//!     sse_testkit::init_test_tracing();
//!
//!     let transport = MockTransport::new();
//!     let client = StreamClient::builder(transport.clone())
//!         .url(fixtures::STREAM_URL)
//!         .config(fixtures::config::fast())
//!         .spawn()
//!         .unwrap();
//!
//!     let recorder = EventRecorder::new();
//!     let _sub = client.subscribe_default(recorder.callback()).await.unwrap();
//!     client.connect().await.unwrap();
//!
//!     let conn = transport.last_connection().unwrap();
//!     conn.open();
//!     conn.send(r#"{"n":1}"#);
//!     settle().await;
//!
//!     assert_eq!(recorder.len(), 1);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assertions;
pub mod fixtures;
mod mock_transport;
mod recorder;
mod tracing_config;

pub use assertions::*;
pub use mock_transport::*;
pub use recorder::*;
pub use tracing_config::*;

// Re-export core types for convenience
pub use sse_client::{
    ClientSnapshot, ConnectionState, Frame, StreamClient, StreamConfig, StreamEvent,
    TransportFault,
};
