//! Test fixtures for stream client testing.

// ─────────────────────────────────────────────────────────────────────────────
// Addresses
// ─────────────────────────────────────────────────────────────────────────────

/// Default stream address used by fixtures.
pub const STREAM_URL: &str = "https://stream.example.test/events";

/// Alternate address for address-change tests.
pub const OTHER_STREAM_URL: &str = "https://stream.example.test/other";

// ─────────────────────────────────────────────────────────────────────────────
// Frame Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Common frames.
pub mod frames {
    use sse_client::Frame;

    /// Default-event frame with raw `data`.
    #[must_use]
    pub fn message(data: &str) -> Frame {
        Frame::new(data)
    }

    /// Named-event frame with raw `data`.
    #[must_use]
    pub fn event(name: &str, data: &str) -> Frame {
        Frame::new(data).with_event(name)
    }

    /// Named-event frame carrying serialized JSON.
    #[must_use]
    pub fn json(name: &str, value: &serde_json::Value) -> Frame {
        Frame::new(value.to_string()).with_event(name)
    }

    /// Default-event frame with an ID for resumption tests.
    #[must_use]
    pub fn with_id(id: &str, data: &str) -> Frame {
        Frame::new(data).with_id(id)
    }

    /// Bare server `retry:` hint with no payload.
    #[must_use]
    pub fn retry_hint(retry_ms: u64) -> Frame {
        Frame::new("").with_retry(retry_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Common JSON payloads.
pub mod json {
    use serde_json::json;

    /// Price tick.
    #[must_use]
    pub fn price(symbol: &str, price: f64) -> serde_json::Value {
        json!({
            "symbol": symbol,
            "price": price
        })
    }

    /// Heartbeat.
    #[must_use]
    pub fn heartbeat(seq: u64) -> serde_json::Value {
        json!({ "type": "heartbeat", "seq": seq })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Common client configurations.
pub mod config {
    use std::time::Duration;

    use sse_client::StreamConfig;

    /// 100ms initial delay capped at 800ms.
    #[must_use]
    pub fn fast() -> StreamConfig {
        StreamConfig::new()
            .with_retry_delay(Duration::from_millis(100))
            .with_max_retry_delay(Duration::from_millis(800))
    }

    /// [`fast`] with a history of `max_messages`.
    #[must_use]
    pub fn with_history(max_messages: usize) -> StreamConfig {
        fast().with_max_messages(max_messages)
    }
}
