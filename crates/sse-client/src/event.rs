//! Inbound frames and decoded stream events.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::DEFAULT_EVENT;

/// One raw unit delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event ID (from "id:" field).
    pub id: Option<String>,
    /// Event name (from "event:" field, `"message"` when absent).
    pub event: String,
    /// Raw payload (from "data:" fields, joined with newlines).
    pub data: String,
    /// Server reconnection hint in milliseconds (from "retry:" field).
    pub retry: Option<u64>,
}

impl Frame {
    /// Create a frame for the default `"message"` event.
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: DEFAULT_EVENT.to_string(),
            data: data.into(),
            retry: None,
        }
    }

    /// Set the event name.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    /// Set the event ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the retry hint.
    #[must_use]
    pub const fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }
}

/// Payload of a decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// The payload parsed as JSON.
    Json(Value),
    /// The payload was not JSON; kept verbatim.
    Text(String),
}

impl EventData {
    /// Decode a raw payload, falling back to the raw string.
    ///
    /// Never fails: anything that is not valid JSON is kept as text.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        serde_json::from_str(raw).map_or_else(|_| Self::Text(raw.to_string()), Self::Json)
    }

    /// The JSON value, if the payload parsed.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The raw text, if the payload did not parse.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Whether the payload parsed as JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Convert into a JSON value; text payloads become JSON strings.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }
}

/// A decoded event as seen by subscribers and the history.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Event ID, when the frame carried one.
    pub id: Option<String>,
    /// Event name.
    pub event: String,
    /// Decoded payload.
    pub data: EventData,
}

impl StreamEvent {
    /// Decode a frame.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            id: frame.id.clone(),
            event: frame.event.clone(),
            data: EventData::decode(&frame.data),
        }
    }

    /// Check if this is a specific event type.
    #[must_use]
    pub fn is_event(&self, event_type: &str) -> bool {
        self.event == event_type
    }

    /// Deserialize the payload into a typed value.
    ///
    /// Text payloads are offered to the deserializer as a JSON string, so a
    /// `String` target always succeeds.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            EventData::Json(value) => T::deserialize(value),
            EventData::Text(text) => T::deserialize(Value::String(text.clone())),
        }
    }
}

impl From<Frame> for StreamEvent {
    fn from(frame: Frame) -> Self {
        Self {
            data: EventData::decode(&frame.data),
            id: frame.id,
            event: frame.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_object() {
        let data = EventData::decode(r#"{"message": "hello"}"#);
        assert_eq!(data, EventData::Json(json!({"message": "hello"})));
    }

    #[test]
    fn test_decode_scalars_are_json() {
        assert_eq!(EventData::decode("42"), EventData::Json(json!(42)));
        assert_eq!(EventData::decode("\"quoted\""), EventData::Json(json!("quoted")));
        assert_eq!(EventData::decode("null"), EventData::Json(Value::Null));
    }

    #[test]
    fn test_decode_bad_json_falls_back_to_text() {
        let data = EventData::decode("{bad json");
        assert_eq!(data, EventData::Text("{bad json".to_string()));
        assert_eq!(data.as_text(), Some("{bad json"));
        assert!(data.as_json().is_none());
    }

    #[test]
    fn test_decode_empty_payload_is_text() {
        assert_eq!(EventData::decode(""), EventData::Text(String::new()));
    }

    #[test]
    fn test_from_frame_keeps_id_and_name() {
        let frame = Frame::new(r#"{"n": 1}"#).with_event("update").with_id("7");
        let event = StreamEvent::from_frame(&frame);

        assert_eq!(event.id.as_deref(), Some("7"));
        assert!(event.is_event("update"));
        assert!(event.data.is_json());
        assert_eq!(StreamEvent::from(frame), event);
    }

    #[test]
    fn test_frame_defaults_to_message_event() {
        let frame = Frame::new("hi");
        assert_eq!(frame.event, DEFAULT_EVENT);
        assert_eq!(frame.id, None);
        assert_eq!(frame.retry, None);
    }

    #[test]
    fn test_typed_json_access() {
        #[derive(serde::Deserialize)]
        struct Data {
            message: String,
        }

        let event = StreamEvent::from_frame(&Frame::new(r#"{"message": "hello"}"#));
        let data: Data = event.json().unwrap();
        assert_eq!(data.message, "hello");

        let text = StreamEvent::from_frame(&Frame::new("plain words"));
        let s: String = text.json().unwrap();
        assert_eq!(s, "plain words");
        assert!(text.json::<Data>().is_err());
    }

    #[test]
    fn test_into_value() {
        assert_eq!(EventData::Text("x".into()).into_value(), json!("x"));
        assert_eq!(EventData::Json(json!([1])).into_value(), json!([1]));
    }
}
