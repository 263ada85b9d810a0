//! Assertion helpers for stream client testing.

use sse_client::{ConnectionState, StreamClient};

use crate::MockConnection;

// ─────────────────────────────────────────────────────────────────────────────
// Listener Assertions
// ─────────────────────────────────────────────────────────────────────────────

/// Assert no event name has more than one installed listener.
///
/// # Panics
///
/// Panics if any event name is installed twice.
pub fn assert_single_listener_per_event(connection: &MockConnection) {
    let listeners = connection.listeners();
    for name in &listeners {
        let count = connection.listener_count(name);
        assert!(
            count == 1,
            "Expected one listener for '{name}' but found {count}: {listeners:?}"
        );
    }
}

/// Assert exactly `expected` event names have listeners installed.
///
/// # Panics
///
/// Panics if the installed set differs.
pub fn assert_listening(connection: &MockConnection, expected: &[&str]) {
    let mut actual = connection.listeners();
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    expected.sort();
    assert_eq!(actual, expected, "Installed listeners differ");
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Assertions
// ─────────────────────────────────────────────────────────────────────────────

/// Assert the client's published state.
///
/// # Panics
///
/// Panics if the state differs.
pub fn assert_state(client: &StreamClient, expected: ConnectionState) {
    let snapshot = client.snapshot();
    assert_eq!(
        snapshot.state, expected,
        "Expected state {expected} but snapshot is {snapshot:?}"
    );
}

/// Assert the history payloads, oldest first.
///
/// # Panics
///
/// Panics if the history differs.
pub fn assert_history(client: &StreamClient, expected: &[serde_json::Value]) {
    let actual: Vec<serde_json::Value> = client
        .messages()
        .into_iter()
        .map(|e| e.data.into_value())
        .collect();
    assert_eq!(actual, expected, "History differs");
}
