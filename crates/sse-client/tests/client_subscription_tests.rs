//! Client Subscription Tests
//!
//! These tests verify:
//! - One transport listener per event name, whatever the subscriber count
//! - Partial unsubscribe keeps the listener, last unsubscribe removes it
//! - Listeners are reinstalled on every new connection
//! - Bounded history and JSON decoding with raw-text fallback

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use sse_client::{EventData, StreamClient, StreamConfig, StreamError, Subscription};
use sse_testkit::{
    EventRecorder, MockConnection, MockTransport, TransportFault, assert_history, assert_listening,
    assert_single_listener_per_event, fixtures, init_test_tracing, settle,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn open_client(
    transport: &MockTransport,
    config: StreamConfig,
) -> (StreamClient, MockConnection) {
    init_test_tracing();
    let client = StreamClient::builder(transport.clone())
        .url(fixtures::STREAM_URL)
        .config(config)
        .spawn()
        .unwrap();
    client.connect().await.unwrap();
    let conn = transport.last_connection().unwrap();
    conn.open();
    client.wait_for(|s| s.connected).await.unwrap();
    (client, conn)
}

#[derive(Debug, Deserialize, PartialEq)]
struct Price {
    symbol: String,
    price: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener Cardinality Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_partial_unsubscribe_keeps_listener() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let first = EventRecorder::new();
    let second = EventRecorder::new();

    // Given two subscribers to "update"
    let sub_a = client.subscribe("update", first.callback()).await.unwrap();
    let sub_b = client.subscribe("update", second.callback()).await.unwrap();
    assert_eq!(conn.listener_count("update"), 1);

    // When one unsubscribes
    sub_a.unsubscribe();
    settle().await;

    // Then the listener stays and only the other receives
    assert!(conn.is_listening("update"));
    assert!(conn.send_event("update", r#"{"v":1}"#));
    settle().await;
    assert!(first.is_empty());
    assert_eq!(second.payloads(), vec![json!({"v": 1})]);

    // When the last one unsubscribes, the listener goes away
    drop(sub_b);
    settle().await;
    assert!(!conn.is_listening("update"));
    assert!(!conn.send_event("update", r#"{"v":2}"#));
    assert_listening(&conn, &["message"]);
}

#[tokio::test(start_paused = true)]
async fn test_many_subscribers_share_one_listener() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let recorder = EventRecorder::new();

    let mut subs = Vec::new();
    for _ in 0..5 {
        subs.push(client.subscribe("tick", recorder.callback()).await.unwrap());
    }
    subs.push(client.subscribe_default(recorder.callback()).await.unwrap());

    assert_single_listener_per_event(&conn);
    assert_listening(&conn, &["message", "tick"]);

    conn.send_event("tick", "1");
    settle().await;
    assert_eq!(recorder.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_same_listener_subscribed_once() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let recorder = EventRecorder::new();
    let listener = recorder.listener();

    let first = client
        .subscribe_listener("update", Arc::clone(&listener))
        .await
        .unwrap();
    let second = client
        .subscribe_listener("update", Arc::clone(&listener))
        .await
        .unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(conn.listener_count("update"), 1);

    conn.send_event("update", "x");
    settle().await;
    assert_eq!(recorder.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_before_connect_installs_on_open() {
    init_test_tracing();
    let transport = MockTransport::new();
    let client = StreamClient::builder(transport.clone())
        .url(fixtures::STREAM_URL)
        .spawn()
        .unwrap();
    let recorder = EventRecorder::new();
    let _sub = client.subscribe("price", recorder.callback()).await.unwrap();
    assert_eq!(transport.open_count(), 0);

    client.connect().await.unwrap();
    let conn = transport.last_connection().unwrap();

    assert_listening(&conn, &["message", "price"]);
}

#[tokio::test(start_paused = true)]
async fn test_listeners_reinstalled_after_reconnect() {
    let transport = MockTransport::new();
    let (client, first) = open_client(&transport, fixtures::config::fast()).await;
    let recorder = EventRecorder::new();
    let _update = client.subscribe("update", recorder.callback()).await.unwrap();
    let _status = client.subscribe("status", recorder.callback()).await.unwrap();
    let removed = client.subscribe("removed", recorder.callback()).await.unwrap();
    drop(removed);

    first.fail(TransportFault::network("reset"));
    client.wait_for(|s| s.next_retry.is_some()).await.unwrap();
    tokio::time::advance(Duration::from_millis(100)).await;
    settle().await;

    let second = transport.last_connection().unwrap();
    assert!(first.listeners().is_empty());
    assert_listening(&second, &["message", "status", "update"]);
    assert_single_listener_per_event(&second);

    second.open();
    second.send_event("status", r#""ok""#);
    settle().await;
    assert_eq!(recorder.payloads(), vec![json!("ok")]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_event_name_rejected() {
    let transport = MockTransport::new();
    let (client, _conn) = open_client(&transport, fixtures::config::fast()).await;

    let result = client.subscribe("", |_| {}).await;

    assert!(matches!(result, Err(StreamError::EmptyEventName)));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_from_inside_callback() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&calls);
    let own = Arc::clone(&slot);
    let sub = client
        .subscribe("once", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(own.lock().unwrap().take());
        })
        .await
        .unwrap();
    *slot.lock().unwrap() = Some(sub);

    // Both frames are queued before the engine runs
    conn.send_event("once", "1");
    conn.send_event("once", "2");
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!conn.is_listening("once"));
}

#[tokio::test(start_paused = true)]
async fn test_subscription_outlives_engine() {
    let transport = MockTransport::new();
    let (client, _conn) = open_client(&transport, fixtures::config::fast()).await;
    let sub = client.subscribe("update", |_| {}).await.unwrap();
    assert_eq!(sub.event(), "update");

    drop(client);
    settle().await;
    sub.unsubscribe();
}

// ─────────────────────────────────────────────────────────────────────────────
// History Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_history_keeps_most_recent() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::with_history(2)).await;

    for data in [r#""A""#, r#""B""#, r#""C""#] {
        conn.send(data);
    }
    settle().await;

    assert_history(&client, &[json!("B"), json!("C")]);
    let last = client.last_message().unwrap();
    assert_eq!(last.data, EventData::Json(json!("C")));
}

#[tokio::test(start_paused = true)]
async fn test_callback_sees_its_own_event_in_snapshot() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let observed: Arc<Mutex<Vec<(EventData, Option<EventData>, usize)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let watch = client.watch();
    let _sub = client
        .subscribe_default(move |event| {
            let snapshot = watch.borrow();
            sink.lock().unwrap().push((
                event.data.clone(),
                snapshot.last_message.as_ref().map(|m| m.data.clone()),
                snapshot.messages.len(),
            ));
        })
        .await
        .unwrap();

    conn.send(r#""A""#);
    conn.send(r#""B""#);
    settle().await;

    let a = EventData::Json(json!("A"));
    let b = EventData::Json(json!("B"));
    assert_eq!(
        *observed.lock().unwrap(),
        vec![(a.clone(), Some(a), 1), (b.clone(), Some(b), 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_history_records_named_events_with_subscribers() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let _sub = client.subscribe("price", |_| {}).await.unwrap();

    conn.emit(fixtures::frames::json("price", &fixtures::json::price("BTC", 1.5)));
    conn.emit(fixtures::frames::event("unheard", "ignored"));
    conn.send("plain");
    settle().await;

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_event("price"));
    assert!(messages[1].is_event("message"));
}

#[tokio::test(start_paused = true)]
async fn test_history_survives_reconnect() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    conn.send("1");
    settle().await;

    client.reconnect().await.unwrap();

    assert_history(&client, &[json!(1)]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_invalid_json_delivered_as_text() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let recorder = EventRecorder::new();
    let _sub = client.subscribe_default(recorder.callback()).await.unwrap();

    conn.send("{bad json");
    settle().await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, EventData::Text("{bad json".to_string()));
    assert_eq!(client.last_message().unwrap().data.as_text(), Some("{bad json"));
}

#[tokio::test(start_paused = true)]
async fn test_typed_payload() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;
    let received: Arc<Mutex<Vec<Price>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let _sub = client
        .subscribe("price", move |event| {
            if let Ok(price) = event.json::<Price>() {
                sink.lock().unwrap().push(price);
            }
        })
        .await
        .unwrap();

    conn.emit(fixtures::frames::json("price", &fixtures::json::price("ETH", 2.25)));
    settle().await;

    assert_eq!(
        *received.lock().unwrap(),
        vec![Price {
            symbol: "ETH".to_string(),
            price: 2.25
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_event_id_preserved() {
    let transport = MockTransport::new();
    let (client, conn) = open_client(&transport, fixtures::config::fast()).await;

    conn.emit(fixtures::frames::with_id("evt-9", &fixtures::json::heartbeat(9).to_string()));
    settle().await;

    let last = client.last_message().unwrap();
    assert_eq!(last.id.as_deref(), Some("evt-9"));
    assert_eq!(last.data.as_json().unwrap()["seq"], 9);
}
