//! Router flow tests
//!
//! Drive a `MessageRouter` end to end through in-memory transports.
//!
//! Run with: cargo test -p integration-tests --test router_flow_tests

use integration_tests::MemoryClient;
use relay_common::RouterSettings;
use relay_core::{BroadcastOptions, DispatchError, EventDispatcher, MessageRouter, RouteOutcome};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn create_router() -> Arc<MessageRouter> {
    Arc::new(MessageRouter::new(RouterSettings::default(), EventDispatcher::default()))
}

// ============================================================================
// Rooms
// ============================================================================

#[tokio::test]
async fn test_room_chat_flow() {
    let router = create_router();
    let weak = Arc::downgrade(&router);
    router.on("chat", move |event| {
        let room = event.data()["room"].as_str().unwrap_or_default().to_string();
        if let Some(router) = weak.upgrade() {
            let outgoing = event.broadcast_to(&[room.as_str()]).with_exception(event.client_id());
            router.broadcast(&outgoing, &BroadcastOptions::default());
        }
        Ok(None)
    });

    let mut alice = MemoryClient::connect(&router, "alice");
    let mut bob = MemoryClient::connect(&router, "bob");
    let mut carol = MemoryClient::connect(&router, "carol");

    for client in [&alice, &bob] {
        client
            .send(&router, &json!({"event": "subscribe", "data": {"room": "lobby"}}))
            .unwrap();
    }
    alice.drain();
    bob.drain();

    let outcome = alice
        .send(&router, &json!({"event": "chat", "data": {"room": "lobby", "text": "hi"}}))
        .unwrap();
    assert_eq!(outcome, RouteOutcome::Handled { results: Vec::new() });

    let received = bob.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["event"], "chat");
    assert_eq!(received[0]["data"]["text"], "hi");
    assert_eq!(received[0]["meta"]["rooms"], json!(["lobby"]));

    assert!(alice.drain().is_empty());
    assert!(carol.drain().is_empty());
}

#[tokio::test]
async fn test_disconnect_cleans_up_rooms() {
    let router = create_router();
    let client = MemoryClient::connect(&router, "k1");
    client
        .send(&router, &json!({"event": "subscribe", "data": {"room": "ops"}}))
        .unwrap();

    let disconnected = router.dispatcher().wait_for("disconnect", Some(Duration::from_secs(1)));
    assert!(client.disconnect(&router).is_some());
    assert!(client.disconnect(&router).is_none());

    let payload = disconnected.await.unwrap();
    assert_eq!(payload["connectionId"], client.id());
    assert_eq!(payload["rooms"], json!(["ops"]));
    assert_eq!(router.registry().count(), 0);
    assert_eq!(router.rooms().get_room_count("ops"), 0);
    assert!(router.rooms().get_all_rooms().is_empty());
}

// ============================================================================
// Acknowledgements
// ============================================================================

#[tokio::test]
async fn test_client_requested_ack_carries_listener_results() {
    let router = create_router();
    router
        .dispatcher()
        .on("save", |payload, _| Ok(Some(json!({"saved": payload["v"]}))), 0)
        .unwrap();

    let mut client = MemoryClient::connect(&router, "k1");
    client
        .send(
            &router,
            &json!({"event": "save", "data": {"v": 7}, "meta": {"requiresAck": true, "ackId": "c1"}}),
        )
        .unwrap();

    let frames = client.drain();
    let ack = frames.iter().find(|f| f["event"] == "ack").unwrap();
    assert_eq!(ack["data"]["ackId"], "c1");
    assert_eq!(ack["data"]["event"], "save");
    assert_eq!(ack["data"]["response"], json!([{"saved": 7}]));
}

#[tokio::test]
async fn test_server_requested_ack_round_trip() {
    let router = create_router();
    let mut client = MemoryClient::connect(&router, "k1");

    let promise = router.emit_to_connection_with_ack(
        client.id(),
        "confirm",
        json!({"order": 42}),
        Some(Duration::from_secs(2)),
    );
    assert_eq!(router.dispatcher().pending_ack_count(), 1);

    let request = client.next_frame().await.unwrap();
    assert_eq!(request["event"], "confirm");
    assert_eq!(request["meta"]["requiresAck"], true);
    let ack_id = request["meta"]["ackId"].as_str().unwrap().to_string();

    let outcome = client
        .send(&router, &json!({"event": "ack", "data": {"ackId": ack_id, "response": {"ok": true}}}))
        .unwrap();
    assert_eq!(outcome, RouteOutcome::System);

    assert_eq!(promise.await, Ok(json!({"ok": true})));
    assert_eq!(router.dispatcher().pending_ack_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_server_requested_ack_times_out() {
    let router = create_router();
    let client = MemoryClient::connect(&router, "k1");

    let promise = router.emit_to_connection_with_ack(
        client.id(),
        "confirm",
        Value::Null,
        Some(Duration::from_millis(100)),
    );

    assert!(matches!(promise.await, Err(DispatchError::AckTimeout { .. })));
    assert_eq!(router.dispatcher().pending_ack_count(), 0);
}

// ============================================================================
// Dispatcher composition
// ============================================================================

#[tokio::test]
async fn test_client_events_reach_piped_audit_dispatcher() {
    let router = create_router();
    let audit = EventDispatcher::default();
    router.dispatcher().pipe_to(&audit, &["order_placed"], false);

    let seen = audit.wait_for("order_placed", Some(Duration::from_secs(1)));
    let client = MemoryClient::connect(&router, "k1");
    client
        .send(&router, &json!({"event": "order_placed", "data": {"sku": "A-1"}}))
        .unwrap();

    assert_eq!(seen.await.unwrap(), json!({"sku": "A-1"}));
}

#[tokio::test]
async fn test_unknown_event_reports_error_when_configured() {
    let settings = RouterSettings {
        respond_to_unknown_events: true,
        ..RouterSettings::default()
    };
    let router = MessageRouter::new(settings, EventDispatcher::default());
    let mut client = MemoryClient::connect(&router, "k1");

    let outcome = client
        .send(&router, &json!({"event": "mystery", "data": {}}))
        .unwrap();
    assert_eq!(outcome, RouteOutcome::Unhandled);

    let frames = client.drain();
    assert_eq!(frames[0]["event"], "error");
    assert_eq!(frames[0]["data"]["message"], "Unknown event: mystery");
}
