//! WebSocket gateway tests
//!
//! Each test runs its own gateway on an ephemeral port.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{wait_until, TestServer, TEST_JWT_SECRET};
use relay_common::JwtService;
use serde_json::{json, Map};

// ============================================================================
// HTTP Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Request failed");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_stats_track_connections() {
    let server = TestServer::start().await.expect("Failed to start server");

    let stats = server.get_json("/stats").await.unwrap();
    assert_eq!(stats["connections"], 0);
    assert_eq!(stats["messageFormat"], "json");

    let client = server.connect().await.unwrap();
    let stats = server.get_json("/stats").await.unwrap();
    assert_eq!(stats["connections"], 1);

    client.close().await.unwrap();
    let router = server.state.router();
    wait_until(|| router.registry().count() == 0).await.unwrap();
}

// ============================================================================
// WebSocket Protocol
// ============================================================================

#[tokio::test]
async fn test_ping_pong() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect().await.unwrap();

    client.send(&json!({"event": "ping"})).await.unwrap();
    let frame = client.recv_event("ping_response").await.unwrap();

    assert!(frame["data"]["pong"].as_f64().is_some());
}

#[tokio::test]
async fn test_invalid_frame_gets_error_envelope() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect().await.unwrap();

    client.send_text("definitely not json").await.unwrap();
    let frame = client.recv_event("error").await.unwrap();

    assert_eq!(frame["data"]["message"], "Invalid message format");
}

#[tokio::test]
async fn test_authenticate_with_jwt() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect().await.unwrap();

    let jwt = JwtService::new(TEST_JWT_SECRET, 3600);
    let token = jwt.issue_token("user-42", Some("Grace".to_string())).unwrap();

    client
        .send(&json!({"event": "authenticate", "data": {"token": "forged"}}))
        .await
        .unwrap();
    let rejected = client.recv_event("authenticate_response").await.unwrap();
    assert_eq!(rejected["data"]["authenticated"], false);

    client
        .send(&json!({"event": "authenticate", "data": {"token": token}}))
        .await
        .unwrap();
    let accepted = client.recv_event("authenticate_response").await.unwrap();
    assert_eq!(accepted["data"]["authenticated"], true);
    assert_eq!(accepted["data"]["user"], json!({"id": "user-42", "name": "Grace"}));
}

#[tokio::test]
async fn test_room_broadcast_over_websocket() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut first = server.connect().await.unwrap();
    let mut second = server.connect().await.unwrap();

    for client in [&mut first, &mut second] {
        client
            .send(&json!({"event": "subscribe", "data": {"room": "news"}}))
            .await
            .unwrap();
        let reply = client.recv_event("subscribe_response").await.unwrap();
        assert_eq!(reply["data"]["subscribed"], true);
    }

    let mut data = Map::new();
    data.insert("headline".to_string(), json!("Relay ships"));
    let delivered = server.state.router().emit_to_room("news", "article", data);
    assert_eq!(delivered, 2);

    for client in [&mut first, &mut second] {
        let frame = client.recv_event("article").await.unwrap();
        assert_eq!(frame["data"]["headline"], "Relay ships");
    }
}
