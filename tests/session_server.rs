//! End-to-end tests over real loopback sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use route_server::client::RouteClient;
use route_server::protocol::{Request, Response};
use route_server::security::AdmissionController;
use serde_json::json;

mod common;

use common::{start_server, RawClient};

#[tokio::test]
async fn echo_round_trip_on_the_wire() {
    let server = start_server(Duration::from_secs(5), None).await;
    let mut client = RawClient::connect(server.addr).await;

    client.write(br#"{"route":"echo","content":"hi"}"#).await;
    assert_eq!(
        client.next_line().await.as_deref(),
        Some(r#"{"status":"ok","message":"hi"}"#)
    );

    server.stop().await;
}

#[tokio::test]
async fn ack_route_and_missing_content() {
    let server = start_server(Duration::from_secs(5), None).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();

    assert_eq!(
        client.call("ack", "hello").await.unwrap(),
        Response::ok("message received: hello")
    );
    assert_eq!(
        client.call("ack", json!(null)).await.unwrap(),
        Response::failure("missing content")
    );

    server.stop().await;
}

#[tokio::test]
async fn unknown_route_gets_failure_and_session_continues() {
    let server = start_server(Duration::from_secs(5), None).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();

    assert_eq!(
        client.call("salam", "x").await.unwrap(),
        Response::failure("unknown route: salam")
    );
    assert_eq!(client.call("echo", "still here").await.unwrap(), Response::ok("still here"));

    server.stop().await;
}

#[tokio::test]
async fn pipelined_requests_answered_in_order() {
    let server = start_server(Duration::from_secs(5), None).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();

    for i in 0..20 {
        client.send_only(&Request::new("echo", format!("msg-{}", i))).await.unwrap();
    }
    for i in 0..20 {
        assert_eq!(client.receive().await.unwrap(), Response::ok(format!("msg-{}", i)));
    }

    server.stop().await;
}

#[tokio::test]
async fn eleventh_request_in_window_is_rejected() {
    let admission = Arc::new(AdmissionController::new(10, Duration::from_secs(60)));
    let server = start_server(Duration::from_secs(5), Some(Arc::clone(&admission))).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();

    for i in 0..10 {
        let response = client.call("echo", i).await.unwrap();
        assert!(response.is_ok(), "request {} should be admitted", i);
    }
    assert_eq!(
        client.call("echo", 10).await.unwrap(),
        Response::failure("too many requests")
    );
    assert_eq!(admission.request_count("127.0.0.1"), Some(11));

    server.stop().await;
}

#[tokio::test]
async fn quota_is_shared_across_connections_from_one_client() {
    let admission = Arc::new(AdmissionController::new(2, Duration::from_secs(60)));
    let server = start_server(Duration::from_secs(5), Some(admission)).await;

    let mut first = RouteClient::connect(server.addr).await.unwrap();
    let mut second = RouteClient::connect(server.addr).await.unwrap();
    assert!(first.call("echo", "a").await.unwrap().is_ok());
    assert!(second.call("echo", "b").await.unwrap().is_ok());
    assert!(!first.call("echo", "c").await.unwrap().is_ok());

    server.stop().await;
}

#[tokio::test]
async fn silent_client_is_dropped_at_deadline() {
    let deadline = Duration::from_millis(300);
    let server = start_server(deadline, None).await;
    let started = Instant::now();
    let mut client = RawClient::connect(server.addr).await;

    assert_eq!(client.next_line().await, None);
    let elapsed = started.elapsed();
    assert!(elapsed >= deadline - Duration::from_millis(50), "closed too early: {:?}", elapsed);
    assert!(elapsed < deadline + Duration::from_secs(1), "closed too late: {:?}", elapsed);

    assert!(server.tracker.wait_for_drain(Duration::from_secs(1)).await);
    server.stop().await;
}

#[tokio::test]
async fn busy_client_is_still_cut_off_at_deadline() {
    let deadline = Duration::from_millis(400);
    let server = start_server(deadline, None).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();
    let started = Instant::now();

    let mut answered = 0;
    while client.call("echo", "ping").await.is_ok() {
        answered += 1;
        assert!(started.elapsed() < deadline + Duration::from_secs(1));
    }
    assert!(answered > 0);

    assert!(server.tracker.wait_for_drain(Duration::from_secs(1)).await);
    server.stop().await;
}

#[tokio::test]
async fn malformed_input_closes_without_response() {
    let server = start_server(Duration::from_secs(5), None).await;
    let mut client = RawClient::connect(server.addr).await;

    client.write(b"{\"route\": echo}").await;
    assert_eq!(client.next_line().await, None);

    assert!(server.tracker.wait_for_drain(Duration::from_secs(1)).await);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let server = start_server(Duration::from_secs(30), None).await;
    let mut client = RouteClient::connect(server.addr).await.unwrap();
    assert!(client.call("echo", "x").await.unwrap().is_ok());

    let tracker = server.tracker.clone();
    server.stop().await;

    assert!(tracker.wait_for_drain(Duration::from_secs(1)).await);
    assert!(client.call("echo", "y").await.is_err());
}
