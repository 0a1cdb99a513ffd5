//! HTTP front end sharing state with the TCP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use route_server::client::RouteClient;
use route_server::config::HttpConfig;
use route_server::http::HttpServer;
use route_server::lifecycle::Shutdown;
use route_server::protocol::{Request, Response};
use route_server::routing::default_router;
use route_server::security::AdmissionController;
use tokio::net::TcpListener;

mod common;

async fn start_http(admission: Option<Arc<AdmissionController>>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(
        HttpConfig {
            enabled: true,
            bind_address: addr.to_string(),
            request_timeout_secs: 5,
        },
        Arc::new(default_router().unwrap()),
        admission,
    );
    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move { server.run(listener, &signal).await });
    (addr, shutdown)
}

#[tokio::test]
async fn dispatch_returns_router_response() {
    let (addr, shutdown) = start_http(None).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("http://{}/dispatch", addr))
        .json(&Request::new("salam", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.json::<Response>().await.unwrap(),
        Response::failure("unknown route: salam")
    );

    shutdown.trigger();
}

#[tokio::test]
async fn quota_spans_tcp_and_http() {
    let admission = Arc::new(AdmissionController::new(3, Duration::from_secs(60)));
    let tcp = common::start_server(Duration::from_secs(5), Some(Arc::clone(&admission))).await;
    let (http_addr, http_shutdown) = start_http(Some(Arc::clone(&admission))).await;

    let mut tcp_client = RouteClient::connect(tcp.addr).await.unwrap();
    assert!(tcp_client.call("echo", 1).await.unwrap().is_ok());
    assert!(tcp_client.call("echo", 2).await.unwrap().is_ok());

    let http = reqwest::Client::new();
    let url = format!("http://{}/dispatch", http_addr);
    let res = http.post(&url).json(&Request::new("echo", 3)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = http.post(&url).json(&Request::new("echo", 4)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        tcp_client.call("echo", 5).await.unwrap(),
        Response::failure("too many requests")
    );

    http_shutdown.trigger();
    tcp.stop().await;
}
