//! Admission middleware for the HTTP front end.
//!
//! Applies the same per-client counter the TCP sessions use, keyed by peer IP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::security::admission::AdmissionController;

/// Body of the 429 response.
pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";

pub async fn admission_middleware(
    State(admission): State<Arc<AdmissionController>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = addr.ip().to_string();

    if admission.admit(&client).is_allowed() {
        return next.run(request).await;
    }

    tracing::debug!(client = %client, path = %request.uri().path(), "Request throttled");
    (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS).into_response()
}
