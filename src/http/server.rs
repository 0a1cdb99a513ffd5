//! HTTP front end.
//!
//! # Responsibilities
//! - Expose the route table over HTTP (`POST /dispatch`)
//! - Report liveness (`GET /health`)
//! - Wire up middleware (admission, timeout, tracing)
//!
//! # Design Decisions
//! - Shares the Router and AdmissionController with the TCP server, so a
//!   client's quota covers both fronts
//! - Health checks are never throttled
//! - Dispatch outcomes are always 200; failure is carried in the Response body

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::http::middleware::admission_middleware;
use crate::lifecycle::shutdown::signalled;
use crate::lifecycle::Shutdown;
use crate::protocol::{Request, Response};
use crate::routing::Router as RouteTable;
use crate::security::admission::AdmissionController;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
}

/// HTTP server sharing the route table with the TCP sessions.
pub struct HttpServer {
    router: Router,
    config: HttpConfig,
}

impl HttpServer {
    pub fn new(
        config: HttpConfig,
        routes: Arc<RouteTable>,
        admission: Option<Arc<AdmissionController>>,
    ) -> Self {
        let router = Self::build_router(&config, AppState { routes }, admission);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &HttpConfig,
        state: AppState,
        admission: Option<Arc<AdmissionController>>,
    ) -> Router {
        let mut dispatch = Router::new().route("/dispatch", post(dispatch_handler));
        if let Some(admission) = admission {
            dispatch = dispatch.route_layer(middleware::from_fn_with_state(
                admission,
                admission_middleware,
            ));
        }

        Router::new()
            .merge(dispatch)
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.request_timeout_secs,
                    ))),
            )
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signalled(&mut shutdown_rx).await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    Json(request): Json<Request>,
) -> Json<Response> {
    Json(state.routes.dispatch(&request))
}

async fn health_handler() -> Json<Response> {
    Json(Response::ok("healthy"))
}
