//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the route table built at startup
//! - Look up the handler for a route name
//! - Turn every outcome (match, no match, handler failure) into a Response
//!
//! # Design Decisions
//! - Immutable after `build()` (shared via Arc, no locks on the hot path)
//! - O(1) lookup via HashMap
//! - Explicit failure Response for unknown routes rather than silence

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use crate::observability::metrics;
use crate::protocol::{Request, Response};

/// Failure raised inside a handler. Reported to the client as a `nok` Response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A field the handler needs was absent or empty.
    #[error("missing {0}")]
    Missing(&'static str),
}

/// Errors raised while building the route table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("route name must not be empty")]
    EmptyName,

    #[error("route {0:?} registered twice")]
    Duplicate(String),
}

/// Lookup miss.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown route: {0}")]
pub struct RouteNotFound(pub String);

/// Produces the message for a request's content.
///
/// Handlers only produce data; they never see the connection.
pub trait Handler: Send + Sync {
    fn handle(&self, content: &Value) -> Result<String, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Value) -> Result<String, HandlerError> + Send + Sync,
{
    fn handle(&self, content: &Value) -> Result<String, HandlerError> {
        self(content)
    }
}

/// Collects routes before the table is frozen.
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<String, Box<dyn Handler>>,
}

impl RouterBuilder {
    /// Register `handler` under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RouterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RouterError::EmptyName);
        }
        if self.routes.contains_key(&name) {
            return Err(RouterError::Duplicate(name));
        }
        self.routes.insert(name, Box::new(handler));
        Ok(self)
    }

    /// Freeze the table.
    pub fn build(self) -> Router {
        tracing::debug!(routes = self.routes.len(), "Route table built");
        Router {
            routes: self.routes,
        }
    }
}

/// Immutable mapping from route name to handler.
pub struct Router {
    routes: HashMap<String, Box<dyn Handler>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Find the handler registered for `name`.
    pub fn lookup(&self, name: &str) -> Result<&dyn Handler, RouteNotFound> {
        self.routes
            .get(name)
            .map(|h| h.as_ref())
            .ok_or_else(|| RouteNotFound(name.to_string()))
    }

    /// Run the request through its handler. Always yields a Response.
    pub fn dispatch(&self, request: &Request) -> Response {
        let start = Instant::now();

        if request.route.is_empty() {
            tracing::debug!("Request without route");
            let response = Response::failure("missing route");
            metrics::record_request("none", response.status(), start);
            return response;
        }

        let handler = match self.lookup(&request.route) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(route = %request.route, "No route matched");
                let response = Response::failure(e.to_string());
                metrics::record_request("unknown", response.status(), start);
                return response;
            }
        };

        let response = match handler.handle(&request.content) {
            Ok(message) => Response::ok(message),
            Err(e) => {
                tracing::debug!(route = %request.route, error = %e, "Handler failed");
                Response::failure(e.to_string())
            }
        };

        metrics::record_request(&request.route, response.status(), start);
        response
    }

    /// Registered route names, sorted.
    pub fn route_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_names())
            .finish()
    }
}
