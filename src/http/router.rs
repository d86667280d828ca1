//! Path-based, exact-match request router. See spec §4.9.
//!
//! All `register` calls must complete before [`Router::freeze`] is called;
//! the routing table is read-only for the remainder of the process's life
//! (spec §5 "Http server registration"). `freeze` returns an `Arc<Router>`
//! so the same immutable table is shared across every accepted connection
//! without cloning the handler map per request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{HeaderMap, Method};

/// A decoded HTTP request handed to a registered handler. The body has
/// already been accumulated into a contiguous byte vector by the server
/// (spec §4.9's scatter `Buffer` is used for the accumulation itself, not
/// retained past this point — handlers work with plain bytes).
pub struct HandlerRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A handler's response, before hyper serializes it onto the wire.
pub struct HandlerResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type", "application/json".to_string())],
            body,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.headers.push((name, value));
        self
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: HandlerRequest) -> HandlerResponse;
}

/// Registration-time key. Method + exact path, no wildcards or params
/// (spec §4.9: "dispatch is exact-match with 404 on miss").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    method: Method,
    path: String,
}

/// Builder used during startup wiring; call [`RouterBuilder::register`] for
/// every `(method, path)` pair before [`RouterBuilder::freeze`].
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<RouteKey, Arc<dyn Handler>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        method: Method,
        path: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        self.routes.insert(
            RouteKey {
                method,
                path: path.into(),
            },
            handler,
        );
        self
    }

    /// Seals the routing table. After this call no further registration is
    /// possible; the returned [`Router`] is immutable for the rest of the
    /// process's life.
    pub fn freeze(self) -> Arc<Router> {
        Arc::new(Router {
            routes: self.routes,
        })
    }
}

pub struct Router {
    routes: HashMap<RouteKey, Arc<dyn Handler>>,
}

impl Router {
    /// Dispatches `request` to its registered handler, or synthesizes a 404
    /// if no `(method, path)` pair matches (spec §4.9).
    pub async fn dispatch(&self, request: HandlerRequest) -> HandlerResponse {
        let key = RouteKey {
            method: request.method.clone(),
            path: request.path.clone(),
        };
        match self.routes.get(&key) {
            Some(handler) => handler.handle(request).await,
            None => HandlerResponse::empty(404),
        }
    }
}
