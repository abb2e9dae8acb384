//! Request routing: per-method tries mapping path patterns to compiled route metadata.
//!
//! Routes are plain [`Route`] records handed to a [`RouteManager`] during a
//! registration phase. Each record is compiled once into an immutable
//! [`RouteMetadata`] and attached to a leaf of the trie for its method. Lookups after
//! that are read-only.
//!
//! | Pattern          | Example match       | Captured params       |
//! |------------------|---------------------|-----------------------|
//! | `/users`         | `/USERS`            | *(none)*              |
//! | `/users/:id`     | `/users/42`         | `id → "42"`           |
//! | `/a/:x/c`        | `/a/b/c`            | `x → "b"`             |
//!
//! Static segments match case-insensitively and are preferred over a parametric
//! segment at the same depth. When the static branch cannot complete a match, the
//! parametric branch is still tried (backtracking).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::BoxFuture;
use crate::context::{Context, Params};
use crate::error::BoxError;
use crate::http::Method;
use crate::middleware::Middleware;
use crate::validation::Dto;

mod metadata;
mod node;
mod parser;
mod tree;

pub use metadata::RouteMetadata;
pub use node::{NodeKind, TrieNode};
pub use parser::PathParser;
pub use tree::{RouteEntry, RouteTree};

/// What a handler produces: the JSON response body, or an error.
///
/// Return a [`MuzuException`](crate::error::MuzuException) to choose the status;
/// any other error becomes a 500.
pub type HandlerResult = Result<Value, BoxError>;

type SyncHandlerFn = dyn Fn(&mut Context) -> HandlerResult + Send + Sync + 'static;
type AsyncHandlerFn =
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static;

/// A route handler.
///
/// Whether the dispatcher awaits it is fixed by the constructor, never guessed.
///
/// ```rust
/// use muzu::router::Handler;
/// use serde_json::json;
///
/// let hello = Handler::from_sync(|ctx| Ok(json!({ "id": ctx.param("id") })));
/// assert!(!hello.is_async());
///
/// let slow = Handler::from_async(|_ctx| Box::pin(async { Ok(json!("done")) }));
/// assert!(slow.is_async());
/// ```
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncHandlerFn>),
    Async(Arc<AsyncHandlerFn>),
}

impl Handler {
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn from_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    pub async fn call(&self, ctx: &mut Context) -> HandlerResult {
        match self {
            Self::Sync(f) => f(ctx),
            Self::Async(f) => f(ctx).await,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_async() {
            "Handler::Async"
        } else {
            "Handler::Sync"
        })
    }
}

/// A registration record, built by whatever discovers routes.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    url: String,
    handler: Handler,
    handler_name: Option<String>,
    middlewares: Vec<Middleware>,
    has_query_params: Option<bool>,
    body_validator: Option<Dto>,
    query_validator: Option<Dto>,
}

impl Route {
    pub fn new(method: Method, url: impl Into<String>, handler: Handler) -> Self {
        Self {
            method,
            url: url.into(),
            handler,
            handler_name: None,
            middlewares: Vec::new(),
            has_query_params: None,
            body_validator: None,
            query_validator: None,
        }
    }

    pub fn get(url: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Get, url, handler)
    }

    pub fn post(url: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Post, url, handler)
    }

    pub fn put(url: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Put, url, handler)
    }

    pub fn patch(url: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Patch, url, handler)
    }

    pub fn delete(url: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Delete, url, handler)
    }

    /// Appends one middleware; middleware runs in the order it was added.
    #[must_use]
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn middlewares(mut self, middlewares: impl IntoIterator<Item = Middleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Forces query parsing on or off. Unset, the query string is always parsed.
    #[must_use]
    pub fn has_query_params(mut self, enabled: bool) -> Self {
        self.has_query_params = Some(enabled);
        self
    }

    #[must_use]
    pub fn body_validator(mut self, dto: Dto) -> Self {
        self.body_validator = Some(dto);
        self
    }

    /// Rules checked against the merged path and query parameters (all strings).
    #[must_use]
    pub fn query_validator(mut self, dto: Dto) -> Self {
        self.query_validator = Some(dto);
        self
    }

    /// Name reported by introspection, e.g. `UserController::show`.
    #[must_use]
    pub fn handler_name(mut self, name: impl Into<String>) -> Self {
        self.handler_name = Some(name.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// The result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub metadata: Arc<RouteMetadata>,
    /// Path parameters bound by the match.
    pub params: Params,
}

/// The route table: one [`RouteTree`] per method.
///
/// Owned by the application. Populate it, then hand it to a
/// [`Dispatcher`](crate::dispatcher::Dispatcher), which only reads it.
///
/// # Examples
///
/// ```rust
/// use muzu::http::Method;
/// use muzu::router::{Handler, Route, RouteManager};
/// use serde_json::json;
///
/// let mut routes = RouteManager::new();
/// routes.insert(Route::get("/users/:id", Handler::from_sync(|_ctx| Ok(json!({})))));
///
/// let found = routes.find(&Method::Get, "/users/42").unwrap();
/// assert_eq!(found.params.get("id"), Some("42"));
/// assert!(routes.find(&Method::Post, "/users/42").is_none());
/// ```
#[derive(Debug, Default)]
pub struct RouteManager {
    trees: HashMap<Method, RouteTree>,
}

impl RouteManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `route`, replacing any route with the same method and path.
    pub fn insert(&mut self, route: Route) {
        tracing::debug!(method = %route.method(), path = route.url(), "registering route");
        self.trees
            .entry(route.method().clone())
            .or_default()
            .insert(route);
    }

    pub fn insert_all(&mut self, routes: impl IntoIterator<Item = Route>) {
        for route in routes {
            self.insert(route);
        }
    }

    /// Looks up `path`, which must not include a query string.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let (metadata, params) = self.trees.get(method)?.search(path)?;
        Some(RouteMatch { metadata, params })
    }

    /// Every registered route, grouped by method name in alphabetical order.
    pub fn routes(&self) -> Vec<RouteEntry> {
        let mut trees: Vec<(&Method, &RouteTree)> = self.trees.iter().collect();
        trees.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        trees.into_iter().flat_map(|(_, tree)| tree.routes()).collect()
    }

    pub fn len(&self) -> usize {
        self.trees.values().map(RouteTree::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registered route.
    pub fn reset(&mut self) {
        self.trees.clear();
    }
}
