//! # muzu
//!
//! An in-process HTTP router and dispatch pipeline: per-method routing tries with
//! backtracking, compiled query parsers and validators, composed middleware, and a
//! fail-fast request dispatcher that always answers in JSON.
//!
//! Transport is left to the caller. Hand the dispatcher one [`Request`] per inbound
//! message and write back the [`Response`] it returns.
//!
//! ## Quick Start
//!
//! ```rust
//! use muzu::dispatcher::Dispatcher;
//! use muzu::http::{Method, Request, StatusCode};
//! use muzu::router::{Handler, Route, RouteManager};
//! use muzu::validation::{Dto, Rule};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut routes = RouteManager::new();
//! routes.insert(
//!     Route::post("/users", Handler::from_sync(|ctx| Ok(json!({ "created": ctx.body() }))))
//!         .body_validator(Dto::new("CreateUser").field("name", [Rule::IsString, Rule::MinLength(3)])),
//! );
//! let dispatcher = Dispatcher::new(routes);
//!
//! let ok = dispatcher
//!     .dispatch(Request::new(Method::Post, "/users").body(r#"{"name":"ada"}"#))
//!     .await;
//! assert_eq!(ok.status(), StatusCode::Ok);
//!
//! let rejected = dispatcher
//!     .dispatch(Request::new(Method::Post, "/users").body(r#"{"name":"al"}"#))
//!     .await;
//! assert_eq!(rejected.status(), StatusCode::BadRequest);
//! # }
//! ```

use std::pin::Pin;

// ── Pipeline ──────────────────────────────────────────────────────────────────
pub mod dispatcher;
pub mod middleware;
pub mod router;
pub mod validation;

// ── Supporting types ──────────────────────────────────────────────────────────
pub mod config;
pub mod context;
pub mod error;
pub mod http;

/// A boxed, sendable future borrowing from `'a`, returned by async handlers and
/// middleware.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::DispatcherConfig;
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, MuzuException};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Middleware;
pub use router::{Handler, HandlerResult, Route, RouteManager};
