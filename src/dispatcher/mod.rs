//! The per-request pipeline.
//!
//! [`Dispatcher::dispatch`] takes one [`Request`] through a fixed sequence of stages:
//!
//! 1. route lookup on the query-stripped path (404 on a miss);
//! 2. query parsing and merge, with path parameters overriding query parameters;
//! 3. query validation, when the route has a query validator;
//! 4. body read and JSON parse, for POST, PUT and PATCH only;
//! 5. body validation, when the route has a body validator;
//! 6. the composed middleware, when the route has any;
//! 7. the handler;
//! 8. JSON serialization with the status set during 6 or 7, or 200.
//!
//! The first failing stage ends the pipeline. Its error is rendered as the JSON
//! error body of [`MuzuException`] and nothing from later stages runs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::context::Context;
use crate::error::{BoxError, MuzuException};
use crate::http::{Body, Request, RequestError, Response, StatusCode};
use crate::router::{RouteManager, RouteMatch};

/// Message of the 400 returned when a body cannot be read or parsed.
pub const BODY_PARSE_ERROR: &str = "Error parsing body";
pub const QUERY_VALIDATION_FAILED: &str = "Query validation failed";
pub const BODY_VALIDATION_FAILED: &str = "Body validation failed";

/// Runs requests against a populated [`RouteManager`].
///
/// The route table is only read from here on, so one dispatcher can serve any number
/// of concurrent requests. Clones share the same table.
///
/// # Examples
///
/// ```rust
/// use muzu::dispatcher::Dispatcher;
/// use muzu::http::{Method, Request, StatusCode};
/// use muzu::router::{Handler, Route, RouteManager};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut routes = RouteManager::new();
/// routes.insert(Route::get(
///     "/users/:id",
///     Handler::from_sync(|ctx| Ok(json!({ "id": ctx.param("id") }))),
/// ));
/// let dispatcher = Dispatcher::new(routes);
///
/// let response = dispatcher.dispatch(Request::new(Method::Get, "/users/42")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.body_json().unwrap(), json!({ "id": "42" }));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<RouteManager>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(routes: RouteManager) -> Self {
        Self::with_config(routes, DispatcherConfig::default())
    }

    pub fn with_config(routes: RouteManager, config: DispatcherConfig) -> Self {
        Self {
            routes: Arc::new(routes),
            config,
        }
    }

    pub fn routes(&self) -> &RouteManager {
        &self.routes
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs `request` through the pipeline. Never fails: every error becomes a JSON
    /// error response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_owned();

        let response = match self.run(request).await {
            Ok(response) => response,
            Err(exception) => {
                let status = exception.status();
                if status.is_server_error() {
                    error!(%method, %path, status = status.as_u16(), message = exception.message(), "request failed");
                } else {
                    warn!(%method, %path, status = status.as_u16(), message = exception.message(), "request rejected");
                }
                exception.into_response()
            }
        };

        info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed = ?started.elapsed(),
            "request dispatched"
        );
        response
    }

    async fn run(&self, request: Request) -> Result<Response, MuzuException> {
        let (parts, body) = request.into_parts();
        let path = parts.url.split_once('?').map_or(parts.url.as_str(), |(p, _)| p);

        let RouteMatch {
            metadata,
            params: path_params,
        } = self
            .routes
            .find(&parts.method, path)
            .ok_or_else(|| MuzuException::not_found(&parts.method, path))?;
        debug!(method = %parts.method, route = metadata.path(), "route matched");

        let (_, query) = metadata.parser().parse(&parts.url);
        let mut params = query.clone();
        params.merge(&path_params);

        if let Some(validator) = metadata.query_validator() {
            let errors = validator.validate(&params.to_value());
            if !errors.is_empty() {
                return Err(MuzuException::validation(QUERY_VALIDATION_FAILED, errors));
            }
        }

        let mut ctx = Context::new(parts.method, parts.url, parts.headers);
        ctx.set_params(query, params);

        if metadata.requires_body() {
            let body = read_json(body, self.config.max_body_size).await?;
            if let Some(validator) = metadata.body_validator() {
                let errors = validator.validate(&body);
                if !errors.is_empty() {
                    return Err(MuzuException::validation(BODY_VALIDATION_FAILED, errors));
                }
            }
            ctx.set_body(body);
        }

        if let Some(middleware) = metadata.middleware() {
            guarded("middleware", middleware.run(&mut ctx)).await?;
        }

        let value = guarded("handler", metadata.handler().call(&mut ctx)).await?;

        let status = ctx.status().unwrap_or(StatusCode::Ok);
        Ok(Response::json(status, &value))
    }
}

/// Awaits one user-supplied stage. Errors are classified; a panic becomes a 500.
async fn guarded<T>(
    stage: &'static str,
    fut: impl Future<Output = Result<T, BoxError>>,
) -> Result<T, MuzuException> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(MuzuException::classify),
        Err(panic) => {
            error!(stage, panic = panic_message(&*panic), "stage panicked");
            Err(MuzuException::internal())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Drains `body` and parses it as JSON. Blank bodies read as `{}`.
async fn read_json(body: Body, limit: usize) -> Result<Value, MuzuException> {
    let bytes = match body.collect(limit).await {
        Ok(bytes) => bytes,
        Err(RequestError::BodyTooLarge { max_bytes }) => {
            return Err(MuzuException::payload_too_large(max_bytes));
        }
        Err(err) => {
            debug!(error = %err, "request body could not be read");
            return Err(MuzuException::bad_request(BODY_PARSE_ERROR));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_slice(&bytes).map_err(|err| {
        debug!(error = %err, "request body is not valid JSON");
        MuzuException::bad_request(BODY_PARSE_ERROR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::middleware::Middleware;
    use crate::router::{Handler, Route};
    use crate::validation::{Dto, Rule};
    use serde_json::json;

    struct User(&'static str);

    fn dispatcher(routes: impl IntoIterator<Item = Route>) -> Dispatcher {
        let mut manager = RouteManager::new();
        manager.insert_all(routes);
        Dispatcher::new(manager)
    }

    fn echo_body() -> Handler {
        Handler::from_sync(|ctx| Ok(ctx.body().cloned().unwrap_or(Value::Null)))
    }

    fn echo_params() -> Handler {
        Handler::from_sync(|ctx| Ok(ctx.params().to_value()))
    }

    #[tokio::test]
    async fn empty_body_reads_as_empty_object() {
        let d = dispatcher([Route::post("/echo", echo_body())]);
        for body in ["", "  \r\n"] {
            let res = d.dispatch(Request::new(Method::Post, "/echo").body(body)).await;
            assert_eq!(res.status(), StatusCode::Ok);
            assert_eq!(res.body_json().unwrap(), json!({}));
        }
    }

    #[tokio::test]
    async fn streamed_body_is_parsed() {
        let d = dispatcher([Route::put("/echo", echo_body())]);
        let reader = std::io::Cursor::new(br#"{"name":"ada"}"#.to_vec());
        let res = d
            .dispatch(Request::new(Method::Put, "/echo").body_stream(reader))
            .await;
        assert_eq!(res.body_json().unwrap(), json!({ "name": "ada" }));
    }

    #[tokio::test]
    async fn get_never_reads_the_body() {
        let d = dispatcher([Route::get("/echo", echo_body())]);
        let res = d
            .dispatch(Request::new(Method::Get, "/echo").body("not json"))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_json().unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut manager = RouteManager::new();
        manager.insert(Route::post("/echo", echo_body()));
        let d = Dispatcher::with_config(manager, DispatcherConfig { max_body_size: 8 });

        let res = d
            .dispatch(Request::new(Method::Post, "/echo").body(r#"{"a":"0123456789"}"#))
            .await;
        assert_eq!(res.status(), StatusCode::PayloadTooLarge);
        let body = res.body_json().unwrap();
        assert_eq!(body["kind"], "PayloadTooLargeException");
        assert_eq!(body["details"]["max_bytes"], 8);
    }

    #[tokio::test]
    async fn query_params_are_skipped_when_disabled() {
        let d = dispatcher([
            Route::get("/on/:id", echo_params()),
            Route::get("/off/:id", echo_params()).has_query_params(false),
        ]);

        let on = d.dispatch(Request::new(Method::Get, "/on/1?page=2")).await;
        assert_eq!(on.body_json().unwrap(), json!({ "id": "1", "page": "2" }));

        let off = d.dispatch(Request::new(Method::Get, "/off/1?page=2")).await;
        assert_eq!(off.body_json().unwrap(), json!({ "id": "1" }));
    }

    #[tokio::test]
    async fn query_validation_runs_before_the_body_is_read() {
        let d = dispatcher([Route::post("/search", echo_body())
            .query_validator(Dto::new("Search").field("q", [Rule::IsRequired]))]);

        let res = d
            .dispatch(Request::new(Method::Post, "/search").body("{broken"))
            .await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        let body = res.body_json().unwrap();
        assert_eq!(body["message"], QUERY_VALIDATION_FAILED);
        assert_eq!(body["errors"][0]["field"], "q");
        assert_eq!(body["errors"][0]["constraint"], "isRequired");
    }

    #[tokio::test]
    async fn body_validation_failure_lists_errors() {
        let d = dispatcher([Route::post("/users", echo_body()).body_validator(
            Dto::new("CreateUser").field("name", [Rule::IsString, Rule::MinLength(3)]),
        )]);

        let res = d
            .dispatch(Request::new(Method::Post, "/users").body(r#"{"name":"ab"}"#))
            .await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        let body = res.body_json().unwrap();
        assert_eq!(body["kind"], "ValidationException");
        assert_eq!(body["message"], BODY_VALIDATION_FAILED);
        assert_eq!(body["errors"][0]["constraint"], "minLength");
        assert_eq!(body["errors"][0]["value"], "ab");
    }

    #[tokio::test]
    async fn middleware_state_and_status_reach_the_handler() {
        let auth = Middleware::from_async(|ctx| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                ctx.extensions_mut().insert(User("ada"));
                Ok(())
            })
        });
        let created = Middleware::from_fn(|ctx| {
            ctx.set_status(StatusCode::Created);
            Ok(())
        });
        let handler = Handler::from_sync(|ctx| {
            let user = ctx.extensions().get::<User>().map(|u| u.0);
            Ok(json!({ "user": user }))
        });
        let d = dispatcher([Route::post("/posts", handler).middlewares([auth, created])]);

        let res = d.dispatch(Request::new(Method::Post, "/posts")).await;
        assert_eq!(res.status(), StatusCode::Created);
        assert_eq!(res.body_json().unwrap(), json!({ "user": "ada" }));
    }

    #[tokio::test]
    async fn middleware_exception_keeps_its_status_and_skips_the_handler() {
        let deny = Middleware::from_fn(|_ctx| {
            Err(MuzuException::forbidden("No access").with_details(json!({ "role": "guest" })).into())
        });
        let handler = Handler::from_sync(|_ctx| panic!("handler must not run"));
        let d = dispatcher([Route::get("/admin", handler).middleware(deny)]);

        let res = d.dispatch(Request::new(Method::Get, "/admin")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert_eq!(
            res.body_json().unwrap(),
            json!({
                "kind": "ForbiddenException",
                "status": 403,
                "message": "No access",
                "details": { "role": "guest" }
            })
        );
    }

    async fn load(ctx: &mut Context) -> Result<Value, BoxError> {
        tokio::task::yield_now().await;
        let id: u32 = ctx.param("id").unwrap_or_default().parse()?;
        Ok(json!({ "id": id }))
    }

    #[tokio::test]
    async fn async_handler_is_awaited_and_foreign_errors_become_500() {
        let d = dispatcher([Route::get(
            "/items/:id",
            Handler::from_async(|ctx| Box::pin(load(ctx))),
        )]);

        let ok = d.dispatch(Request::new(Method::Get, "/items/5")).await;
        assert_eq!(ok.body_json().unwrap(), json!({ "id": 5 }));

        let bad = d.dispatch(Request::new(Method::Get, "/items/five")).await;
        assert_eq!(bad.status(), StatusCode::InternalServerError);
        assert_eq!(bad.body_json().unwrap()["message"], "Internal server error");
    }

    async fn explode(_ctx: &mut Context) -> Result<Value, BoxError> {
        tokio::task::yield_now().await;
        panic!("boom")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_500() {
        let d = dispatcher([
            Route::get("/sync", Handler::from_sync(|_ctx| panic!("boom"))),
            Route::get("/async", Handler::from_async(|ctx| Box::pin(explode(ctx)))),
        ]);

        for url in ["/sync", "/async"] {
            let res = d.dispatch(Request::new(Method::Get, url)).await;
            assert_eq!(res.status(), StatusCode::InternalServerError);
            assert_eq!(
                res.body_json().unwrap(),
                json!({
                    "kind": "InternalServerErrorException",
                    "status": 500,
                    "message": "Internal server error"
                })
            );
        }
    }

    #[tokio::test]
    async fn panicking_middleware_becomes_500_and_skips_the_handler() {
        let boom = Middleware::from_fn(|_ctx| std::panic::panic_any(String::from("middleware boom")));
        let handler = Handler::from_sync(|_ctx| Ok(json!("unreachable")));
        let d = dispatcher([Route::get("/guarded", handler).middleware(boom)]);

        let res = d.dispatch(Request::new(Method::Get, "/guarded")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        assert_eq!(res.body_json().unwrap()["message"], "Internal server error");
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }

    #[tokio::test]
    async fn every_response_is_json() {
        let d = dispatcher([Route::get("/", Handler::from_sync(|_ctx| Ok(json!("hi"))))]);
        for url in ["/", "/missing"] {
            let res = d.dispatch(Request::new(Method::Get, url)).await;
            assert_eq!(res.headers().get("content-type"), Some("application/json"));
        }
    }
}
