//! The immutable record attached to a trie leaf.

use super::Handler;
use super::Route;
use super::parser::PathParser;
use crate::http::Method;
use crate::middleware::{self, Middleware};
use crate::validation::{self, CompiledValidator, Dto};

/// Everything the dispatcher needs for one route, resolved at registration time.
#[derive(Debug)]
pub struct RouteMetadata {
    method: Method,
    path: String,
    handler: Handler,
    handler_name: Option<String>,
    middleware: Option<Middleware>,
    is_async: bool,
    requires_body: bool,
    has_query_params: bool,
    parser: PathParser,
    body_validator: Option<CompiledValidator>,
    query_validator: Option<CompiledValidator>,
}

impl RouteMetadata {
    /// Compiles a registration record: composes middleware, picks the parser, and
    /// compiles validators. A validator that fails to compile is left out and logged;
    /// the route itself is still registered.
    pub fn compile(route: Route) -> Self {
        let Route {
            method,
            url,
            handler,
            handler_name,
            middlewares,
            has_query_params,
            body_validator,
            query_validator,
        } = route;

        let has_query_params = has_query_params.unwrap_or(true);
        let body_validator = body_validator.and_then(|dto| compile_or_warn(&method, &url, "body", &dto));
        let query_validator =
            query_validator.and_then(|dto| compile_or_warn(&method, &url, "query", &dto));

        Self {
            is_async: handler.is_async(),
            requires_body: method.requires_body(),
            parser: PathParser::compile(has_query_params),
            middleware: middleware::compose(middlewares),
            has_query_params,
            method,
            path: url,
            handler,
            handler_name,
            body_validator,
            query_validator,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path as registered.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    /// The composed middleware, if any was registered.
    pub fn middleware(&self) -> Option<&Middleware> {
        self.middleware.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn requires_body(&self) -> bool {
        self.requires_body
    }

    pub fn has_query_params(&self) -> bool {
        self.has_query_params
    }

    pub fn parser(&self) -> PathParser {
        self.parser
    }

    pub fn body_validator(&self) -> Option<&CompiledValidator> {
        self.body_validator.as_ref()
    }

    pub fn query_validator(&self) -> Option<&CompiledValidator> {
        self.query_validator.as_ref()
    }
}

fn compile_or_warn(method: &Method, path: &str, source: &str, dto: &Dto) -> Option<CompiledValidator> {
    match validation::compile(dto) {
        Ok(validator) => Some(validator),
        Err(err) => {
            tracing::warn!(
                %method,
                path,
                validator = source,
                dto = dto.name(),
                error = %err,
                "validator failed to compile; route registered without it"
            );
            None
        }
    }
}
