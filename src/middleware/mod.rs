//! Route middleware and the registration-time composer.
//!
//! Middleware runs after parameter extraction, validation and body parsing, and
//! before the handler. Each middleware gets the same `&mut` [`Context`] the handler
//! will see, so it can attach [`Extensions`](crate::context::Extensions), set a
//! status, or abort the request by returning an error. A returned
//! [`MuzuException`](crate::error::MuzuException) keeps its own status; any other
//! error becomes a 500.
//!
//! ## Core types
//!
//! - [`Middleware`] — a synchronous or asynchronous step.
//! - [`compose`] — folds a route's middleware list into at most one step, once, at
//!   registration time.

use std::sync::Arc;

use crate::BoxFuture;
use crate::context::Context;
use crate::error::BoxError;

/// Outcome of a middleware step. `Err` aborts the pipeline.
pub type MiddlewareResult = Result<(), BoxError>;

type SyncFn = dyn Fn(&mut Context) -> MiddlewareResult + Send + Sync + 'static;
type AsyncFn =
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static;

/// A single middleware step.
///
/// Synchronous steps are called inline; the dispatcher only suspends for
/// asynchronous ones.
///
/// # Examples
///
/// ```rust
/// use muzu::error::MuzuException;
/// use muzu::middleware::Middleware;
///
/// let require_auth = Middleware::from_fn(|ctx| {
///     if ctx.headers().contains("authorization") {
///         Ok(())
///     } else {
///         Err(MuzuException::unauthorized("Missing credentials").into())
///     }
/// });
/// assert!(!require_auth.is_async());
/// ```
#[derive(Clone)]
pub enum Middleware {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Middleware {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> MiddlewareResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous step. The returned future may borrow the context.
    ///
    /// ```rust
    /// use muzu::middleware::Middleware;
    ///
    /// let audit = Middleware::from_async(|ctx| {
    ///     Box::pin(async move {
    ///         tracing::info!(path = %ctx.path(), "audited");
    ///         Ok(())
    ///     })
    /// });
    /// assert!(audit.is_async());
    /// ```
    pub fn from_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        Self::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Runs this step against `ctx`, awaiting only if it is asynchronous.
    pub async fn run(&self, ctx: &mut Context) -> MiddlewareResult {
        match self {
            Self::Sync(f) => f(ctx),
            Self::Async(f) => f(ctx).await,
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_async() {
            "Middleware::Async"
        } else {
            "Middleware::Sync"
        })
    }
}

async fn run_chain(chain: &[Middleware], ctx: &mut Context) -> MiddlewareResult {
    for middleware in chain {
        middleware.run(ctx).await?;
    }
    Ok(())
}

/// Folds `middlewares` into a single step.
///
/// - no middleware: `None`, and the dispatcher skips the stage entirely;
/// - one middleware: returned as-is, without wrapping;
/// - two or more: one step that runs them strictly in order and stops at the first
///   error. The result is synchronous when every member is.
pub fn compose(middlewares: Vec<Middleware>) -> Option<Middleware> {
    match middlewares.len() {
        0 => None,
        1 => middlewares.into_iter().next(),
        len => {
            let sync_steps: Vec<Arc<SyncFn>> = middlewares
                .iter()
                .filter_map(|m| match m {
                    Middleware::Sync(f) => Some(Arc::clone(f)),
                    Middleware::Async(_) => None,
                })
                .collect();

            if sync_steps.len() == len {
                return Some(Middleware::from_fn(move |ctx| {
                    for step in &sync_steps {
                        step(ctx)?;
                    }
                    Ok(())
                }));
            }

            let chain: Arc<[Middleware]> = middlewares.into();
            Some(Middleware::from_async(move |ctx| {
                let chain = Arc::clone(&chain);
                Box::pin(async move { run_chain(&chain, ctx).await })
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MuzuException;
    use crate::http::{Headers, Method, StatusCode};

    #[derive(Default)]
    struct Trail(Vec<&'static str>);

    fn ctx() -> Context {
        let mut ctx = Context::new(Method::Get, "/", Headers::new());
        ctx.extensions_mut().insert(Trail::default());
        ctx
    }

    fn trail(ctx: &Context) -> Vec<&'static str> {
        ctx.extensions().get::<Trail>().map(|t| t.0.clone()).unwrap_or_default()
    }

    fn mark(name: &'static str) -> Middleware {
        Middleware::from_fn(move |ctx| {
            if let Some(t) = ctx.extensions_mut().get_mut::<Trail>() {
                t.0.push(name);
            }
            Ok(())
        })
    }

    fn mark_async(name: &'static str) -> Middleware {
        Middleware::from_async(move |ctx| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                if let Some(t) = ctx.extensions_mut().get_mut::<Trail>() {
                    t.0.push(name);
                }
                Ok(())
            })
        })
    }

    fn fail(status: StatusCode) -> Middleware {
        Middleware::from_fn(move |_ctx| Err(MuzuException::new(status, "stop").into()))
    }

    #[test]
    fn empty_composes_to_none() {
        assert!(compose(Vec::new()).is_none());
    }

    #[test]
    fn single_is_returned_unwrapped() {
        let only = mark("a");
        let Middleware::Sync(original) = &only else {
            panic!("expected sync middleware");
        };
        let original = Arc::clone(original);
        match compose(vec![only]) {
            Some(Middleware::Sync(f)) => assert!(Arc::ptr_eq(&f, &original)),
            other => panic!("expected the same sync middleware, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sync_chain_runs_in_order_and_stays_sync() {
        let composed = compose(vec![mark("a"), mark("b"), mark("c")]).unwrap();
        assert!(!composed.is_async());

        let mut ctx = ctx();
        composed.run(&mut ctx).await.unwrap();
        assert_eq!(trail(&ctx), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mixed_chain_awaits_each_step_in_order() {
        let composed = compose(vec![mark("a"), mark_async("b"), mark("c")]).unwrap();
        assert!(composed.is_async());

        let mut ctx = ctx();
        composed.run(&mut ctx).await.unwrap();
        assert_eq!(trail(&ctx), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn first_error_stops_the_chain() {
        let composed =
            compose(vec![mark_async("a"), fail(StatusCode::Forbidden), mark("never")]).unwrap();

        let mut ctx = ctx();
        let err = composed.run(&mut ctx).await.unwrap_err();
        let err = MuzuException::classify(err);
        assert_eq!(err.status(), StatusCode::Forbidden);
        assert_eq!(trail(&ctx), vec!["a"]);
    }
}
