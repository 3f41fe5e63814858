//! Handler and middleware types.
//!
//! The context flows through the chain by value: a middleware runs its
//! "before" code, awaits the next step, then its "after" code, and hands
//! the context back up. The innermost step on every request is the flush,
//! which commits the deferred status and body into a response exactly
//! once; nothing downstream of a handler writes to the wire directly.

use crate::Context;
use http::StatusCode;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Context> + Send + 'static>>;

/// A request handler (or a composed chain of them).
pub type HandleFunc = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync>;

/// Wraps the next step of the chain.
pub type Middleware = Arc<dyn Fn(HandleFunc) -> HandleFunc + Send + Sync>;

/// Lifts an async function into a [`HandleFunc`].
pub fn handler<F, Fut>(f: F) -> HandleFunc
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Context> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Lifts a wrapping function into a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(HandleFunc) -> HandleFunc + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Composes `middlewares` around `endpoint`, first listed outermost.
pub(crate) fn chain(middlewares: &[Middleware], endpoint: HandleFunc) -> HandleFunc {
    let mut root = endpoint;
    for mw in middlewares.iter().rev() {
        root = mw(root);
    }
    root
}

/// The built-in innermost step: run the endpoint, then flush.
pub(crate) fn flush_wrap(endpoint: HandleFunc) -> HandleFunc {
    Arc::new(move |ctx| {
        let endpoint = Arc::clone(&endpoint);
        Box::pin(async move {
            let mut ctx = endpoint(ctx).await;
            ctx.flush();
            ctx
        })
    })
}

/// Endpoint used when a node matched but carries no handler.
pub(crate) fn not_found_endpoint() -> HandleFunc {
    handler(|mut ctx: Context| async move {
        ctx.resp_status_code = StatusCode::NOT_FOUND;
        ctx
    })
}
