//! The HTTP server: accept loop and request dispatch.

use crate::context::Context;
use crate::middleware::{chain, flush_wrap, not_found_endpoint, HandleFunc, Middleware};
use crate::router::Router;
use crate::template::TemplateEngine;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

/// HTTP server over the route trie.
///
/// Routes and middlewares are registered up front; [`HttpServer::start`]
/// then treats the table as read-only, handling each connection in its
/// own task.
pub struct HttpServer {
    router: Router,
    template_engine: Option<Arc<dyn TemplateEngine>>,
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServer {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            template_engine: None,
        }
    }

    /// Installs the engine [`Context::render`] consults.
    pub fn template_engine(&mut self, engine: Arc<dyn TemplateEngine>) {
        self.template_engine = Some(engine);
    }

    /// Full-control registration: optional handler plus node middlewares.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        handler: Option<HandleFunc>,
        middlewares: Vec<Middleware>,
    ) {
        self.router.add_route(method, path, handler, middlewares);
    }

    /// Attaches middleware to a path without registering a handler.
    pub fn use_middleware(&mut self, method: Method, path: &str, middleware: Middleware) {
        self.router.add_route(method, path, None, vec![middleware]);
    }

    pub fn get(&mut self, path: &str, handler: HandleFunc) {
        self.route(Method::GET, path, Some(handler), Vec::new());
    }

    pub fn post(&mut self, path: &str, handler: HandleFunc) {
        self.route(Method::POST, path, Some(handler), Vec::new());
    }

    pub fn put(&mut self, path: &str, handler: HandleFunc) {
        self.route(Method::PUT, path, Some(handler), Vec::new());
    }

    pub fn delete(&mut self, path: &str, handler: HandleFunc) {
        self.route(Method::DELETE, path, Some(handler), Vec::new());
    }

    pub async fn start(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "http server listening");
        let server = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });
                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(%peer, error = %err, "connection ended");
                }
            });
        }
    }

    /// Runs one request through routing, the aggregated middleware chain
    /// and the flush step. Usable directly in tests; the server loop is
    /// just plumbing around it.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::debug!(error = %err, "failed to read request body");
                return plain_response(StatusCode::BAD_REQUEST);
            }
        };

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let mut ctx = Context::new(parts, body, self.template_engine.clone());

        match self.router.find_route(&method, &path) {
            None => {
                ctx.resp_status_code = StatusCode::NOT_FOUND;
                ctx.into_response()
            }
            Some(matched) => {
                ctx.path_params = matched.params;
                ctx.matched_route = Some(matched.matched_route);
                // No handler on the matched node still runs the
                // aggregated middlewares around a 404.
                let endpoint = matched.handler.unwrap_or_else(not_found_endpoint);
                let root = chain(&matched.middlewares, flush_wrap(endpoint));
                root(ctx).await.into_response()
            }
        }
    }
}

fn plain_response(status: StatusCode) -> http::Response<Full<Bytes>> {
    http::Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("statically valid response")
}
