//! A lightweight HTTP framework around a four-priority route trie.
//!
//! Paths are registered segment by segment into a per-method trie whose
//! node kinds match in the order **static > regex > parametric >
//! wildcard**, with a trailing wildcard absorbing the rest of the path.
//! Each node can carry middlewares; a request runs every middleware on
//! every prefix node it could have reached, outermost first, around the
//! matched handler. Handlers never touch the socket: they fill the
//! [`Context`]'s deferred status and body, and the innermost flush step
//! commits them to the wire exactly once.
//!
//! # Examples
//!
//! ```no_run
//! use keel_web::{handler, HttpServer};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut server = HttpServer::new();
//! server.get("/user/:id", handler(|mut ctx| async move {
//!     let id = ctx.path_value("id").unwrap_or_default();
//!     ctx.resp_string(http::StatusCode::OK, format!("user {id}"));
//!     ctx
//! }));
//! server.start("127.0.0.1:8080").await.unwrap();
//! # }
//! ```

mod context;
mod error;
mod middleware;
mod router;
mod server;
mod template;
mod tree;

pub use context::Context;
pub use error::WebError;
pub use middleware::{handler, middleware, HandleFunc, HandlerFuture, Middleware};
pub use router::Router;
pub use server::HttpServer;
pub use template::TemplateEngine;
