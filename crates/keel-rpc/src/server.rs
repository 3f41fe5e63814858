//! The server side: connection loop and name-indexed dispatch.

use crate::message::{Request, Response};
use crate::registry::{Registry, ServiceInstance};
use crate::serialize::{decode_message, encode_message, JsonSerializer, Serializer};
use crate::{read_frame, CallContext, RpcError};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// A dispatchable method: decodes its argument with the request's
/// serializer, runs, and encodes the result. An `Err` carries the message
/// bytes for the response's error field.
type BoxMethod = Box<
    dyn Fn(CallContext, Vec<u8>, Arc<dyn Serializer>) -> BoxFuture<'static, Result<Vec<u8>, String>>
        + Send
        + Sync,
>;

/// A registered service: its name plus a method table.
///
/// Methods are typed async closures; registration is the monomorphization
/// point where argument and result types get wired to the byte-level
/// dispatch path.
pub struct ServiceStub {
    name: String,
    methods: HashMap<String, BoxMethod>,
}

impl ServiceStub {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `f` under `name`. The error type only needs to render
    /// itself; its message travels back in the response error bytes.
    pub fn method<Req, Resp, E, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: BoxMethod = Box::new(move |ctx, body, serializer| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let req: Req =
                    decode_message(serializer.as_ref(), &body).map_err(|err| err.to_string())?;
                match f(ctx, req).await {
                    Ok(resp) => {
                        encode_message(serializer.as_ref(), &resp).map_err(|err| err.to_string())
                    }
                    Err(err) => Err(err.to_string()),
                }
            })
        });
        self.methods.insert(name.to_string(), handler);
        self
    }
}

struct Registration {
    registry: Arc<dyn Registry>,
    service_name: String,
    timeout: Duration,
}

/// Accepts connections and dispatches frames onto registered stubs.
///
/// Each connection gets its own task that loops reading a frame,
/// dispatching it, and writing the response frame. The request's
/// `deadline` metadata bounds the method invocation; `one-way` requests
/// are answered immediately with the error `"oneway"` while the method
/// runs in a detached task.
pub struct Server {
    services: HashMap<String, ServiceStub>,
    serializers: HashMap<u8, Arc<dyn Serializer>>,
    registration: Option<Registration>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// A server with the JSON serializer pre-registered.
    pub fn new() -> Self {
        let mut server = Self {
            services: HashMap::new(),
            serializers: HashMap::new(),
            registration: None,
        };
        server.register_serializer(Arc::new(JsonSerializer));
        server
    }

    pub fn register_serializer(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(serializer.code(), serializer);
    }

    pub fn register_service(&mut self, stub: ServiceStub) {
        self.services.insert(stub.name.clone(), stub);
    }

    /// Publishes this server in `registry` under `service_name` once it
    /// is listening; the registry is closed before the listener on
    /// shutdown, so discovery stops handing out the address first.
    pub fn with_registry(
        &mut self,
        service_name: &str,
        registry: Arc<dyn Registry>,
        timeout: Duration,
    ) {
        self.registration = Some(Registration {
            registry,
            service_name: service_name.to_string(),
            timeout,
        });
    }

    pub async fn start(self, addr: &str) -> Result<(), RpcError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RpcError> {
        let (_tx, rx) = watch::channel(false);
        self.serve_with_shutdown(listener, rx).await
    }

    /// Serves until the listener fails or `shutdown` fires.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RpcError> {
        if let Some(registration) = &self.registration {
            let instance = ServiceInstance {
                name: registration.service_name.clone(),
                address: listener.local_addr()?.to_string(),
                weight: 1,
            };
            tokio::time::timeout(registration.timeout, registration.registry.register(&instance))
                .await
                .map_err(|_| RpcError::Timeout)??;
            tracing::info!(service = %instance.name, address = %instance.address, "registered instance");
        }

        tracing::info!(addr = %listener.local_addr()?, "rpc server listening");
        let server = Arc::new(self);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => {
                    let (conn, peer) = accepted?;
                    tracing::debug!(%peer, "accepted connection");
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_conn(conn).await {
                            tracing::debug!(%peer, error = %err, "connection closed");
                        }
                    });
                }
            }
        }

        if let Some(registration) = &server.registration {
            if let Err(err) = registration.registry.close().await {
                tracing::warn!(error = %err, "registry close failed");
            }
        }
        Ok(())
    }

    async fn handle_conn(self: Arc<Self>, mut conn: TcpStream) -> Result<(), RpcError> {
        loop {
            let data = read_frame(&mut conn).await?;
            let req = Request::decode(&data)?;
            let ctx = CallContext::from_meta(&req.meta);

            let mut response = if ctx.is_oneway() {
                let mut response = Response::for_request(&req);
                response.set_error("oneway");
                let server = Arc::clone(&self);
                tokio::spawn(async move {
                    let service = req.service_name.clone();
                    let method = req.method_name.clone();
                    let result = server.invoke(ctx, req).await;
                    if !result.error.is_empty() {
                        tracing::warn!(
                            %service,
                            %method,
                            error = %String::from_utf8_lossy(&result.error),
                            "oneway dispatch failed"
                        );
                    }
                });
                response
            } else {
                self.invoke(ctx, req).await
            };

            response.finalize();
            conn.write_all(&response.encode()).await?;
        }
    }

    /// Runs one request to a response. Dispatch failures of any kind
    /// (unknown names, codec trouble, the method's own error, a blown
    /// deadline) land in the response's error bytes; the body stays empty
    /// in that case.
    pub async fn invoke(&self, ctx: CallContext, req: Request) -> Response {
        let mut response = Response::for_request(&req);
        match self.dispatch(&ctx, &req).await {
            Ok(body) => response.body = body,
            Err(message) => response.set_error(message),
        }
        response
    }

    async fn dispatch(&self, ctx: &CallContext, req: &Request) -> Result<Vec<u8>, String> {
        let stub = self
            .services
            .get(&req.service_name)
            .ok_or_else(|| RpcError::UnknownService(req.service_name.clone()).to_string())?;
        let method = stub.methods.get(&req.method_name).ok_or_else(|| {
            RpcError::UnknownMethod(req.service_name.clone(), req.method_name.clone()).to_string()
        })?;
        let serializer = self
            .serializers
            .get(&req.serializer)
            .ok_or_else(|| RpcError::UnknownSerializer(req.serializer).to_string())?;

        let invocation = method(ctx.clone(), req.body.clone(), Arc::clone(serializer));
        match ctx.remaining() {
            Some(remaining) => tokio::time::timeout(remaining, invocation)
                .await
                .map_err(|_| "rpc: deadline exceeded".to_string())?,
            None => invocation.await,
        }
    }
}
