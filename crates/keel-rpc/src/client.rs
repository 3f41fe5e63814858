//! The client side: typed invocation over pooled connections.

use crate::message::{Request, Response};
use crate::pool::{ConnFactory, Pool};
use crate::serialize::{decode_message, encode_message, JsonSerializer, Serializer};
use crate::{read_frame, CallContext, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Configures and connects a [`Client`].
pub struct ClientBuilder {
    addr: String,
    connect_timeout: Duration,
    initial_conns: usize,
    max_idle: usize,
    max_active: usize,
    max_idle_time: Duration,
    serializer: Arc<dyn Serializer>,
}

impl ClientBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            connect_timeout: Duration::from_secs(3),
            initial_conns: 1,
            max_idle: 10,
            max_active: 30,
            max_idle_time: Duration::from_secs(60),
            serializer: Arc::new(JsonSerializer),
        }
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn pool(mut self, initial: usize, max_idle: usize, max_active: usize) -> Self {
        self.initial_conns = initial;
        self.max_idle = max_idle;
        self.max_active = max_active;
        self
    }

    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    pub async fn build(self) -> Result<Client, RpcError> {
        let addr = self.addr.clone();
        let connect_timeout = self.connect_timeout;
        let factory: ConnFactory<TcpStream> = Arc::new(move || {
            let addr = addr.clone();
            Box::pin(async move {
                let conn = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
                    .await
                    .map_err(|_| RpcError::Timeout)??;
                Ok(conn)
            })
        });
        let pool = Pool::new(
            self.initial_conns,
            self.max_idle,
            self.max_active,
            self.max_idle_time,
            factory,
        )
        .await?;
        Ok(Client {
            pool,
            serializer: self.serializer,
            next_request_id: AtomicU32::new(1),
        })
    }
}

/// Issues calls against one remote address. Each in-flight call leases a
/// pooled connection and uses it synchronously: write one frame, read one
/// frame.
pub struct Client {
    pool: Pool<TcpStream>,
    serializer: Arc<dyn Serializer>,
    next_request_id: AtomicU32,
}

impl Client {
    /// Connects with default pool settings and the JSON serializer.
    pub async fn connect(addr: &str) -> Result<Self, RpcError> {
        ClientBuilder::new(addr).build().await
    }

    pub fn builder(addr: &str) -> ClientBuilder {
        ClientBuilder::new(addr)
    }

    /// Performs one call: encode the argument, frame it with service,
    /// method and context metadata, exchange frames, and decode the typed
    /// result. Server-reported errors come back as [`RpcError::Server`].
    ///
    /// With a oneway context the frame is written and
    /// [`RpcError::Oneway`] is returned without reading anything; the
    /// connection is retired since a response may still arrive on it.
    pub async fn invoke<Req, Resp>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        req: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = encode_message(self.serializer.as_ref(), req)?;
        let mut request = Request::new(service, method, self.serializer.code(), body);
        request.request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        ctx.apply_meta(&mut request.meta);
        request.finalize();

        let response = self.send(ctx, request.encode()).await?;
        if !response.error.is_empty() {
            return Err(RpcError::Server(
                String::from_utf8_lossy(&response.error).into_owned(),
            ));
        }
        decode_message(self.serializer.as_ref(), &response.body)
    }

    async fn send(&self, ctx: &CallContext, frame: Vec<u8>) -> Result<Response, RpcError> {
        if ctx.remaining() == Some(Duration::ZERO) {
            return Err(RpcError::Timeout);
        }
        let mut conn = self.pool.get(ctx.remaining()).await?;

        if let Err(err) = conn.write_all(&frame).await {
            self.pool.discard(conn);
            return Err(err.into());
        }

        if ctx.is_oneway() {
            // The server still answers oneway frames; retiring the
            // connection keeps that unread response from poisoning the
            // next lease.
            self.pool.discard(conn);
            return Err(RpcError::Oneway);
        }

        let read = async { read_frame(&mut conn).await };
        let result = match ctx.remaining() {
            Some(remaining) => match tokio::time::timeout(remaining, read).await {
                Ok(result) => result,
                Err(_) => {
                    self.pool.discard(conn);
                    return Err(RpcError::Timeout);
                }
            },
            None => read.await,
        };

        match result {
            Ok(data) => {
                self.pool.put(conn);
                Response::decode(&data)
            }
            Err(err) => {
                self.pool.discard(conn);
                Err(err)
            }
        }
    }

    /// Shuts down the connection pool.
    pub fn close(&self) {
        self.pool.close();
    }
}

/// Expands a typed client stub for one service: a struct holding an
/// [`Client`] and one async method per operation, each delegating to
/// [`Client::invoke`] with the method's name on the wire.
///
/// ```ignore
/// rpc_client! {
///     pub struct UserServiceClient: "user-service" {
///         fn get_by_id(GetByIdReq) -> GetByIdResp;
///     }
/// }
/// ```
#[macro_export]
macro_rules! rpc_client {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident : $service:literal {
            $( fn $method:ident($req:ty) -> $resp:ty; )*
        }
    ) => {
        $(#[$attr])*
        $vis struct $name {
            client: ::std::sync::Arc<$crate::Client>,
        }

        impl $name {
            $vis fn new(client: ::std::sync::Arc<$crate::Client>) -> Self {
                Self { client }
            }

            $(
                $vis async fn $method(
                    &self,
                    ctx: &$crate::CallContext,
                    req: &$req,
                ) -> ::std::result::Result<$resp, $crate::RpcError> {
                    self.client
                        .invoke(ctx, $service, stringify!($method), req)
                        .await
                }
            )*
        }
    };
}
