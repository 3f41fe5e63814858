//! Error type for the RPC framework.

use thiserror::Error;

/// Errors surfaced by the codec, transport, pool and registry.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No service registered under this name.
    #[error("rpc: unknown service {0}")]
    UnknownService(String),

    /// The service exists but has no such method.
    #[error("rpc: unknown method {0}::{1}")]
    UnknownMethod(String, String),

    /// The frame named a serializer code nobody registered.
    #[error("rpc: unsupported serializer code {0}")]
    UnknownSerializer(u8),

    /// The frame violates the wire layout.
    #[error("rpc: malformed frame: {0}")]
    Frame(String),

    #[error("rpc: encode failed: {0}")]
    Encode(String),

    #[error("rpc: decode failed: {0}")]
    Decode(String),

    /// The remote method reported an error; these are its message bytes.
    #[error("rpc: server error: {0}")]
    Server(String),

    /// Returned by the client after writing a oneway frame. There is no
    /// result to process.
    #[error("rpc: oneway call, do not process the result")]
    Oneway,

    #[error("rpc: operation timed out")]
    Timeout,

    /// Pool construction rejected `initial > max_idle`.
    #[error("rpc: pool: initial connections cannot exceed max idle")]
    InvalidPoolConfig,

    #[error("rpc: connection pool is closed")]
    PoolClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("rpc: registry: {0}")]
    Registry(String),
}

impl From<etcd_client::Error> for RpcError {
    fn from(err: etcd_client::Error) -> Self {
        RpcError::Registry(err.to_string())
    }
}
