//! A small RPC framework over length-prefixed binary frames.
//!
//! The pieces, leaves first:
//!
//! - [`message`]: the wire format. Requests and responses are
//!   self-delimiting frames whose first eight bytes carry the header and
//!   body lengths.
//! - [`Serializer`]: a byte-level codec table keyed by a one-byte code in
//!   the frame header, so each client can pick its own body encoding.
//! - [`Pool`]: persistent connections with FIFO handoff to blocked getters.
//! - [`Server`]: accepts connections, one task each, and dispatches frames
//!   onto registered service stubs by service and method name.
//! - [`Client`] and [`rpc_client!`]: a typed call-site over the transport;
//!   the macro expands a stub struct with one async method per operation.
//! - [`Registry`] and [`EtcdRegistry`]: service discovery with lease-backed
//!   liveness.
//!
//! Calls carry a [`CallContext`]: deadlines propagate to the server as the
//! `deadline` metadata entry (unix milliseconds) and fire-and-forget calls
//! set `one-way`, which makes the server answer immediately and run the
//! method in the background.

mod client;
mod context;
mod error;
mod frame;
pub mod message;
mod pool;
pub mod registry;
mod serialize;
mod server;

pub use client::{Client, ClientBuilder};
pub use context::CallContext;
pub use error::RpcError;
pub use frame::read_frame;
pub use pool::Pool;
pub use registry::{Registry, RegistryEvent, RegistryEventKind, ServiceInstance};
pub use registry::etcd::EtcdRegistry;
pub use serialize::{decode_message, encode_message, JsonSerializer, Serializer};
pub use server::{Server, ServiceStub};
