//! Service discovery contract.

pub mod etcd;

use crate::RpcError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One reachable copy of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    #[serde(rename = "Name")]
    pub name: String,
    /// The locator; everything else is advisory.
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Weight", default)]
    pub weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEventKind {
    Added,
    Removed,
}

/// A membership change under a watched service name.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub instance: ServiceInstance,
}

/// A service registry: instances come and go, and subscribers hear about
/// it. The reference backend keys liveness to a lease, so instances whose
/// owner stops renewing disappear on their own.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RpcError>;

    async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RpcError>;

    async fn list_services(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RpcError>;

    /// Streams membership events for `service_name` from now on.
    async fn subscribe(
        &self,
        service_name: &str,
    ) -> Result<mpsc::Receiver<RegistryEvent>, RpcError>;

    /// Releases the registry session; registered instances lapse with it.
    async fn close(&self) -> Result<(), RpcError>;
}
