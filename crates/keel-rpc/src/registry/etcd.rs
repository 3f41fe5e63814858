//! Lease-backed registry over etcd.

use super::{Registry, RegistryEvent, RegistryEventKind, ServiceInstance};
use crate::RpcError;
use async_trait::async_trait;
use etcd_client::{Client, EventType, GetOptions, PutOptions, WatchOptions};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const KEY_PREFIX: &str = "/micro";

/// Registry backed by an etcd cluster.
///
/// The session owns one lease; every registered instance is written under
/// it, so instances evaporate server-side if this process stops renewing.
/// A background task keeps the lease alive until [`Registry::close`].
pub struct EtcdRegistry {
    client: Client,
    lease_id: i64,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
}

impl EtcdRegistry {
    /// Grants a lease of `lease_ttl` seconds and starts renewing it at a
    /// third of that cadence.
    pub async fn new(client: Client, lease_ttl: i64) -> Result<Self, RpcError> {
        let mut lease_client = client.clone();
        let lease = lease_client.lease_grant(lease_ttl, None).await?;
        let lease_id = lease.id();

        let (mut keeper, mut responses) = lease_client.lease_keep_alive(lease_id).await?;
        let cadence = Duration::from_secs((lease_ttl as u64 / 3).max(1));
        let keep_alive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            loop {
                ticker.tick().await;
                if keeper.keep_alive().await.is_err() {
                    tracing::warn!(lease_id, "lease keep-alive send failed");
                    return;
                }
                match responses.message().await {
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        tracing::warn!(lease_id, "lease keep-alive stream ended");
                        return;
                    }
                }
            }
        });

        Ok(Self {
            client,
            lease_id,
            keep_alive: Mutex::new(Some(keep_alive)),
        })
    }

    /// Connects to the given endpoints and opens a session.
    pub async fn connect(endpoints: &[&str], lease_ttl: i64) -> Result<Self, RpcError> {
        let client = Client::connect(endpoints, None).await?;
        Self::new(client, lease_ttl).await
    }

    fn instance_key(instance: &ServiceInstance) -> String {
        format!("{KEY_PREFIX}/{}/{}", instance.name, instance.address)
    }

    fn service_prefix(service_name: &str) -> String {
        format!("{KEY_PREFIX}/{service_name}/")
    }

    /// Reconstructs an instance from a deleted key, where only the key
    /// survives.
    fn instance_from_key(key: &str) -> Option<ServiceInstance> {
        let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix('/')?;
        let (name, address) = rest.split_once('/')?;
        Some(ServiceInstance {
            name: name.to_string(),
            address: address.to_string(),
            weight: 0,
        })
    }
}

#[async_trait]
impl Registry for EtcdRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RpcError> {
        let value =
            serde_json::to_vec(instance).map_err(|err| RpcError::Encode(err.to_string()))?;
        let mut client = self.client.clone();
        client
            .put(
                Self::instance_key(instance),
                value,
                Some(PutOptions::new().with_lease(self.lease_id)),
            )
            .await?;
        Ok(())
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RpcError> {
        let mut client = self.client.clone();
        client.delete(Self::instance_key(instance), None).await?;
        Ok(())
    }

    async fn list_services(&self, service_name: &str) -> Result<Vec<ServiceInstance>, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .get(
                Self::service_prefix(service_name),
                Some(GetOptions::new().with_prefix()),
            )
            .await?;
        let mut instances = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            let instance: ServiceInstance = serde_json::from_slice(kv.value())
                .map_err(|err| RpcError::Decode(err.to_string()))?;
            instances.push(instance);
        }
        Ok(instances)
    }

    async fn subscribe(
        &self,
        service_name: &str,
    ) -> Result<mpsc::Receiver<RegistryEvent>, RpcError> {
        let mut client = self.client.clone();
        let (watcher, mut stream) = client
            .watch(
                Self::service_prefix(service_name),
                Some(WatchOptions::new().with_prefix()),
            )
            .await?;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            // Dropping the watcher cancels the server-side watch, so it
            // lives as long as the forwarding loop.
            let _watcher = watcher;
            while let Ok(Some(response)) = stream.message().await {
                for event in response.events() {
                    let Some(kv) = event.kv() else { continue };
                    let forwarded = match event.event_type() {
                        EventType::Put => serde_json::from_slice(kv.value()).ok().map(
                            |instance: ServiceInstance| RegistryEvent {
                                kind: RegistryEventKind::Added,
                                instance,
                            },
                        ),
                        EventType::Delete => kv
                            .key_str()
                            .ok()
                            .and_then(EtcdRegistry::instance_from_key)
                            .map(|instance| RegistryEvent {
                                kind: RegistryEventKind::Removed,
                                instance,
                            }),
                    };
                    if let Some(event) = forwarded {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), RpcError> {
        if let Some(handle) = self.keep_alive.lock().take() {
            handle.abort();
        }
        let mut client = self.client.clone();
        client.lease_revoke(self.lease_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ServiceInstance {
        ServiceInstance {
            name: "user-service".to_string(),
            address: "127.0.0.1:8081".to_string(),
            weight: 10,
        }
    }

    #[test]
    fn key_layout_is_slash_micro_name_address() {
        assert_eq!(
            EtcdRegistry::instance_key(&instance()),
            "/micro/user-service/127.0.0.1:8081"
        );
        assert_eq!(
            EtcdRegistry::service_prefix("user-service"),
            "/micro/user-service/"
        );
    }

    #[test]
    fn instance_survives_key_reconstruction() {
        let key = EtcdRegistry::instance_key(&instance());
        let rebuilt = EtcdRegistry::instance_from_key(&key).unwrap();
        assert_eq!(rebuilt.name, "user-service");
        assert_eq!(rebuilt.address, "127.0.0.1:8081");
    }

    #[test]
    fn instance_json_uses_capitalized_fields() {
        let encoded = serde_json::to_value(instance()).unwrap();
        assert_eq!(encoded["Name"], "user-service");
        assert_eq!(encoded["Address"], "127.0.0.1:8081");
        assert_eq!(encoded["Weight"], 10);
    }

    mod e2e {
        use super::super::*;
        use crate::registry::Registry;

        async fn registry() -> EtcdRegistry {
            let endpoint =
                std::env::var("ETCD_ENDPOINT").unwrap_or_else(|_| "127.0.0.1:2379".to_string());
            EtcdRegistry::connect(&[endpoint.as_str()], 30)
                .await
                .expect("etcd reachable")
        }

        #[tokio::test]
        #[ignore = "needs a running etcd (ETCD_ENDPOINT)"]
        async fn register_list_unregister() {
            let registry = registry().await;
            let instance = ServiceInstance {
                name: "keel-e2e".to_string(),
                address: "127.0.0.1:9999".to_string(),
                weight: 1,
            };
            registry.register(&instance).await.unwrap();
            let listed = registry.list_services("keel-e2e").await.unwrap();
            assert!(listed.contains(&instance));
            registry.unregister(&instance).await.unwrap();
            let listed = registry.list_services("keel-e2e").await.unwrap();
            assert!(!listed.contains(&instance));
            registry.close().await.unwrap();
        }

        #[tokio::test]
        #[ignore = "needs a running etcd (ETCD_ENDPOINT)"]
        async fn subscribe_sees_membership_changes() {
            let registry = registry().await;
            let mut events = registry.subscribe("keel-e2e-watch").await.unwrap();
            let instance = ServiceInstance {
                name: "keel-e2e-watch".to_string(),
                address: "127.0.0.1:9998".to_string(),
                weight: 1,
            };
            registry.register(&instance).await.unwrap();
            let added = events.recv().await.unwrap();
            assert_eq!(added.kind, RegistryEventKind::Added);
            assert_eq!(added.instance, instance);

            registry.unregister(&instance).await.unwrap();
            let removed = events.recv().await.unwrap();
            assert_eq!(removed.kind, RegistryEventKind::Removed);
            assert_eq!(removed.instance.address, instance.address);
            registry.close().await.unwrap();
        }
    }
}
