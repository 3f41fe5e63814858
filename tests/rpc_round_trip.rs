//! End-to-end RPC over loopback TCP: typed stubs, server errors,
//! deadlines and oneway dispatch.

use keel_rpc::{rpc_client, CallContext, Client, RpcError, Server, ServiceStub};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GetByIdReq {
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GetByIdResp {
    msg: String,
}

rpc_client! {
    pub struct UserServiceClient: "user-service" {
        fn get_by_id(GetByIdReq) -> GetByIdResp;
        fn fail(GetByIdReq) -> GetByIdResp;
        fn slow(GetByIdReq) -> GetByIdResp;
        fn log_visit(GetByIdReq) -> GetByIdResp;
    }
}

async fn start_server(visits: Arc<AtomicUsize>) -> (String, watch::Sender<bool>) {
    let mut server = Server::new();
    server.register_service(
        ServiceStub::new("user-service")
            .method("get_by_id", |_ctx, req: GetByIdReq| async move {
                Ok::<_, String>(GetByIdResp {
                    msg: format!("user {}", req.id),
                })
            })
            .method("fail", |_ctx, _req: GetByIdReq| async move {
                Err::<GetByIdResp, _>("user not found".to_string())
            })
            .method("slow", |_ctx, req: GetByIdReq| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(GetByIdResp {
                    msg: format!("slow {}", req.id),
                })
            })
            .method("log_visit", move |_ctx, req: GetByIdReq| {
                let visits = Arc::clone(&visits);
                async move {
                    visits.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(GetByIdResp {
                        msg: format!("logged {}", req.id),
                    })
                }
            }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = server.serve_with_shutdown(listener, rx).await;
    });
    (addr, shutdown)
}

#[tokio::test]
async fn typed_stub_round_trips() {
    let (addr, _shutdown) = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Arc::new(Client::connect(&addr).await.unwrap());
    let users = UserServiceClient::new(client);

    let resp = users
        .get_by_id(&CallContext::new(), &GetByIdReq { id: 7 })
        .await
        .unwrap();
    assert_eq!(resp.msg, "user 7");
}

#[tokio::test]
async fn repeated_calls_reuse_the_connection() {
    let (addr, _shutdown) = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Arc::new(Client::connect(&addr).await.unwrap());
    let users = UserServiceClient::new(client);
    for id in 0..10u64 {
        let resp = users
            .get_by_id(&CallContext::new(), &GetByIdReq { id })
            .await
            .unwrap();
        assert_eq!(resp.msg, format!("user {id}"));
    }
}

#[tokio::test]
async fn server_errors_surface_as_error_bytes() {
    let (addr, _shutdown) = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Arc::new(Client::connect(&addr).await.unwrap());
    let users = UserServiceClient::new(client);

    let err = users
        .fail(&CallContext::new(), &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    match err {
        RpcError::Server(message) => assert_eq!(message, "user not found"),
        other => panic!("expected a server error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_service_is_a_server_error() {
    let (addr, _shutdown) = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::connect(&addr).await.unwrap();
    let err = client
        .invoke::<_, GetByIdResp>(&CallContext::new(), "nope", "method", &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Server(message) if message.contains("unknown service")));
}

#[tokio::test]
async fn deadline_metadata_bounds_the_server_side() {
    let (addr, _shutdown) = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Arc::new(Client::connect(&addr).await.unwrap());
    let users = UserServiceClient::new(client);

    let ctx = CallContext::new().with_timeout(Duration::from_millis(200));
    let err = users.slow(&ctx, &GetByIdReq { id: 1 }).await.unwrap_err();
    match err {
        RpcError::Server(message) => assert!(message.contains("deadline exceeded")),
        RpcError::Timeout => {}
        other => panic!("expected a deadline failure, got {other}"),
    }
}

mod registration {
    use super::*;
    use async_trait::async_trait;
    use keel_rpc::{Registry, RegistryEvent, ServiceInstance};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Just enough registry to observe the server's lifecycle calls.
    #[derive(Default)]
    struct MemoryRegistry {
        instances: Mutex<Vec<ServiceInstance>>,
        closed: Mutex<bool>,
    }

    #[async_trait]
    impl Registry for MemoryRegistry {
        async fn register(&self, instance: &ServiceInstance) -> Result<(), RpcError> {
            self.instances.lock().unwrap().push(instance.clone());
            Ok(())
        }

        async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RpcError> {
            self.instances
                .lock()
                .unwrap()
                .retain(|known| known.address != instance.address);
            Ok(())
        }

        async fn list_services(
            &self,
            service_name: &str,
        ) -> Result<Vec<ServiceInstance>, RpcError> {
            Ok(self
                .instances
                .lock()
                .unwrap()
                .iter()
                .filter(|instance| instance.name == service_name)
                .cloned()
                .collect())
        }

        async fn subscribe(
            &self,
            _service_name: &str,
        ) -> Result<mpsc::Receiver<RegistryEvent>, RpcError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn close(&self) -> Result<(), RpcError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn server_registers_on_start_and_closes_registry_on_shutdown() {
        let registry = Arc::new(MemoryRegistry::default());
        let mut server = Server::new();
        server.register_service(ServiceStub::new("user-service").method(
            "get_by_id",
            |_ctx, req: GetByIdReq| async move {
                Ok::<_, String>(GetByIdResp {
                    msg: format!("user {}", req.id),
                })
            },
        ));
        server.with_registry(
            "user-service",
            Arc::clone(&registry) as Arc<dyn Registry>,
            Duration::from_secs(1),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (shutdown, rx) = watch::channel(false);
        let serving = tokio::spawn(async move {
            let _ = server.serve_with_shutdown(listener, rx).await;
        });

        // The instance is discoverable while the server runs.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let listed = registry.list_services("user-service").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].address, addr);

        shutdown.send(true).unwrap();
        serving.await.unwrap();
        assert!(*registry.closed.lock().unwrap());
    }
}

#[tokio::test]
async fn oneway_returns_immediately_and_still_runs() {
    let visits = Arc::new(AtomicUsize::new(0));
    let (addr, _shutdown) = start_server(Arc::clone(&visits)).await;
    let client = Arc::new(Client::connect(&addr).await.unwrap());
    let users = UserServiceClient::new(client);

    let err = users
        .log_visit(&CallContext::new().oneway(), &GetByIdReq { id: 9 })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Oneway), "got {err}");

    // The server-side effect becomes observable within bounded time.
    let mut observed = false;
    for _ in 0..50 {
        if visits.load(Ordering::SeqCst) == 1 {
            observed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(observed, "oneway call never reached the method");
}
