// tests/integration/test_helpers.rs

//! Test helpers: scripted and loopback transports, pool builders, and a harness
//! that runs several cluster nodes in one process.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use triadstore::connection::RequestService;
use triadstore::core::TriadError;
use triadstore::core::cluster::{ClusterConfig, ClusterContext, ClusterServerConfig};
use triadstore::core::pool::{ConnectionPool, PoolConfig};
use triadstore::core::replication::{ReplicationConfig, ReplicationManager};
use triadstore::core::store::{MemoryStore, ObjectKey};
use triadstore::core::transport::{
    Connection, Connector, RequestBody, ResponseBody, RpcRequest, RpcResponse, TcpConnector,
};
use triadstore::server::serve;

/// The store every test node serves.
pub const STORE_ID: &str = "session";

// --- Scripted transport ---

/// How a `MockConnector` connection answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockReply {
    /// `Pong` for pings, `NotFound` for loads, `Ok` otherwise.
    #[default]
    Normal,
    Busy,
    /// Every call fails with a broken pipe.
    Fail,
    /// Calls never complete.
    Hang,
}

#[derive(Debug, Default)]
pub struct MockBehavior {
    pub opened: AtomicUsize,
    pub calls: AtomicUsize,
    pub refuse: AtomicBool,
    pub reply: Mutex<MockReply>,
}

/// A connector whose connections follow a shared, switchable script.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub behavior: Arc<MockBehavior>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connect attempts, successful or not.
    pub fn opened(&self) -> usize {
        self.behavior.opened.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.behavior.calls.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.behavior.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.behavior.reply.lock() = reply;
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _address: &str) -> std::io::Result<Box<dyn Connection>> {
        self.behavior.opened.fetch_add(1, Ordering::SeqCst);
        if self.behavior.refuse.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                ErrorKind::ConnectionRefused,
                "mock connection refused",
            ));
        }
        Ok(Box::new(MockConnection {
            behavior: self.behavior.clone(),
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    behavior: Arc<MockBehavior>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn call(&mut self, request: RpcRequest) -> Result<RpcResponse, TriadError> {
        self.behavior.calls.fetch_add(1, Ordering::SeqCst);
        let reply = *self.behavior.reply.lock();
        let body = match reply {
            MockReply::Normal => match request.body {
                RequestBody::Ping => ResponseBody::Pong,
                RequestBody::Load { .. } => ResponseBody::NotFound,
                _ => ResponseBody::Ok,
            },
            MockReply::Busy => ResponseBody::Busy,
            MockReply::Fail => {
                return Err(TriadError::from(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "mock broken pipe",
                )));
            }
            MockReply::Hang => return std::future::pending().await,
        };
        Ok(RpcResponse::new(request.id, body))
    }
}

// --- Pools ---

/// Pool settings without warmup, so the first success makes the pool ACTIVE.
pub fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        warmup_time: Duration::ZERO,
        ..PoolConfig::default()
    }
}

/// An initialised pool from `local` to `target` over the mock transport.
pub fn test_pool(config: PoolConfig, connector: &MockConnector) -> Arc<ConnectionPool> {
    let pool = Arc::new(ConnectionPool::new(
        "local",
        "target",
        "mock:1",
        config,
        Arc::new(connector.clone()),
    ));
    pool.init();
    pool
}

/// Moves a paused clock forward so millisecond deltas measured afterwards are exact.
pub async fn settle_clock() {
    tokio::time::advance(Duration::from_secs(1)).await;
}

// --- Loopback transport ---

/// Routes connections straight to the `RequestService` registered for an address.
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    services: Arc<Mutex<HashMap<String, Arc<RequestService>>>>,
}

impl LoopbackConnector {
    pub fn register(&self, address: &str, service: Arc<RequestService>) {
        self.services.lock().insert(address.to_string(), service);
    }

    /// Makes `address` refuse new connections.
    pub fn unregister(&self, address: &str) {
        self.services.lock().remove(address);
    }
}

impl fmt::Debug for LoopbackConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self.services.lock().keys().cloned().collect();
        f.debug_struct("LoopbackConnector")
            .field("addresses", &addresses)
            .finish()
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Connection>> {
        let service = self.services.lock().get(address).cloned().ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::ConnectionRefused,
                format!("nothing listens on {address}"),
            )
        })?;
        Ok(Box::new(LoopbackConnection { service }))
    }
}

struct LoopbackConnection {
    service: Arc<RequestService>,
}

impl fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackConnection")
            .field("node", &self.service.node_id())
            .finish()
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    async fn call(&mut self, request: RpcRequest) -> Result<RpcResponse, TriadError> {
        Ok(self.service.handle(request).await)
    }
}

/// Wraps a loopback transport, counting `Load` requests and delaying every call.
#[derive(Debug, Clone)]
pub struct CountingConnector {
    inner: LoopbackConnector,
    loads: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingConnector {
    pub fn new(inner: LoopbackConnector, delay: Duration) -> Self {
        Self {
            inner,
            loads: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }

    /// `Load` requests sent so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Connection>> {
        let inner = self.inner.connect(address).await?;
        Ok(Box::new(CountingConnection {
            inner,
            loads: self.loads.clone(),
            delay: self.delay,
        }))
    }
}

#[derive(Debug)]
struct CountingConnection {
    inner: Box<dyn Connection>,
    loads: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl Connection for CountingConnection {
    async fn call(&mut self, request: RpcRequest) -> Result<RpcResponse, TriadError> {
        if matches!(request.body, RequestBody::Load { .. }) {
            self.loads.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(self.delay).await;
        self.inner.call(request).await
    }
}

// --- Nodes ---

pub fn cluster_config(servers: &[(String, String)]) -> ClusterConfig {
    ClusterConfig {
        servers: servers
            .iter()
            .map(|(id, address)| ClusterServerConfig {
                id: id.clone(),
                address: address.clone(),
                pool: None,
            })
            .collect(),
    }
}

/// One cluster member: its cluster view, replication manager, local memory
/// store and RPC service.
pub struct TestNode {
    pub cluster: Arc<ClusterContext>,
    pub manager: Arc<ReplicationManager>,
    pub store: Arc<MemoryStore>,
    pub service: Arc<RequestService>,
}

impl TestNode {
    pub fn build(
        self_id: &str,
        servers: &[(String, String)],
        connector: Arc<dyn Connector>,
        replication: ReplicationConfig,
        max_idle_ms: u64,
        max_inflight: usize,
    ) -> Self {
        let cluster = Arc::new(
            ClusterContext::new(
                self_id,
                &cluster_config(servers),
                &fast_pool_config(),
                connector,
            )
            .expect("cluster context should build"),
        );
        let store = Arc::new(MemoryStore::new(STORE_ID));
        let mut manager = ReplicationManager::new(cluster.clone(), replication);
        manager.register_store(store.clone(), max_idle_ms);
        let manager = Arc::new(manager);
        let service = Arc::new(RequestService::new(self_id, manager.clone(), max_inflight));
        Self {
            cluster,
            manager,
            store,
            service,
        }
    }

    /// A node that is the only member of its cluster.
    pub fn single(max_idle_ms: u64) -> Self {
        Self::build(
            "solo",
            &[("solo".to_string(), "mock:solo".to_string())],
            Arc::new(MockConnector::new()),
            ReplicationConfig::default(),
            max_idle_ms,
            64,
        )
    }
}

/// `ids` as (id, loopback address) pairs.
pub fn loopback_servers(ids: &[&str]) -> Vec<(String, String)> {
    ids.iter()
        .map(|id| (id.to_string(), format!("loop:{id}")))
        .collect()
}

/// Builds one node per id, all connected through a shared loopback transport.
pub fn loopback_mesh(ids: &[&str]) -> (Vec<TestNode>, LoopbackConnector) {
    let connector = LoopbackConnector::default();
    let servers = loopback_servers(ids);
    let nodes = servers
        .iter()
        .map(|(id, address)| {
            let node = TestNode::build(
                id,
                &servers,
                Arc::new(connector.clone()),
                ReplicationConfig::default(),
                3 * 60 * 60 * 1000,
                64,
            );
            connector.register(address, node.service.clone());
            node
        })
        .collect();
    (nodes, connector)
}

/// Finds an object key whose primary owner is `server_id`.
pub fn key_with_primary(cluster: &ClusterContext, server_id: &str) -> ObjectKey {
    (0..10_000)
        .map(|i| ObjectKey::new(STORE_ID, format!("object-{i}")))
        .find(|key| {
            let hash = key.hash64();
            cluster
                .group_for(hash)
                .primary(cluster.owner_tag(hash))
                .id()
                == server_id
        })
        .expect("some key should map to every server")
}

/// Two nodes talking over real TCP. Node `b` answers with at most
/// `b_max_inflight` concurrent requests.
pub async fn tcp_pair(b_max_inflight: usize) -> (TestNode, TestNode, broadcast::Sender<()>) {
    let listener_a = TcpListener::bind("127.0.0.1:0").await.expect("bind a");
    let listener_b = TcpListener::bind("127.0.0.1:0").await.expect("bind b");
    let servers = vec![
        ("a".to_string(), listener_a.local_addr().unwrap().to_string()),
        ("b".to_string(), listener_b.local_addr().unwrap().to_string()),
    ];

    let hour_ms = 60 * 60 * 1000;
    let a = TestNode::build(
        "a",
        &servers,
        Arc::new(TcpConnector),
        ReplicationConfig::default(),
        hour_ms,
        64,
    );
    let b = TestNode::build(
        "b",
        &servers,
        Arc::new(TcpConnector),
        ReplicationConfig::default(),
        hour_ms,
        b_max_inflight,
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(serve(listener_a, a.service.clone(), shutdown_tx.clone()));
    tokio::spawn(serve(listener_b, b.service.clone(), shutdown_tx.clone()));
    (a, b, shutdown_tx)
}
