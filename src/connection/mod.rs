//! Session: a pool of Broker Connections keyed by `(host, port)`, plus the
//! bootstrap-broker cache used to resolve cluster metadata.

pub mod messenger;
pub mod topology;
mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub use messenger::{Messenger, RequestError, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUEST_TIMEOUT};
pub use topology::{Broker, BrokerTopology};
pub use transport::TlsConfig;

use crate::protocol::messages::{MetadataRequest, MetadataResponseBroker};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("session is closed")]
    SessionClosed,

    #[error("no broker found for node id {0}")]
    UnknownBroker(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stamps a cached broker connection so a racing `invalidate` call against
/// an already-replaced cache entry is recognized as stale and ignored,
/// rather than tearing down a connection a newer caller just installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerCacheGeneration(u64);

impl BrokerCacheGeneration {
    pub const START: Self = Self(0);

    pub fn bump(&mut self) {
        self.0 += 1;
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A coordination seam for anything that caches a broker connection behind a
/// generation counter: get the current one (creating it if absent), or
/// invalidate it if the caller's generation is still current.
#[async_trait]
pub trait BrokerCache: Send + Sync {
    type R: Send + Sync;
    type E;

    async fn get(&self) -> std::result::Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E>;

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration);
}

/// Round-robins over `bootstrapServers` to pick the broker a fresh metadata
/// fetch is issued against.
struct BootstrapRotation {
    servers: Vec<String>,
    next: AtomicUsize,
}

impl BootstrapRotation {
    fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            next: AtomicUsize::new(0),
        }
    }

    fn next_server(&self) -> &str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.servers.len();
        &self.servers[idx]
    }
}

/// Pool of [`Messenger`]s keyed by `(host, port)`. At most one TCP connect
/// is made per key even under concurrent first-callers: each key maps to a
/// [`OnceCell`], so the second concurrent caller awaits the first caller's
/// in-flight connect instead of racing its own.
pub struct BrokerConnector {
    client_id: Arc<str>,
    bootstrap: BootstrapRotation,
    topology: BrokerTopology,
    connections: RwLock<HashMap<(String, i32), Arc<OnceCell<Arc<Messenger>>>>>,
    connect_timeout: Option<Duration>,
    max_in_flight: usize,
    closed: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for BrokerConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnector").finish_non_exhaustive()
    }
}

impl BrokerConnector {
    pub fn new(bootstrap_servers: Vec<String>, client_id: Arc<str>) -> Self {
        Self::new_with_max_in_flight(bootstrap_servers, client_id, DEFAULT_MAX_IN_FLIGHT)
    }

    /// Like [`Self::new`], but sets the cap each pooled [`Messenger`] places
    /// on concurrent outstanding requests (`maxInFlightRequestsPerConnection`).
    pub fn new_with_max_in_flight(
        bootstrap_servers: Vec<String>,
        client_id: Arc<str>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            client_id,
            bootstrap: BootstrapRotation::new(bootstrap_servers),
            topology: BrokerTopology::default(),
            connections: RwLock::new(HashMap::new()),
            connect_timeout: Some(Duration::from_secs(10)),
            max_in_flight,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn topology(&self) -> &BrokerTopology {
        &self.topology
    }

    /// Connects to (or reuses a connection to) the broker registered under
    /// `node_id` in the current topology.
    pub async fn connect(&self, node_id: i32) -> Result<Arc<Messenger>> {
        let broker = self
            .topology
            .get_broker(node_id)
            .await
            .ok_or(Error::UnknownBroker(node_id))?;
        self.connect_to(&broker.host_port()).await
    }

    /// Connects to (or reuses a connection to) an arbitrary bootstrap
    /// server, used only for the very first metadata fetch.
    pub async fn connect_bootstrap(&self) -> Result<Arc<Messenger>> {
        let server = self.bootstrap.next_server().to_string();
        self.connect_to(&server).await
    }

    async fn connect_to(&self, host_port: &str) -> Result<Arc<Messenger>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        let (host, port) = split_host_port(host_port);
        let key = (host.clone(), port);

        let cell = {
            let mut guard = self.connections.write();
            Arc::clone(
                guard
                    .entry(key)
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let client_id = Arc::clone(&self.client_id);
        let connect_timeout = self.connect_timeout;
        let max_in_flight = self.max_in_flight;
        let host_port = host_port.to_string();

        let messenger = cell
            .get_or_try_init(|| async move {
                info!(broker = %host_port, "opening new broker connection");
                Messenger::connect(&host_port, client_id, connect_timeout, max_in_flight)
                    .await
                    .map(Arc::new)
            })
            .await?;

        if !messenger.is_ready() {
            // A previously cached connection died; drop it so the next
            // caller re-dials instead of reusing a broken entry forever.
            let mut guard = self.connections.write();
            let (host, port) = split_host_port(&host_port);
            guard.remove(&(host, port));
            return Err(Error::Request(RequestError::ConnectionLost));
        }

        Ok(Arc::clone(messenger))
    }

    pub async fn refresh_metadata(
        &self,
        topics: Vec<String>,
    ) -> Result<Vec<MetadataResponseBroker>> {
        let messenger = self.connect_bootstrap().await?;
        let request = MetadataRequest { topics };
        let response = messenger.request(&request, DEFAULT_REQUEST_TIMEOUT).await?;
        self.topology.update(&response.brokers);
        Ok(response.brokers)
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let connections = self.connections.write().drain().collect::<Vec<_>>();
        for (_, cell) in connections {
            if let Some(messenger) = cell.get() {
                messenger.close().await;
            }
        }
        debug!("session closed");
    }
}

fn split_host_port(host_port: &str) -> (String, i32) {
    match host_port.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or_default()),
        None => (host_port.to_string(), 0),
    }
}

impl Broker {
    pub fn host_port(&self) -> String {
        format!("{self}")
    }
}
