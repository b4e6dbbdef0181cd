use std::sync::Arc;

use crate::backoff::BackoffConfig;
use crate::connection::{Broker, BrokerConnector};

pub mod error;
pub(crate) mod metadata_cache;
pub mod producer;

use error::Result;
use metadata_cache::MetadataCache;
pub use producer::{Producer, ProducerConfig, ProducerRecord, ProduceResult};

const DEFAULT_CLIENT_ID: &str = "kafkacore";

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    backoff_config: Arc<BackoffConfig>,
    producer_config: ProducerConfig,
}

impl ClientBuilder {
    /// Create a new [`ClientBuilder`] with the list of bootstrap brokers.
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            client_id: None,
            backoff_config: Default::default(),
            producer_config: ProducerConfig::default(),
        }
    }

    /// Sets the client ID echoed in every request envelope.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set up backoff configuration for retriable routing errors.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = Arc::from(backoff_config);
        self
    }

    /// Set the [`ProducerConfig`] every [`Producer`] built from this client
    /// inherits.
    pub fn producer_config(mut self, producer_config: ProducerConfig) -> Self {
        self.producer_config = producer_config;
        self
    }

    /// Build [`Client`], eagerly fetching metadata for every topic once.
    pub async fn build(self) -> Result<Client> {
        let client_id = self
            .client_id
            .unwrap_or_else(|| Arc::from(DEFAULT_CLIENT_ID));
        let brokers = Arc::new(BrokerConnector::new_with_max_in_flight(
            self.bootstrap_brokers,
            client_id,
            self.producer_config.max_in_flight_requests_per_connection,
        ));
        brokers.refresh_metadata(vec![]).await?;

        let metadata = Arc::new(MetadataCache::new(Arc::clone(&brokers)));

        Ok(Client {
            brokers,
            metadata,
            backoff_config: self.backoff_config,
            producer_config: self.producer_config,
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// Top-level cluster-wide client: owns the [`crate::connection::BrokerConnector`]
/// (the Session) and the Metadata Cache, and constructs [`Producer`]s.
///
/// Must be constructed using [`ClientBuilder`].
pub struct Client {
    brokers: Arc<BrokerConnector>,
    metadata: Arc<MetadataCache>,
    backoff_config: Arc<BackoffConfig>,
    producer_config: ProducerConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Returns a [`Producer`] sharing this client's connection pool,
    /// metadata cache, and backoff configuration.
    pub fn producer(&self) -> Producer {
        Producer::new(
            Arc::clone(&self.brokers),
            Arc::clone(&self.metadata),
            self.producer_config.clone(),
            Arc::clone(&self.backoff_config),
        )
    }

    /// Returns a list of all brokers known from the cluster topology.
    pub fn brokers(&self) -> Vec<Broker> {
        self.brokers.topology().get_brokers()
    }

    /// Returns every topic the cluster currently hosts, bypassing the
    /// cache so a topic created moments ago is never missed.
    pub async fn list_topics(&self) -> Result<Vec<crate::topic::Topic>> {
        let meta = self.metadata.force_refresh(vec![]).await?;
        Ok(meta.topics.into_values().collect())
    }

    /// Closes every connection in the pool. After this, further requests
    /// through [`Producer`]s built from this client fail with
    /// [`crate::connection::Error::SessionClosed`].
    pub async fn close(&self) {
        self.brokers.close().await;
    }
}
