//! Metadata Cache: owns the cluster topology view (brokers, topics,
//! partitions, leaders) and refreshes it on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::connection::{Broker, BrokerConnector, DEFAULT_REQUEST_TIMEOUT};
use crate::topic::{Partition, Topic};

/// Recommended default from the error-handling design notes: no TTL is
/// specified by the wire protocol itself, so this client picks 5 minutes
/// and relies on routing-error invalidation to catch anything that goes
/// stale sooner.
const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(5 * 60);

/// A consistent snapshot of brokers + topics as of `fetched_at`.
#[derive(Debug, Clone)]
pub struct ClusterMetadata {
    pub brokers: HashMap<i32, Broker>,
    pub topics: HashMap<String, Topic>,
    pub fetched_at: Instant,
}

impl ClusterMetadata {
    fn empty() -> Self {
        Self {
            brokers: HashMap::new(),
            topics: HashMap::new(),
            fetched_at: Instant::now() - DEFAULT_METADATA_TTL - Duration::from_secs(1),
        }
    }

    fn covers(&self, topics: &[String], ttl: Duration, stale: &std::collections::HashSet<String>) -> bool {
        if self.fetched_at.elapsed() > ttl {
            return false;
        }

        topics.iter().all(|t| {
            if stale.contains(t) {
                return false;
            }
            match self.topics.get(t) {
                Some(topic) => {
                    topic.error.is_none()
                        && topic.partitions.values().all(|p| p.leader_id >= 0)
                }
                None => false,
            }
        })
    }
}

struct Inner {
    metadata: ClusterMetadata,
    stale: std::collections::HashSet<String>,
}

/// Owns the cluster topology and coalesces concurrent refreshes for
/// overlapping topic sets into a single in-flight `MetadataRequest`.
pub struct MetadataCache {
    brokers: Arc<BrokerConnector>,
    ttl: Duration,
    inner: RwLock<Inner>,
    /// Held for the duration of an actual wire refresh; concurrent
    /// `fetch_topics` callers queue on it and, once granted, re-check
    /// freshness before deciding whether they still need to refresh
    /// themselves -- this is what makes N concurrent calls for the same
    /// topic set produce exactly one `MetadataRequest`.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache").finish_non_exhaustive()
    }
}

impl MetadataCache {
    pub fn new(brokers: Arc<BrokerConnector>) -> Self {
        Self {
            brokers,
            ttl: DEFAULT_METADATA_TTL,
            inner: RwLock::new(Inner {
                metadata: ClusterMetadata::empty(),
                stale: std::collections::HashSet::new(),
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns a snapshot containing at least the requested topics,
    /// refreshing from the cluster if the cache is absent, expired, marked
    /// stale for any requested topic, or missing leader information.
    pub async fn fetch_topics(&self, topics: &[String]) -> crate::client::error::Result<ClusterMetadata> {
        if let Some(snapshot) = self.fresh_snapshot(topics) {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;

        if let Some(snapshot) = self.fresh_snapshot(topics) {
            debug!(?topics, "metadata refreshed by a concurrent caller while waiting");
            return Ok(snapshot);
        }

        self.refresh(topics.to_vec()).await
    }

    /// Unconditionally refetches from the cluster regardless of freshness,
    /// for callers (like `Client::list_topics`) that must not miss a topic
    /// created moments ago. Still serialized against concurrent refreshes
    /// through `refresh_lock`.
    pub async fn force_refresh(&self, topics: Vec<String>) -> crate::client::error::Result<ClusterMetadata> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh(topics).await
    }

    /// Marks topics stale; the next `fetch_topics` covering them refreshes
    /// unconditionally.
    pub fn invalidate(&self, topics: &[String]) {
        let mut inner = self.inner.write();
        for topic in topics {
            inner.stale.insert(topic.clone());
        }
    }

    fn fresh_snapshot(&self, topics: &[String]) -> Option<ClusterMetadata> {
        let inner = self.inner.read();
        if inner.metadata.covers(topics, self.ttl, &inner.stale) {
            Some(inner.metadata.clone())
        } else {
            None
        }
    }

    async fn refresh(&self, topics: Vec<String>) -> crate::client::error::Result<ClusterMetadata> {
        let messenger = self.brokers.connect_bootstrap().await?;
        let request = crate::protocol::messages::MetadataRequest { topics: topics.clone() };
        let response = messenger.request(&request, DEFAULT_REQUEST_TIMEOUT).await?;

        self.brokers.topology().update(&response.brokers);

        let brokers: HashMap<i32, Broker> = response
            .brokers
            .iter()
            .map(|b| (b.node_id, Broker::from(b)))
            .collect();

        let fetched_topics: HashMap<String, Topic> = response
            .topics
            .into_iter()
            .map(|t| {
                let partitions = t
                    .partitions
                    .into_iter()
                    .map(|p| {
                        (
                            p.partition,
                            Partition {
                                partition: p.partition,
                                leader_id: p.leader,
                                replica_nodes: p.replicas,
                                isr_nodes: p.isr,
                                error: p.error,
                            },
                        )
                    })
                    .collect();
                (
                    t.topic.clone(),
                    Topic {
                        name: t.topic,
                        error: t.error,
                        partitions,
                    },
                )
            })
            .collect();

        let mut inner = self.inner.write();
        for topic in &topics {
            inner.stale.remove(topic);
        }
        // Replace wholesale: a refresh response only describes the topics
        // it was asked about (or all topics, for an empty request), so we
        // merge rather than drop entries for topics nobody asked about
        // this time.
        inner.metadata.brokers.extend(brokers);
        inner.metadata.topics.extend(fetched_topics);
        inner.metadata.fetched_at = Instant::now();

        Ok(inner.metadata.clone())
    }
}
